/// 进程级共享的 HTTP 客户端
///
/// 所有 Gmail API 调用都打到同一个主机（gmail.googleapis.com），
/// 共用一个 Client 实例即可复用 TLS 握手和连接池；
/// reqwest::Client 重复 build 的成本远高于 clone
use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// 全局 HTTP 客户端实例（懒初始化）
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        // 单一目标主机，留少量空闲连接即可
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(120))
        // messages.list + 逐封 metadata 拉取，30 秒覆盖最慢的一批
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent("MailDeck/0.1.0 (Rust)")
        .build()
        .expect("构建全局 HTTP 客户端失败")
});

/// 获取全局 HTTP 客户端
pub fn get_client() -> &'static Client {
    &HTTP_CLIENT
}
