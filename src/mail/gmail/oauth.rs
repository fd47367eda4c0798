/// Gmail OAuth2 交互式授权流程
///
/// 实现完整的 OAuth2 授权码流程（带 PKCE）
use anyhow::{Context, Result};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Response, Server};
use tokio::sync::oneshot;
use url::Url;

use crate::config::oauth_config::OAuthConfig;
use crate::mail::gmail::token::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};
use crate::mail::gmail::types::TokenRecord;

/// OAuth2 回调超时时间（秒）
const CALLBACK_TIMEOUT_SECS: u64 = 120;

/// 本地回调服务器端口范围
const PORT_RANGE: std::ops::Range<u16> = 8080..8090;

/// OAuth2 成功页面 HTML
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权成功 - MailDeck</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
        }
        .container {
            background: white;
            padding: 40px;
            border-radius: 12px;
            box-shadow: 0 10px 40px rgba(0,0,0,0.2);
            text-align: center;
            max-width: 400px;
        }
        h1 { color: #667eea; margin-bottom: 20px; }
        p { color: #666; line-height: 1.6; }
        .checkmark { font-size: 64px; color: #4caf50; }
    </style>
</head>
<body>
    <div class="container">
        <div class="checkmark">✓</div>
        <h1>授权成功</h1>
        <p>您的 Gmail 账户已成功连接到 MailDeck。</p>
        <p>现在可以关闭此页面并返回应用程序。</p>
    </div>
</body>
</html>"#;

/// OAuth2 错误页面 HTML
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权失败 - MailDeck</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #f093fb 0%, #f5576c 100%);
        }
        .container {
            background: white;
            padding: 40px;
            border-radius: 12px;
            box-shadow: 0 10px 40px rgba(0,0,0,0.2);
            text-align: center;
            max-width: 400px;
        }
        h1 { color: #f5576c; margin-bottom: 20px; }
        p { color: #666; line-height: 1.6; }
        .cross { font-size: 64px; color: #f44336; }
    </style>
</head>
<body>
    <div class="container">
        <div class="cross">✗</div>
        <h1>授权失败</h1>
        <p>Gmail 账户连接失败，请稍后重试。</p>
        <p>如果问题持续，请检查网络连接或 OAuth2 配置。</p>
    </div>
</body>
</html>"#;

/// 执行 Gmail OAuth2 交互式授权
///
/// 完整流程：
/// 1. 加载并校验 client-secret 配置
/// 2. 在 8080..8090 范围内绑定第一个空闲端口
/// 3. 生成授权 URL（带 PKCE，redirect_uri 指向实际绑定的端口）
/// 4. 启动回调线程并打开浏览器等待用户授权
/// 5. 验证 CSRF state
/// 6. 交换 Token
///
/// # Returns
/// 返回新获取的 Token 记录（由调用方负责持久化）
///
/// # Errors
/// - OAuth2 配置无效（占位符或缺少 client-secret 文件）
/// - 端口范围内没有空闲端口
/// - 用户拒绝授权或超时
/// - Token 交换失败
pub async fn authenticate() -> Result<TokenRecord> {
    tracing::info!("🔐 开始 Gmail OAuth2 授权流程");

    // 步骤 1：加载配置
    let config = OAuthConfig::load()?;

    // 验证配置
    if config.is_placeholder() {
        anyhow::bail!(
            "OAuth2 配置无效：未找到 client-secret 文件\n\
             请设置环境变量 MAILDECK_CLIENT_SECRET_FILE 或提供 credentials.json"
        );
    }

    // 步骤 2：先绑定回调端口，redirect_uri 必须指向实际拿到的端口
    let (server, port) = bind_callback_server()?;
    let server = Arc::new(server);
    tracing::info!("✅ 本地回调服务器启动成功: http://localhost:{}", port);

    // 步骤 3：生成授权 URL
    let (auth_url, csrf_state, pkce_verifier) = build_auth_url(&config, port)?;
    tracing::info!("✅ 授权 URL 生成成功");
    tracing::debug!("授权 URL: {}", auth_url);

    // 步骤 4：启动回调线程并打开浏览器
    let (code_tx, code_rx) = oneshot::channel();
    let server_in_thread = server.clone();
    let server_handle =
        std::thread::spawn(move || run_callback_server(&server_in_thread, port, code_tx));

    if let Err(e) = webbrowser::open(auth_url.as_str()) {
        server.unblock();
        let _ = server_handle.join();
        return Err(anyhow::anyhow!("无法打开浏览器: {}", e));
    }
    tracing::info!("✅ 浏览器已打开，等待用户授权...");

    // 步骤 5：等待回调（带超时）
    let callback = tokio::time::timeout(Duration::from_secs(CALLBACK_TIMEOUT_SECS), code_rx).await;

    // 不论回调结果如何，先让回调线程退出 incoming_requests 并回收
    server.unblock();
    server_handle
        .join()
        .map_err(|_| anyhow::anyhow!("回调服务器线程 panic"))?
        .context("回调服务器出错")?;

    let (received_code, received_state) = callback
        .context("授权超时：用户未在规定时间内完成授权")?
        .context("本地服务器接收回调失败")?;

    tracing::info!("✅ 收到授权回调");

    // 步骤 6：验证 CSRF state
    verify_csrf(&csrf_state, &received_state)?;
    tracing::info!("✅ CSRF 验证通过");

    // 步骤 7：交换 Token
    let token_response = exchange_code_for_token(received_code, pkce_verifier, &config, port)
        .await
        .context("Token 交换失败")?;

    let access_token = token_response.access_token().secret().to_string();
    let refresh_token = token_response
        .refresh_token()
        .ok_or_else(|| anyhow::anyhow!("未收到 refresh_token（请在授权时勾选离线访问）"))?
        .secret()
        .to_string();

    let expires_in = token_response
        .expires_in()
        .unwrap_or(Duration::from_secs(3600))
        .as_secs() as i64;

    tracing::info!("✅ Token 交换成功（有效期: {} 秒）", expires_in);
    tracing::debug!(
        "Access Token: {}...{}",
        &access_token[..5],
        &access_token[access_token.len() - 5..]
    );

    let record = TokenRecord::new(
        access_token,
        Some(refresh_token),
        expires_in,
        config.scopes.clone(),
    );

    tracing::info!("🎉 OAuth2 授权流程完成");

    Ok(record)
}

/// 在端口范围内绑定第一个空闲端口
///
/// 被占用的端口直接跳过，整个范围都占用时才报错
fn bind_callback_server() -> Result<(Server, u16)> {
    let mut last_error = None;

    for port in PORT_RANGE {
        match Server::http(("127.0.0.1", port)) {
            Ok(server) => {
                tracing::debug!("本地回调服务器监听: 127.0.0.1:{}", port);
                return Ok((server, port));
            }
            Err(e) => {
                tracing::debug!("端口 {} 不可用，尝试下一个: {}", port, e);
                last_error = Some(e);
            }
        }
    }

    Err(anyhow::anyhow!(
        "{}..{} 范围内没有空闲端口（最后错误: {}）",
        PORT_RANGE.start,
        PORT_RANGE.end,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// 生成授权 URL
///
/// 使用 PKCE (RFC 7636) 提升安全性；port 是已经绑定成功的回调端口
fn build_auth_url(
    config: &OAuthConfig,
    port: u16,
) -> Result<(Url, CsrfToken, PkceCodeVerifier)> {
    // 构建 OAuth2 客户端
    let client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
        Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?),
    )
    .set_redirect_uri(RedirectUrl::new(format!("http://localhost:{}", port))?);

    // 生成 PKCE 挑战
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    // 生成授权 URL
    let (auth_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(config.scopes.iter().map(|s| Scope::new(s.clone())))
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok((auth_url, csrf_state, pkce_verifier))
}

/// 校验回调携带的 CSRF state
///
/// state 来自不受信任的查询参数，错误消息里只带按字符截断的前缀，
/// 不能按字节切片（可能越界或落在多字节字符中间）
fn verify_csrf(expected: &CsrfToken, received: &CsrfToken) -> Result<()> {
    if received.secret() != expected.secret() {
        let expected_prefix: String = expected.secret().chars().take(8).collect();
        let received_prefix: String = received.secret().chars().take(8).collect();
        anyhow::bail!(
            "CSRF 验证失败：state 不匹配\n期望: {}...\n实际: {}...",
            expected_prefix,
            received_prefix
        );
    }

    Ok(())
}

/// 在已绑定的服务器上接收 OAuth2 回调
///
/// 收到一次有效回调（或调用方 unblock）后返回
fn run_callback_server(
    server: &Server,
    port: u16,
    code_tx: oneshot::Sender<(AuthorizationCode, CsrfToken)>,
) -> Result<()> {
    for request in server.incoming_requests() {
        let url_str = format!("http://localhost:{}{}", port, request.url());
        tracing::debug!("收到请求: {}", url_str);

        let parsed_url = Url::parse(&url_str)?;

        // 解析 query 参数
        let params: std::collections::HashMap<_, _> =
            parsed_url.query_pairs().into_owned().collect();

        // 检查是否有错误
        if let Some(error) = params.get("error") {
            tracing::error!("用户拒绝授权: {}", error);

            // 返回错误页面
            let response = Response::from_string(ERROR_HTML).with_header(
                Header::from_bytes(b"Content-Type", b"text/html; charset=utf-8").unwrap(),
            );
            request.respond(response)?;

            return Err(anyhow::anyhow!("用户拒绝授权: {}", error));
        }

        // 提取 code 和 state
        let code = params
            .get("code")
            .ok_or_else(|| anyhow::anyhow!("回调缺少 code 参数"))?;

        let state = params
            .get("state")
            .ok_or_else(|| anyhow::anyhow!("回调缺少 state 参数"))?;

        // 返回成功页面
        let response = Response::from_string(SUCCESS_HTML).with_header(
            Header::from_bytes(b"Content-Type", b"text/html; charset=utf-8").unwrap(),
        );
        request.respond(response)?;

        // 发送结果
        code_tx
            .send((
                AuthorizationCode::new(code.clone()),
                CsrfToken::new(state.clone()),
            ))
            .ok();

        break;
    }

    Ok(())
}

/// 交换授权码为 Token
///
/// 单次交换，失败即返回错误（由上层回退或终止，不做重试）
async fn exchange_code_for_token(
    code: AuthorizationCode,
    verifier: PkceCodeVerifier,
    config: &OAuthConfig,
    port: u16,
) -> Result<
    oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
> {
    // redirect_uri 必须与授权时使用的完全一致（带端口号）
    let client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
        Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?),
    )
    .set_redirect_uri(RedirectUrl::new(format!("http://localhost:{}", port))?);

    let token_response = client
        .exchange_code(code)
        .set_pkce_verifier(verifier)
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| {
            tracing::error!("Token 交换详细错误: {:?}", e);
            anyhow::anyhow!("Token 交换请求失败: {}", e)
        })?;

    Ok(token_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_port_range() {
        assert!(PORT_RANGE.contains(&8080));
        assert!(PORT_RANGE.contains(&8089));
        assert!(!PORT_RANGE.contains(&8090));
    }

    #[test]
    fn test_html_contains_charset() {
        assert!(SUCCESS_HTML.contains("utf-8"));
        assert!(ERROR_HTML.contains("utf-8"));
    }

    #[test]
    fn test_bind_skips_occupied_port() {
        // 占住 8080 后绑定结果必须避开它（8080 可能本来就被占用，guard 失败也不影响断言的前半段）
        let guard = TcpListener::bind("127.0.0.1:8080");

        let (server, port) = bind_callback_server().expect("范围内应当还有空闲端口");
        assert!(PORT_RANGE.contains(&port));
        if guard.is_ok() {
            assert_ne!(port, 8080);
        }

        drop(server);
    }

    #[test]
    fn test_unblock_stops_callback_server() {
        let (server, port) = bind_callback_server().unwrap();
        let server = Arc::new(server);
        let (code_tx, _code_rx) = oneshot::channel();

        let server_in_thread = server.clone();
        let handle =
            std::thread::spawn(move || run_callback_server(&server_in_thread, port, code_tx));

        // 没有任何回调到达时 unblock 也要能让线程退出
        std::thread::sleep(Duration::from_millis(50));
        server.unblock();

        let result = handle.join().expect("回调服务器线程不应 panic");
        assert!(result.is_ok());
    }

    #[test]
    fn test_csrf_mismatch_is_error_not_panic() {
        let expected = CsrfToken::new("expected-long-state-value".to_string());

        // 短于 8 字节的 state
        let short = CsrfToken::new("abc".to_string());
        assert!(verify_csrf(&expected, &short).is_err());

        // 多字节字符跨越第 8 字节边界的 state
        let multibyte = CsrfToken::new("状态值不匹配的例子".to_string());
        assert!(verify_csrf(&expected, &multibyte).is_err());
    }

    #[test]
    fn test_csrf_match_passes() {
        let state = CsrfToken::new("matching-state".to_string());
        let received = CsrfToken::new("matching-state".to_string());
        assert!(verify_csrf(&state, &received).is_ok());
    }

    #[test]
    fn test_build_auth_url_carries_scopes_and_pkce() {
        let config = OAuthConfig {
            client_id: "id.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        };

        let (auth_url, _state, _verifier) = build_auth_url(&config, 8081).unwrap();

        let query = auth_url.query().unwrap_or_default();
        assert!(query.contains("code_challenge"));
        assert!(query.contains("gmail.readonly"));
        // redirect_uri 必须指向传入的端口
        assert!(query.contains("8081"));
    }
}
