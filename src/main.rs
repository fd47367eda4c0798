// 导入 Slint 生成的代码
slint::include_modules!();

use anyhow::{Context, Result};
use std::rc::Rc;
use std::sync::Arc;

mod config;
mod mail;
mod ui;
mod utils;

use mail::gmail::{self, CATEGORIES, GmailClient};

/// 每个分类一次最多拉取的邮件数
const MESSAGE_FETCH_LIMIT: u32 = 25;

fn main() -> Result<()> {
    // 1. 初始化日志
    init_logger()?;

    // 2. 创建 Tokio 运行时（用于 async OAuth2 与 Gmail API 调用）
    let rt = tokio::runtime::Runtime::new()?;
    let rt_handle = rt.handle().clone();

    // 3. 加载应用配置
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("⚠️ 加载配置失败: {}, 使用默认配置", e);
            config::Config::default()
        }
    };

    // 4. 构造 API 客户端
    //    Mock 模式构造时即已认证；生产模式先走 Token 生命周期，
    //    失败视为致命的启动错误，进程退出
    let client = if cfg.app.mock_mode {
        tracing::info!("🧪 以 Mock 模式启动，不访问真实 Gmail API");
        GmailClient::mock()
    } else {
        let token = rt
            .block_on(gmail::obtain_credentials())
            .context("获取 OAuth2 凭据失败，无法启动")?;

        let mut client = GmailClient::new();
        client.authorize(&token);
        client
    };
    let client = Arc::new(client);
    tracing::debug!(
        "客户端模式: {}",
        if client.is_mock() { "mock" } else { "production" }
    );

    // 5. 创建 Slint UI
    let main_window = MainWindow::new()?;

    // 6. 注入硬编码的分类列表
    let labels = ui::category_labels();
    main_window.set_categories(Rc::new(slint::VecModel::from(labels)).into());

    // 7. 从配置初始化主题
    let is_dark = cfg.app.theme == "dark";
    Theme::get(&main_window).set_is_dark(is_dark);
    tracing::info!("主题初始化: {}", if is_dark { "dark" } else { "light" });

    // 8. 绑定 Slint 回调
    bind_callbacks(&main_window, client.clone(), rt_handle.clone());

    // 9. 启动时获取账户邮箱和默认分类（"全部"）的邮件
    fetch_profile(&main_window, client.clone(), rt_handle.clone());
    fetch_messages(&main_window, client, rt_handle, 0);

    tracing::info!("MailDeck v0.1.0 启动");

    // 10. 运行事件循环
    main_window.run()?;

    Ok(())
}

/// 绑定所有 Slint 回调
fn bind_callbacks(
    main_window: &MainWindow,
    client: Arc<GmailClient>,
    rt_handle: tokio::runtime::Handle,
) {
    // 分类过滤按钮
    main_window.on_category_selected({
        let weak = main_window.as_weak();
        let client = client.clone();
        let handle = rt_handle.clone();

        move |index| {
            tracing::info!("[回调] 分类切换: {}", index);

            if let Some(window) = weak.upgrade() {
                window.set_active_category(index);
                fetch_messages(&window, client.clone(), handle.clone(), index as usize);
            }
        }
    });

    // 刷新按钮（重新拉取当前分类）
    main_window.on_refresh_clicked({
        let weak = main_window.as_weak();
        let client = client.clone();
        let handle = rt_handle.clone();

        move || {
            tracing::info!("[回调] 刷新按钮被点击");

            if let Some(window) = weak.upgrade() {
                let index = window.get_active_category();
                fetch_messages(&window, client.clone(), handle.clone(), index as usize);
            }
        }
    });

    // 主题切换
    main_window.on_theme_toggled({
        let weak = main_window.as_weak();

        move || {
            tracing::info!("[回调] 主题切换按钮被点击");

            if let Some(window) = weak.upgrade() {
                let current_is_dark = Theme::get(&window).get_is_dark();
                let new_is_dark = !current_is_dark;
                Theme::get(&window).set_is_dark(new_is_dark);
                tracing::info!(
                    "主题切换: {} -> {}",
                    if current_is_dark { "dark" } else { "light" },
                    if new_is_dark { "dark" } else { "light" }
                );

                // 持久化主题偏好
                if let Ok(mut cfg) = config::load() {
                    cfg.app.theme = if new_is_dark {
                        "dark".to_string()
                    } else {
                        "light".to_string()
                    };
                    if let Err(e) = config::save(&cfg) {
                        tracing::error!("保存主题配置失败: {}", e);
                    }
                }
            }
        }
    });

    // 发送按钮
    main_window.on_send_clicked({
        let weak = main_window.as_weak();
        let client = client.clone();
        let handle = rt_handle.clone();

        move |to, subject, body| {
            let to = to.trim().to_string();
            let subject = subject.to_string();
            let body = body.to_string();

            tracing::info!("[回调] 发送按钮被点击，收件人: {}", to);

            if to.is_empty() {
                if let Some(window) = weak.upgrade() {
                    window.set_status_text("收件人不能为空".into());
                }
                return;
            }

            if let Some(window) = weak.upgrade() {
                window.set_status_text(format!("正在发送给 {}…", to).into());
            }

            let weak = weak.clone();
            let client = client.clone();
            let handle = handle.clone();

            std::thread::spawn(move || {
                let result = handle.block_on(client.send_message(&to, &subject, &body));

                slint::invoke_from_event_loop(move || {
                    if let Some(window) = weak.upgrade() {
                        match result {
                            Ok(id) => {
                                tracing::info!("✅ 发送成功: {}", id);
                                window.set_status_text(format!("✅ 已发送（id: {}）", id).into());

                                // 发送成功后清空撰写区
                                window.set_compose_to("".into());
                                window.set_compose_subject("".into());
                                window.set_compose_body("".into());
                            }
                            Err(e) => {
                                tracing::error!("❌ 发送失败: {}", e);
                                window.set_status_text(format!("发送失败: {}", e).into());
                            }
                        }
                    }
                })
                .ok();
            });
        }
    });
}

/// 在工作线程中拉取指定分类的邮件，并回到事件循环更新 UI
fn fetch_messages(
    window: &MainWindow,
    client: Arc<GmailClient>,
    handle: tokio::runtime::Handle,
    category_index: usize,
) {
    let Some(category) = CATEGORIES.get(category_index).copied() else {
        tracing::warn!("无效的分类索引: {}", category_index);
        return;
    };

    window.set_is_loading(true);
    window.set_status_text(format!("正在加载「{}」…", category.display_name).into());

    let weak = window.as_weak();

    std::thread::spawn(move || {
        let result = handle.block_on(client.list_messages(&category, MESSAGE_FETCH_LIMIT));

        slint::invoke_from_event_loop(move || {
            if let Some(window) = weak.upgrade() {
                window.set_is_loading(false);

                match result {
                    Ok(messages) => {
                        let count = messages.len();
                        let items: Vec<MessageItem> =
                            messages.into_iter().map(Into::into).collect();

                        window.set_messages(Rc::new(slint::VecModel::from(items)).into());
                        window.set_status_text(
                            format!("「{}」共 {} 封", category.display_name, count).into(),
                        );

                        tracing::info!("✅ 分类「{}」加载 {} 封", category.display_name, count);
                    }
                    Err(e) => {
                        tracing::error!("❌ 加载邮件失败: {}", e);
                        window.set_status_text(format!("加载失败: {}", e).into());
                    }
                }
            }
        })
        .ok();
    });
}

/// 在工作线程中获取账户邮箱地址，更新标题栏
fn fetch_profile(window: &MainWindow, client: Arc<GmailClient>, handle: tokio::runtime::Handle) {
    let weak = window.as_weak();

    std::thread::spawn(move || {
        let result = handle.block_on(client.get_profile());

        slint::invoke_from_event_loop(move || {
            if let Some(window) = weak.upgrade() {
                match result {
                    Ok(email) => {
                        tracing::info!("✅ 当前账户: {}", email);
                        window.set_account_email(email.into());
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ 获取账户信息失败: {}", e);
                    }
                }
            }
        })
        .ok();
    });
}

/// 初始化日志系统
fn init_logger() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maildeck=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
