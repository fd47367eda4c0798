/// Token 生命周期模块
///
/// 启动时的四状态流程：加载持久化 Token → 有效则直接复用 →
/// 过期且有刷新令牌则刷新一次并写回 → 缺失或刷新失败则交互式授权
use anyhow::{Context, Result};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl, basic::BasicClient,
};
use std::future::Future;
use std::path::Path;

use crate::config::{oauth_config::OAuthConfig, storage};
use crate::mail::gmail::oauth;
use crate::mail::gmail::types::TokenRecord;

/// Token 刷新阈值（提前多少分钟刷新）
const REFRESH_THRESHOLD_MINUTES: i64 = 5;

/// Google OAuth2 端点
pub(crate) const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// 生命周期的解析结果
#[derive(Debug)]
pub struct Resolution {
    /// 可用的 Token
    pub token: TokenRecord,

    /// Token 是否是本次新获取的（刷新或授权），需要写回文件
    pub freshly_obtained: bool,
}

/// 生命周期决策核心
///
/// 刷新和交互式授权两个动作以 `FnOnce` 注入：刷新最多尝试一次，
/// 失败后直接回退到交互式授权，不做重试
pub async fn resolve<R, RFut, A, AFut>(
    loaded: Option<TokenRecord>,
    refresh: R,
    authorize: A,
) -> Result<Resolution>
where
    R: FnOnce(TokenRecord) -> RFut,
    RFut: Future<Output = Result<TokenRecord>>,
    A: FnOnce() -> AFut,
    AFut: Future<Output = Result<TokenRecord>>,
{
    if let Some(record) = loaded {
        // 状态 1：有效 Token，直接复用
        if !record.is_expiring(REFRESH_THRESHOLD_MINUTES) {
            tracing::info!("✅ 持久化 Token 仍然有效（过期时间: {}），直接复用", record.expires_at);
            return Ok(Resolution {
                token: record,
                freshly_obtained: false,
            });
        }

        // 状态 2：过期但持有刷新令牌，尝试刷新（仅一次）
        if record.has_refresh_token() {
            tracing::info!("Access Token 即将过期（{}），尝试刷新", record.expires_at);

            match refresh(record).await {
                Ok(refreshed) => {
                    tracing::info!("✅ Token 刷新成功（新的过期时间: {}）", refreshed.expires_at);
                    return Ok(Resolution {
                        token: refreshed,
                        freshly_obtained: true,
                    });
                }
                Err(e) => {
                    tracing::warn!("⚠️ Token 刷新失败，回退到交互式授权: {}", e);
                }
            }
        } else {
            tracing::info!("Token 已过期且没有刷新令牌，进入交互式授权");
        }
    } else {
        tracing::info!("📭 未找到持久化 Token，进入交互式授权");
    }

    // 状态 3：交互式授权
    let token = authorize().await.context("交互式授权失败")?;

    Ok(Resolution {
        token,
        freshly_obtained: true,
    })
}

/// 获取可用的 OAuth2 凭据（启动时调用一次）
///
/// 新获取的 Token（刷新或授权产物）会全量写回 token.json；
/// 所有路径都失败时返回错误，调用方视为致命的启动失败
pub async fn obtain_credentials() -> Result<TokenRecord> {
    obtain_credentials_at(
        &storage::token_path(),
        refresh_token_record,
        oauth::authenticate,
    )
    .await
}

/// 生命周期 + 持久化的组合（文件路径可注入）
async fn obtain_credentials_at<R, RFut, A, AFut>(
    path: &Path,
    refresh: R,
    authorize: A,
) -> Result<TokenRecord>
where
    R: FnOnce(TokenRecord) -> RFut,
    RFut: Future<Output = Result<TokenRecord>>,
    A: FnOnce() -> AFut,
    AFut: Future<Output = Result<TokenRecord>>,
{
    let loaded = storage::load_token_from(path);

    let resolution = resolve(loaded, refresh, authorize).await?;

    if resolution.freshly_obtained {
        storage::save_token_to(path, &resolution.token).context("保存 Token 失败")?;
        tracing::info!("✅ 新 Token 已持久化到 {}", path.display());
    }

    Ok(resolution.token)
}

/// 使用 Refresh Token 从 Google 换取新的 Access Token
///
/// # Errors
/// - OAuth2 配置加载失败
/// - 网络请求失败
/// - 刷新令牌已过期或被撤销（invalid_grant）
async fn refresh_token_record(record: TokenRecord) -> Result<TokenRecord> {
    let config = OAuthConfig::load().context("加载 OAuth2 配置失败")?;

    let refresh_token = record
        .refresh_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("账户缺少刷新令牌"))?;

    // 构建 OAuth2 客户端
    let client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
        Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?),
    );

    // 使用 Refresh Token 交换新的 Access Token
    let token_response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token))
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| {
            let error_msg = e.to_string();

            // 提供更清晰的错误消息
            if error_msg.contains("invalid_grant") || error_msg.contains("401") {
                tracing::error!("❌ Token 刷新失败 [授权被拒绝/已过期]: {}", error_msg);
                tracing::error!(
                    "   💡 可能原因:\n   \
                     - Refresh Token 已过期或被撤销\n   \
                     - 用户撤销了应用授权\n   \
                     - 将回退到交互式授权重新获取凭据"
                );
                anyhow::anyhow!(
                    "Refresh Token 交换失败（可能已过期或被撤销）：{}",
                    error_msg
                )
            } else {
                anyhow::anyhow!("Refresh Token 交换失败: {}", error_msg)
            }
        })?;

    let new_access_token = token_response.access_token().secret().to_string();
    let expires_in = token_response
        .expires_in()
        .unwrap_or(std::time::Duration::from_secs(3600))
        .as_secs() as i64;

    let mut refreshed = record;
    refreshed.update_access_token(new_access_token, expires_in);

    // Google 偶尔会在刷新时轮换刷新令牌
    if let Some(new_refresh) = token_response.refresh_token() {
        refreshed.refresh_token = Some(new_refresh.secret().to_string());
    }

    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn valid_token() -> TokenRecord {
        TokenRecord::new(
            "valid_access".to_string(),
            Some("refresh".to_string()),
            3600,
            vec![],
        )
    }

    fn expired_token(refresh: Option<&str>) -> TokenRecord {
        let mut token = TokenRecord::new(
            "stale_access".to_string(),
            refresh.map(|s| s.to_string()),
            3600,
            vec![],
        );
        token.expires_at = chrono::Utc::now() - chrono::Duration::hours(1);
        token
    }

    #[test]
    fn test_refresh_threshold() {
        assert_eq!(REFRESH_THRESHOLD_MINUTES, 5);
    }

    #[tokio::test]
    async fn test_valid_token_reused_without_refresh_or_authorization() {
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let authorize_calls = Arc::new(AtomicUsize::new(0));

        let rc = refresh_calls.clone();
        let ac = authorize_calls.clone();

        let resolution = resolve(
            Some(valid_token()),
            move |record| async move {
                rc.fetch_add(1, Ordering::SeqCst);
                Ok(record)
            },
            move || async move {
                ac.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("不应走到交互式授权")
            },
        )
        .await
        .unwrap();

        assert!(!resolution.freshly_obtained);
        assert_eq!(resolution.token.access_token, "valid_access");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(authorize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_exactly_one_refresh() {
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let authorize_calls = Arc::new(AtomicUsize::new(0));

        let rc = refresh_calls.clone();
        let ac = authorize_calls.clone();

        let resolution = resolve(
            Some(expired_token(Some("refresh"))),
            move |mut record| async move {
                rc.fetch_add(1, Ordering::SeqCst);
                record.update_access_token("refreshed_access".to_string(), 3600);
                Ok(record)
            },
            move || async move {
                ac.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("刷新成功后不应走到交互式授权")
            },
        )
        .await
        .unwrap();

        // 刷新产物需要写回文件
        assert!(resolution.freshly_obtained);
        assert_eq!(resolution.token.access_token, "refreshed_access");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(authorize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_authorization() {
        let authorize_calls = Arc::new(AtomicUsize::new(0));
        let ac = authorize_calls.clone();

        let resolution = resolve(
            Some(expired_token(Some("revoked_refresh"))),
            |_record| async move { anyhow::bail!("invalid_grant") },
            move || async move {
                ac.fetch_add(1, Ordering::SeqCst);
                Ok(valid_token())
            },
        )
        .await
        .unwrap();

        assert!(resolution.freshly_obtained);
        assert_eq!(authorize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_goes_interactive() {
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let rc = refresh_calls.clone();

        let resolution = resolve(
            Some(expired_token(None)),
            move |record| async move {
                rc.fetch_add(1, Ordering::SeqCst);
                Ok(record)
            },
            || async { Ok(valid_token()) },
        )
        .await
        .unwrap();

        assert!(resolution.freshly_obtained);
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_absent_token_and_failed_authorization_is_error_not_panic() {
        // 既没有持久化 Token，交互式授权又失败（例如缺少 client-secret 配置），
        // 应当得到错误而不是 panic
        let result = resolve(
            None,
            |record| async move { Ok(record) },
            || async { anyhow::bail!("OAuth2 配置无效：缺少 client-secret 文件") },
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refreshed_token_is_persisted() {
        let path = std::env::temp_dir().join(format!(
            "maildeck-test-refresh-persist-{}.json",
            std::process::id()
        ));
        storage::save_token_to(&path, &expired_token(Some("refresh"))).unwrap();

        let token = obtain_credentials_at(
            &path,
            |mut record| async move {
                record.update_access_token("persisted_access".to_string(), 3600);
                Ok(record)
            },
            || async { anyhow::bail!("刷新成功后不应走到交互式授权") },
        )
        .await
        .unwrap();

        assert_eq!(token.access_token, "persisted_access");

        // 刷新产物必须已经落盘
        let reloaded = storage::load_token_from(&path).expect("刷新后的 Token 应当已写回文件");
        assert_eq!(reloaded.access_token, "persisted_access");
        assert!(!reloaded.is_expiring(REFRESH_THRESHOLD_MINUTES));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_valid_token_is_not_rewritten() {
        let path = std::env::temp_dir().join(format!(
            "maildeck-test-valid-untouched-{}.json",
            std::process::id()
        ));
        storage::save_token_to(&path, &valid_token()).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let token = obtain_credentials_at(
            &path,
            |_record| async move { anyhow::bail!("有效 Token 不应触发刷新") },
            || async { anyhow::bail!("有效 Token 不应触发交互式授权") },
        )
        .await
        .unwrap();

        assert_eq!(token.access_token, "valid_access");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    #[ignore] // 需要有效的 Refresh Token、client-secret 文件和网络连接
    async fn test_real_refresh() {
        let record = expired_token(Some(
            &std::env::var("TEST_REFRESH_TOKEN").expect("请设置 TEST_REFRESH_TOKEN 环境变量"),
        ));

        let refreshed = refresh_token_record(record).await.unwrap();
        assert!(!refreshed.access_token.is_empty());
        assert!(!refreshed.is_expiring(0));
    }
}
