/// OAuth2 客户端凭据配置模块
///
/// 从 Google Cloud Console 导出的 client-secret JSON 文件读取凭据，
/// 文件路径可由环境变量指定，回退到固定默认文件名
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// 指定 client-secret 文件路径的环境变量
pub const CLIENT_SECRET_ENV: &str = "MAILDECK_CLIENT_SECRET_FILE";

/// client-secret 文件的默认文件名（相对路径）
pub const DEFAULT_CLIENT_SECRET_FILE: &str = "credentials.json";

/// OAuth2 配置
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Google OAuth2 客户端 ID
    pub client_id: String,

    /// Google OAuth2 客户端密钥
    pub client_secret: String,

    /// 请求的 API 权限范围
    pub scopes: Vec<String>,
}

/// Google client-secret JSON 的外层结构
///
/// 桌面应用导出的凭据放在 `installed` 段下
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: InstalledSection,
}

#[derive(Debug, Deserialize)]
struct InstalledSection {
    client_id: String,
    client_secret: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: "YOUR_CLIENT_ID.apps.googleusercontent.com".to_string(),
            client_secret: "YOUR_CLIENT_SECRET".to_string(),
            scopes: default_scopes(),
        }
    }
}

/// 默认权限范围：读邮件、发邮件、获取邮箱地址
fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/gmail.readonly".to_string(), // 读取邮件
        "https://www.googleapis.com/auth/gmail.send".to_string(),     // 发送邮件
        "https://www.googleapis.com/auth/userinfo.email".to_string(), // 获取邮箱地址
        "openid".to_string(),                                         // OIDC 身份认证标准
    ]
}

impl OAuthConfig {
    /// 加载 OAuth2 配置
    ///
    /// 优先级（从高到低）：
    /// 1. 环境变量 `MAILDECK_CLIENT_SECRET_FILE` 指向的 client-secret JSON
    /// 2. 工作目录下的默认文件 `credentials.json`
    /// 3. 默认占位符（用于开发/测试，交互式授权前会被拒绝）
    ///
    /// # Returns
    /// 返回加载的配置，即使使用默认占位符也不会报错
    pub fn load() -> Result<Self> {
        let path = Self::client_secret_path();

        match Self::load_from_file(&path) {
            Ok(config) => {
                tracing::info!("✅ 从 {} 加载 OAuth2 配置", path.display());
                Ok(config)
            }
            Err(e) => {
                tracing::warn!("⚠️ 未能加载 client-secret 文件: {}", e);
                tracing::warn!(
                    "请设置环境变量 {} 或将凭据放在 {}",
                    CLIENT_SECRET_ENV,
                    DEFAULT_CLIENT_SECRET_FILE
                );
                Ok(Self::default())
            }
        }
    }

    /// 解析 client-secret 文件路径
    ///
    /// 环境变量优先，否则使用固定默认文件名
    pub fn client_secret_path() -> PathBuf {
        match std::env::var(CLIENT_SECRET_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CLIENT_SECRET_FILE),
        }
    }

    /// 从指定路径的 client-secret 文件加载
    fn load_from_file(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("client-secret 文件不存在: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取 client-secret 文件失败: {}", path.display()))?;

        Self::from_json_str(&content)
    }

    /// 解析 Google client-secret JSON（`installed` 格式）
    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(content).context("解析 client-secret JSON 失败（缺少 installed 段？）")?;

        Ok(Self {
            client_id: file.installed.client_id,
            client_secret: file.installed.client_secret,
            scopes: default_scopes(),
        })
    }

    /// 验证配置是否为默认占位符
    ///
    /// 用于检查用户是否已正确配置 OAuth2 凭据
    pub fn is_placeholder(&self) -> bool {
        self.client_id.contains("YOUR_CLIENT_ID")
            || self.client_secret.contains("YOUR_CLIENT_SECRET")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_JSON: &str = r#"{
        "installed": {
            "client_id": "test-id.apps.googleusercontent.com",
            "client_secret": "test-secret",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_default_config_is_placeholder() {
        let config = OAuthConfig::default();
        assert!(config.is_placeholder());
        assert!(config.scopes.iter().any(|s| s == "openid"));
        assert!(config.scopes.iter().any(|s| s.ends_with("gmail.send")));
    }

    #[test]
    fn test_parse_client_secret_json() {
        let config = OAuthConfig::from_json_str(SAMPLE_JSON).unwrap();
        assert_eq!(config.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(config.client_secret, "test-secret");
        assert!(!config.is_placeholder());
    }

    #[test]
    fn test_parse_rejects_missing_installed_section() {
        let result = OAuthConfig::from_json_str(r#"{"web": {"client_id": "x"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_client_secret_path() {
        // 未设置环境变量时使用固定默认文件名
        if std::env::var(CLIENT_SECRET_ENV).is_err() {
            let path = OAuthConfig::client_secret_path();
            assert_eq!(path, PathBuf::from(DEFAULT_CLIENT_SECRET_FILE));
        }
    }

    #[test]
    #[ignore] // 需要手动设置环境变量测试（避免与其他测试竞争）
    fn test_path_from_env() {
        unsafe {
            std::env::set_var(CLIENT_SECRET_ENV, "/tmp/my-secret.json");
        }

        let path = OAuthConfig::client_secret_path();
        assert_eq!(path, PathBuf::from("/tmp/my-secret.json"));

        unsafe {
            std::env::remove_var(CLIENT_SECRET_ENV);
        }
    }
}
