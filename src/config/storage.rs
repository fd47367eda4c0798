/// Token 文件存储模块
///
/// 将 OAuth2 Token 记录整体序列化为一个 JSON blob，读写都是全量覆盖：
/// 不做部分更新，也不做格式版本管理。文件损坏等同于凭据不存在。
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::mail::gmail::types::TokenRecord;

/// Token 文件的固定相对路径
pub const TOKEN_FILE: &str = "token.json";

/// 获取 Token 文件路径
pub fn token_path() -> PathBuf {
    PathBuf::from(TOKEN_FILE)
}

/// 从指定路径加载 Token
///
/// 文件不存在、读取失败或内容损坏都视为"无凭据"，
/// 由调用方走交互式授权重新获取
pub fn load_token_from(path: &Path) -> Option<TokenRecord> {
    if !path.exists() {
        tracing::debug!("Token 文件不存在: {}", path.display());
        return None;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("⚠️ 读取 Token 文件失败: {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<TokenRecord>(&content) {
        Ok(record) => {
            tracing::debug!("成功加载 Token（过期时间: {}）", record.expires_at);
            Some(record)
        }
        Err(e) => {
            tracing::warn!(
                "⚠️ Token 文件损坏，视为无凭据（将重新授权）: {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// 保存 Token 到指定路径（全量覆盖）
pub fn save_token_to(path: &Path, record: &TokenRecord) -> Result<()> {
    let content = serde_json::to_string_pretty(record).context("序列化 Token 失败")?;

    std::fs::write(path, content)
        .with_context(|| format!("写入 Token 文件失败: {}", path.display()))?;

    tracing::debug!("Token 已保存到: {}", path.display());

    Ok(())
}
