/// Gmail 认证与分类数据结构
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth2 Token 记录
///
/// 唯一的持久化凭据实体，整体序列化到 token.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// 访问令牌（明文）
    pub access_token: String,

    /// 刷新令牌（可能不存在，例如授权时未返回）
    pub refresh_token: Option<String>,

    /// Token 过期时间（UTC）
    pub expires_at: DateTime<Utc>,

    /// 授权时批准的权限范围
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenRecord {
    /// 创建新的 Token 记录
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_seconds: i64,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_seconds),
            scopes,
        }
    }

    /// 检查 Token 是否即将过期
    ///
    /// # Arguments
    /// * `threshold_minutes` - 提前多少分钟算作"即将过期"
    pub fn is_expiring(&self, threshold_minutes: i64) -> bool {
        let threshold = Utc::now() + chrono::Duration::minutes(threshold_minutes);
        self.expires_at <= threshold
    }

    /// 是否持有可用的刷新令牌
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// 更新访问令牌及过期时间（刷新成功后调用）
    pub fn update_access_token(&mut self, new_token: String, expires_in_seconds: i64) {
        self.access_token = new_token;
        self.expires_at = Utc::now() + chrono::Duration::seconds(expires_in_seconds);
    }
}

/// 过滤栏分类
///
/// 硬编码的标签列表，不是持久化数据模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    /// 过滤栏按钮上的显示名
    pub display_name: &'static str,

    /// 对应的 Gmail 系统标签 ID（空串表示不过滤）
    pub label_id: &'static str,
}

/// 过滤栏的全部分类（顺序即按钮顺序）
pub const CATEGORIES: &[Category] = &[
    Category {
        display_name: "全部",
        label_id: "",
    },
    Category {
        display_name: "主要",
        label_id: "CATEGORY_PERSONAL",
    },
    Category {
        display_name: "社交",
        label_id: "CATEGORY_SOCIAL",
    },
    Category {
        display_name: "推广",
        label_id: "CATEGORY_PROMOTIONS",
    },
    Category {
        display_name: "更新",
        label_id: "CATEGORY_UPDATES",
    },
    Category {
        display_name: "论坛",
        label_id: "CATEGORY_FORUMS",
    },
];
