/// Gmail API 调用模块
///
/// `GmailClient` 支持两种构造方式：生产模式调用真实的 Gmail REST API，
/// Mock 模式在构造时即视为已认证，返回固定的测试数据，完全不触网
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use thiserror::Error;

use crate::mail::gmail::types::{Category, TokenRecord};
use crate::utils::http_client;

/// Gmail API v1 基础地址
const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// API 客户端错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 客户端尚未认证（生产模式下未注入 Token）
    #[error("尚未认证，无法调用 Gmail API")]
    AuthRequired,

    /// HTTP 传输层错误
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// Gmail API 返回的非成功状态
    #[error("Gmail API 返回错误 {status}: {body}")]
    Api { status: u16, body: String },

    /// 响应体解析失败
    #[error("解析响应失败: {0}")]
    Parse(String),
}

/// 邮件摘要（列表条目）
#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub date: String,
    pub unread: bool,
    pub label_ids: Vec<String>,
}

/// Gmail API 客户端
pub struct GmailClient {
    /// Mock 模式标志（构造时确定，运行期不变）
    mock: bool,

    /// 是否已认证
    authenticated: bool,

    /// Access Token（生产模式下由 authorize 注入）
    access_token: Option<String>,
}

impl GmailClient {
    /// 创建生产模式客户端
    ///
    /// 构造后处于未认证状态，需调用 [`authorize`](Self::authorize) 注入凭据
    pub fn new() -> Self {
        Self {
            mock: false,
            authenticated: false,
            access_token: None,
        }
    }

    /// 创建 Mock 模式客户端
    ///
    /// 构造时即视为已认证，所有操作返回固定数据，不访问网络
    pub fn mock() -> Self {
        tracing::debug!("构造 Mock 模式 Gmail 客户端（立即视为已认证）");
        Self {
            mock: true,
            authenticated: true,
            access_token: None,
        }
    }

    /// 是否为 Mock 模式
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// 是否已认证
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// 注入 OAuth2 凭据（生产模式）
    pub fn authorize(&mut self, token: &TokenRecord) {
        self.access_token = Some(token.access_token.clone());
        self.authenticated = true;
    }

    /// 取出 Bearer Token，未认证时返回错误
    fn bearer_token(&self) -> Result<&str, ApiError> {
        if !self.authenticated {
            return Err(ApiError::AuthRequired);
        }
        self.access_token.as_deref().ok_or(ApiError::AuthRequired)
    }

    /// 按分类列出邮件
    ///
    /// 生产模式：先调 messages.list（按标签过滤），再逐条调 messages.get
    /// 获取 From/Subject/Date 头和摘要
    ///
    /// # Arguments
    /// * `category` - 过滤栏分类（label_id 为空表示不过滤）
    /// * `max` - 最多返回的邮件数
    pub async fn list_messages(
        &self,
        category: &Category,
        max: u32,
    ) -> Result<Vec<MessageSummary>, ApiError> {
        if !self.authenticated {
            return Err(ApiError::AuthRequired);
        }

        if self.mock {
            return Ok(mock_list(category, max));
        }

        let token = self.bearer_token()?;

        tracing::debug!(
            "正在列出邮件（分类: {}，最多 {} 封）...",
            category.display_name,
            max
        );

        // 1. messages.list：收件箱 + 可选的分类标签
        let mut request = http_client::get_client()
            .get(format!("{}/messages", GMAIL_API_BASE))
            .query(&[("maxResults", max.to_string())])
            .query(&[("labelIds", "INBOX")])
            .bearer_auth(token);

        if !category.label_id.is_empty() {
            request = request.query(&[("labelIds", category.label_id)]);
        }

        let response = request.send().await?;
        let list: MessageListResponse = parse_response(response).await?;

        let refs = list.messages.unwrap_or_default();
        tracing::debug!("messages.list 返回 {} 条引用", refs.len());

        // 2. 逐条获取元数据
        let mut summaries = Vec::with_capacity(refs.len());
        for msg_ref in refs {
            summaries.push(self.get_message_summary(&msg_ref.id).await?);
        }

        Ok(summaries)
    }

    /// 获取单封邮件的摘要（metadata 格式，只取头部和 snippet）
    async fn get_message_summary(&self, id: &str) -> Result<MessageSummary, ApiError> {
        let token = self.bearer_token()?;

        let response = http_client::get_client()
            .get(format!("{}/messages/{}", GMAIL_API_BASE, id))
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "Date"),
            ])
            .bearer_auth(token)
            .send()
            .await?;

        let detail: MessageDetail = parse_response(response).await?;

        Ok(detail.into_summary())
    }

    /// 发送邮件
    ///
    /// 在本地组装 RFC 5322 文本，base64url（无填充）编码后
    /// POST 到 messages.send
    ///
    /// # Returns
    /// 返回新邮件的 ID
    pub async fn send_message(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, ApiError> {
        if !self.authenticated {
            return Err(ApiError::AuthRequired);
        }

        if self.mock {
            let fake_id = format!("mock-{}", chrono::Utc::now().timestamp_millis());
            tracing::info!("🧪 Mock 模式：假装发送给 {} 成功（id: {}）", to, fake_id);
            return Ok(fake_id);
        }

        let token = self.bearer_token()?;

        let raw_message = build_raw_message(to, subject, body);
        let encoded = URL_SAFE_NO_PAD.encode(raw_message.as_bytes());

        tracing::debug!("正在发送邮件给 {}...", to);

        let response = http_client::get_client()
            .post(format!("{}/messages/send", GMAIL_API_BASE))
            .bearer_auth(token)
            .json(&serde_json::json!({ "raw": encoded }))
            .send()
            .await?;

        let sent: SendResponse = parse_response(response).await?;

        tracing::info!("✅ 邮件已发送（id: {}）", sent.id);

        Ok(sent.id)
    }

    /// 获取账户邮箱地址（用于窗口标题栏展示）
    pub async fn get_profile(&self) -> Result<String, ApiError> {
        if !self.authenticated {
            return Err(ApiError::AuthRequired);
        }

        if self.mock {
            return Ok("demo@gmail.com".to_string());
        }

        let token = self.bearer_token()?;

        let response = http_client::get_client()
            .get(format!("{}/profile", GMAIL_API_BASE))
            .bearer_auth(token)
            .send()
            .await?;

        let profile: ProfileResponse = parse_response(response).await?;

        Ok(profile.email_address)
    }
}

/// 组装 RFC 5322 纯文本邮件
///
/// To/Subject 中的换行会被剔除，防止头部注入
fn build_raw_message(to: &str, subject: &str, body: &str) -> String {
    let safe_to: String = to.replace(['\r', '\n'], " ");
    let safe_subject: String = subject.replace(['\r', '\n'], " ");

    format!(
        "To: {safe_to}\r\nSubject: {safe_subject}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}"
    )
}

/// 检查响应状态并解析 JSON
///
/// 先读取原始响应体再解析，便于在出错时记录完整内容
async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 401 {
            tracing::error!("❌ Gmail API 返回 401，Token 可能已过期: {}", body);
        }

        return Err(ApiError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        tracing::error!("解析响应失败: {}，原始响应: {}", e, text);
        ApiError::Parse(e.to_string())
    })
}

// ===== Gmail API 响应结构 =====

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageDetail {
    id: String,
    snippet: Option<String>,

    #[serde(rename = "labelIds", default)]
    label_ids: Vec<String>,

    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(rename = "emailAddress")]
    email_address: String,
}

impl MessageDetail {
    fn header(&self, name: &str) -> String {
        self.payload
            .as_ref()
            .and_then(|p| {
                p.headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case(name))
            })
            .map(|h| h.value.clone())
            .unwrap_or_default()
    }

    fn into_summary(self) -> MessageSummary {
        let from = self.header("From");
        let subject = self.header("Subject");
        let date = self.header("Date");
        let unread = self.label_ids.iter().any(|l| l == "UNREAD");

        MessageSummary {
            id: self.id,
            from,
            subject,
            snippet: self.snippet.unwrap_or_default(),
            date,
            unread,
            label_ids: self.label_ids,
        }
    }
}

// ===== Mock 数据 =====

/// Mock 模式的固定邮件语料（覆盖所有分类）
fn mock_corpus() -> Vec<MessageSummary> {
    let entries: &[(&str, &str, &str, &str, bool, &str)] = &[
        (
            "m-001",
            "李雷 <lilei@example.com>",
            "周报：本周进展",
            "本周完成了数据迁移，下周开始灰度……",
            true,
            "CATEGORY_PERSONAL",
        ),
        (
            "m-002",
            "GitHub <noreply@github.com>",
            "[maildeck] CI 构建通过",
            "All checks have passed on branch main……",
            true,
            "CATEGORY_UPDATES",
        ),
        (
            "m-003",
            "豆瓣小组 <notice@douban.com>",
            "你关注的小组有新帖子",
            "「Rust 众」小组今日更新 3 条讨论……",
            false,
            "CATEGORY_SOCIAL",
        ),
        (
            "m-004",
            "京东 <newsletter@jd.com>",
            "限时特惠：图书满 200 减 100",
            "精选技术图书大促，仅限三天……",
            false,
            "CATEGORY_PROMOTIONS",
        ),
        (
            "m-005",
            "users@lists.example.org",
            "[讨论] 关于下个版本的路线图",
            "大家好，想征集一下对 2.0 的意见……",
            true,
            "CATEGORY_FORUMS",
        ),
        (
            "m-006",
            "韩梅梅 <hanmeimei@example.com>",
            "午饭去哪吃？",
            "老地方还是试试新开的那家？",
            false,
            "CATEGORY_PERSONAL",
        ),
    ];

    entries
        .iter()
        .map(|(id, from, subject, snippet, unread, label)| MessageSummary {
            id: (*id).to_string(),
            from: (*from).to_string(),
            subject: (*subject).to_string(),
            snippet: (*snippet).to_string(),
            date: "Mon, 12 Jan 2026 09:30:00 +0800".to_string(),
            unread: *unread,
            label_ids: vec!["INBOX".to_string(), (*label).to_string()],
        })
        .collect()
}

/// Mock 模式的列表实现：按分类过滤并截断到 max
fn mock_list(category: &Category, max: u32) -> Vec<MessageSummary> {
    mock_corpus()
        .into_iter()
        .filter(|msg| {
            category.label_id.is_empty()
                || msg.label_ids.iter().any(|l| l == category.label_id)
        })
        .take(max as usize)
        .collect()
}
