// UI 模块 - Rust-Slint 数据桥接

use slint::SharedString;

use crate::mail::gmail::{CATEGORIES, MessageSummary};

/// 将 Rust 侧的邮件摘要转换为 Slint 的 MessageItem
impl From<MessageSummary> for crate::MessageItem {
    fn from(msg: MessageSummary) -> Self {
        Self {
            id: SharedString::from(msg.id),
            sender: SharedString::from(msg.from),
            subject: SharedString::from(msg.subject),
            snippet: SharedString::from(msg.snippet),
            date: SharedString::from(msg.date),
            unread: msg.unread,
        }
    }
}

/// 过滤栏按钮的显示名列表（与 CATEGORIES 顺序一致）
pub fn category_labels() -> Vec<SharedString> {
    CATEGORIES
        .iter()
        .map(|c| SharedString::from(c.display_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels_match_categories() {
        let labels = category_labels();
        assert_eq!(labels.len(), CATEGORIES.len());
        assert_eq!(labels[0].as_str(), "全部");
    }

    #[test]
    fn test_message_summary_to_slint_item() {
        let summary = MessageSummary {
            id: "m-1".to_string(),
            from: "a@b.com".to_string(),
            subject: "主题".to_string(),
            snippet: "摘要".to_string(),
            date: "Mon, 12 Jan 2026 09:30:00 +0800".to_string(),
            unread: true,
            label_ids: vec!["INBOX".to_string()],
        };

        let item: crate::MessageItem = summary.into();
        assert_eq!(item.id.as_str(), "m-1");
        assert_eq!(item.subject.as_str(), "主题");
        assert!(item.unread);
    }
}
