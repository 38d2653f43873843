use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{DeliverySummary, ReactionSummary, UserSummary};

/// Maximum attachments per message.
pub const MAX_ATTACHMENTS: usize = 10;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
    Gif,
    Audio,
}

/// Reference to media stored elsewhere; the core never touches the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    pub kind: AttachmentKind,
}

/// Persisted message row. `id` is the pagination cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub replied_to_id: Option<i64>,
    pub client_message_id: Option<String>,
    pub is_deleted: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Lookup result for an operation that needs a live message.
    pub fn visible(found: Option<Message>) -> AppResult<Message> {
        match found {
            None => Err(AppError::MessageNotFound),
            Some(m) if m.is_deleted => Err(AppError::MessageDeleted),
            Some(m) => Ok(m),
        }
    }
}

/// Validated input for appending a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub replied_to_id: Option<i64>,
    pub client_message_id: Option<String>,
}

/// Compact view of the message being replied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: i64,
    pub sender: Option<UserSummary>,
    pub content: String,
    pub is_deleted: bool,
}

impl ReplyPreview {
    /// View of a replied-to message that was deleted or no longer exists.
    pub fn tombstone(id: i64) -> Self {
        Self {
            id,
            sender: None,
            content: String::new(),
            is_deleted: true,
        }
    }
}

/// Fully hydrated message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: i64,
    pub conversation_id: Uuid,
    pub sender: UserSummary,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub replied_to: Option<ReplyPreview>,
    pub client_message_id: Option<String>,
    pub is_deleted: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reactions: ReactionSummary,
    pub pinned: bool,
    /// Only present on the viewer's own messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliverySummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    #[default]
    Backward,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<i64>,
    pub direction: PageDirection,
    pub limit: usize,
    pub mark_delivered: bool,
}

impl PageRequest {
    pub fn new(
        cursor: Option<i64>,
        direction: Option<PageDirection>,
        limit: Option<usize>,
        mark_delivered: Option<bool>,
    ) -> Self {
        Self {
            cursor,
            direction: direction.unwrap_or_default(),
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
            mark_delivered: mark_delivered.unwrap_or(true),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None, None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_more: bool,
    pub next_cursor: Option<i64>,
    pub direction: PageDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedMessage {
    pub conversation_id: Uuid,
    pub message_id: i64,
    pub pinned_by: Uuid,
    pub pinned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults() {
        let req = PageRequest::default();
        assert_eq!(req.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(req.direction, PageDirection::Backward);
        assert!(req.mark_delivered);
        assert!(req.cursor.is_none());
    }

    #[test]
    fn test_page_limit_is_clamped() {
        assert_eq!(PageRequest::new(None, None, Some(0), None).limit, 1);
        assert_eq!(PageRequest::new(None, None, Some(500), None).limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_attachment_wire_format() {
        let json = serde_json::json!({
            "url": "https://cdn.example.com/a.png",
            "mime": "image/png",
            "kind": "image"
        });
        let attachment: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(attachment.kind, AttachmentKind::Image);
        assert!(attachment.name.is_none());
    }
}
