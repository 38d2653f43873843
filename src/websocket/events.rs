//! Socket wire protocol
//!
//! Every server frame is `{"event": <name>, "data": {...}}`. Acks additionally
//! carry the client's `ackId` at the top level:
//! `{"event": "ack", "ackId": "...", "data": {"status": "ok" | "error", ...}}`.
//!
//! Client frames share the shape `{"event": <name>, "ackId"?: ..., "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::error_handling;
use crate::models::{Conversation, MessageView, ParticipantView, ReactionGroup, ReactionToggle};
use crate::services::message_service::SendMessageRequest;

/// Server → client events.
///
/// The enum is exhaustive; serialization goes through `to_frame` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    // ---- messages ----
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(MessageView),

    #[serde(rename = "messageEdited")]
    MessageEdited(MessageView),

    #[serde(rename = "messageDeleted", rename_all = "camelCase")]
    MessageDeleted {
        conversation_id: Uuid,
        message_id: i64,
    },

    #[serde(rename = "messagePinned", rename_all = "camelCase")]
    MessagePinned {
        conversation_id: Uuid,
        message_id: i64,
        pinned_by: Uuid,
    },

    #[serde(rename = "messageUnpinned", rename_all = "camelCase")]
    MessageUnpinned {
        conversation_id: Uuid,
        message_id: i64,
    },

    // ---- receipts ----
    #[serde(rename = "message:delivered", rename_all = "camelCase")]
    MessageDelivered {
        conversation_id: Uuid,
        message_ids: Vec<i64>,
        user_id: Uuid,
    },

    #[serde(rename = "message:read", rename_all = "camelCase")]
    MessageRead {
        conversation_id: Uuid,
        message_ids: Vec<i64>,
        user_id: Uuid,
    },

    // ---- reactions ----
    #[serde(rename = "message:reaction", rename_all = "camelCase")]
    MessageReaction {
        conversation_id: Uuid,
        message_id: i64,
        user_id: Uuid,
        emoji: String,
        toggled_on: bool,
    },

    /// Full grouped snapshot, never a diff.
    #[serde(rename = "reaction:updated", rename_all = "camelCase")]
    ReactionUpdated {
        conversation_id: Uuid,
        message_id: i64,
        groups: Vec<ReactionGroup>,
    },

    // ---- typing / presence ----
    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { conversation_id: Uuid, user_id: Uuid },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { conversation_id: Uuid, user_id: Uuid },

    #[serde(rename = "presence:update", rename_all = "camelCase")]
    PresenceUpdate { user_id: Uuid, online: bool },

    // ---- conversation lifecycle ----
    #[serde(rename = "conversation:created")]
    ConversationCreated(Conversation),

    #[serde(rename = "participant:added", rename_all = "camelCase")]
    ParticipantAdded {
        conversation_id: Uuid,
        participant: ParticipantView,
    },

    #[serde(rename = "participant:removed", rename_all = "camelCase")]
    ParticipantRemoved {
        conversation_id: Uuid,
        user_id: Uuid,
        promoted_owner: Option<Uuid>,
    },

    #[serde(rename = "chat:deleted", rename_all = "camelCase")]
    ChatDeleted { conversation_id: Uuid },

    #[serde(rename = "joinedConversation", rename_all = "camelCase")]
    JoinedConversation { conversation_id: Uuid },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::MessageEdited(_) => "messageEdited",
            Self::MessageDeleted { .. } => "messageDeleted",
            Self::MessagePinned { .. } => "messagePinned",
            Self::MessageUnpinned { .. } => "messageUnpinned",
            Self::MessageDelivered { .. } => "message:delivered",
            Self::MessageRead { .. } => "message:read",
            Self::MessageReaction { .. } => "message:reaction",
            Self::ReactionUpdated { .. } => "reaction:updated",
            Self::TypingStart { .. } => "typing:start",
            Self::TypingStop { .. } => "typing:stop",
            Self::PresenceUpdate { .. } => "presence:update",
            Self::ConversationCreated(_) => "conversation:created",
            Self::ParticipantAdded { .. } => "participant:added",
            Self::ParticipantRemoved { .. } => "participant:removed",
            Self::ChatDeleted { .. } => "chat:deleted",
            Self::JoinedConversation { .. } => "joinedConversation",
            Self::Error { .. } => "error",
        }
    }

    pub fn error(err: &AppError) -> Self {
        Self::Error {
            code: error_handling::error_code(err).to_string(),
            message: err.to_string(),
        }
    }

    /// JSON text frame for the transport.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Response to a client frame that carried an `ackId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckFrame {
    pub event: String,
    pub ack_id: String,
    pub data: Value,
}

impl AckFrame {
    const EVENT: &'static str = "ack";

    /// `{"status": "ok", ...body}`; `body` must be a JSON object.
    pub fn ok(ack_id: impl Into<String>, body: Value) -> Self {
        let mut data = serde_json::json!({ "status": "ok" });
        if let (Value::Object(target), Value::Object(fields)) = (&mut data, body) {
            target.extend(fields);
        }
        Self {
            event: Self::EVENT.to_string(),
            ack_id: ack_id.into(),
            data,
        }
    }

    pub fn error(ack_id: impl Into<String>, err: &AppError) -> Self {
        Self {
            event: Self::EVENT.to_string(),
            ack_id: ack_id.into(),
            data: serde_json::json!({
                "status": "error",
                "error": err.to_string(),
                "code": error_handling::error_code(err),
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.data.get("status").and_then(Value::as_str) == Some("ok")
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Raw client frame before event-specific decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ClientFrame {
    pub fn new(event: &str, ack_id: Option<String>, data: Value) -> Self {
        Self {
            event: event.to_string(),
            ack_id,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub conversation_id: Uuid,
    /// Absent on `messageRead` means "everything in the conversation".
    #[serde(default)]
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactPayload {
    pub message_id: i64,
    pub emoji: String,
}

/// Decoded client → server events.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    JoinConversation(ConversationRef),
    SendMessage(SendMessageRequest),
    MessageDelivered(ReceiptPayload),
    MessageRead(ReceiptPayload),
    ReactToMessage(ReactPayload),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
}

impl ClientEvent {
    pub fn decode(frame: &ClientFrame) -> Result<Self, AppError> {
        fn data<T: serde::de::DeserializeOwned>(frame: &ClientFrame) -> Result<T, AppError> {
            serde_json::from_value(frame.data.clone()).map_err(|e| {
                AppError::Validation(format!("invalid payload for '{}': {e}", frame.event))
            })
        }

        match frame.event.as_str() {
            "joinConversation" => Ok(Self::JoinConversation(data(frame)?)),
            "sendMessage" => Ok(Self::SendMessage(data(frame)?)),
            "messageDelivered" => Ok(Self::MessageDelivered(data(frame)?)),
            "messageRead" => Ok(Self::MessageRead(data(frame)?)),
            "reactToMessage" => Ok(Self::ReactToMessage(data(frame)?)),
            "typing:start" => Ok(Self::TypingStart(data(frame)?)),
            "typing:stop" => Ok(Self::TypingStop(data(frame)?)),
            other => Err(AppError::Validation(format!("unknown event '{other}'"))),
        }
    }
}

/// Body of a successful `reactToMessage` ack and REST response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionAck {
    pub reaction: ReactionAckBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionAckBody {
    pub toggled_on: bool,
    pub emoji: String,
    pub message_id: i64,
    pub summary: crate::models::ReactionSummary,
}

impl From<ReactionToggle> for ReactionAck {
    fn from(t: ReactionToggle) -> Self {
        Self {
            reaction: ReactionAckBody {
                toggled_on: t.toggled_on,
                emoji: t.emoji,
                message_id: t.message_id,
                summary: t.summary,
            },
        }
    }
}
