use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::ConversationMember;
use crate::models::message::MAX_ATTACHMENTS;
use crate::models::{
    Attachment, DeliveryStatus, Message, MessagePage, MessageView, NewMessage, PageDirection,
    PageInfo, PageRequest, PinnedMessage,
};
use crate::repository::ChatRepository;
use crate::services::hydration::MessageHydrator;
use crate::websocket::{Broadcaster, ConnectionId, ServerEvent};

/// Upper bound for client-supplied reconciliation tokens.
pub const MAX_CLIENT_MESSAGE_ID_LEN: usize = 128;

/// Payload of `sendMessage` (socket) and `POST /messages` (REST).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub replied_to_id: Option<i64>,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

impl SendMessageRequest {
    fn validate(&self) -> AppResult<()> {
        let has_content = self
            .content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if !has_content && self.attachments.is_empty() {
            return Err(AppError::Validation(
                "message needs content or at least one attachment".into(),
            ));
        }
        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(AppError::Validation(format!(
                "at most {MAX_ATTACHMENTS} attachments per message"
            )));
        }
        if self.attachments.iter().any(|a| a.url.trim().is_empty()) {
            return Err(AppError::Validation("attachment url must not be empty".into()));
        }
        match self.client_message_id.as_deref() {
            Some("") => Err(AppError::Validation("clientMessageId must not be empty".into())),
            Some(id) if id.len() > MAX_CLIENT_MESSAGE_ID_LEN => Err(AppError::Validation(
                format!("clientMessageId must be at most {MAX_CLIENT_MESSAGE_ID_LEN} bytes"),
            )),
            _ => Ok(()),
        }
    }
}

/// How a caller addresses a message for edits: by cursor id, or by the token it
/// generated before the server id was known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    Id(i64),
    Client {
        conversation_id: Uuid,
        client_message_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedMessageView {
    #[serde(flatten)]
    pub pin: PinnedMessage,
    pub message: MessageView,
}

#[derive(Clone)]
pub struct MessageService {
    repo: Arc<dyn ChatRepository>,
    hydrator: MessageHydrator,
    broadcaster: Arc<dyn Broadcaster>,
}

impl MessageService {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        hydrator: MessageHydrator,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            repo,
            hydrator,
            broadcaster,
        }
    }

    /// Persists the message, then broadcasts `receiveMessage` to the room minus
    /// `origin`. A repeated `clientMessageId` returns the stored message without a
    /// second broadcast.
    #[tracing::instrument(skip(self, request), fields(conversation_id = %request.conversation_id))]
    pub async fn append(
        &self,
        sender_id: Uuid,
        request: SendMessageRequest,
        origin: Option<ConnectionId>,
    ) -> AppResult<MessageView> {
        request.validate()?;
        ConversationMember::verify(self.repo.as_ref(), sender_id, request.conversation_id)
            .await?;

        if let Some(reply_id) = request.replied_to_id {
            let target = Message::visible(self.repo.get_message(reply_id).await?)?;
            if target.conversation_id != request.conversation_id {
                return Err(AppError::MessageNotFound);
            }
        }

        let (message, created) = self
            .repo
            .insert_message(NewMessage {
                conversation_id: request.conversation_id,
                sender_id,
                content: request.content.unwrap_or_default(),
                attachments: request.attachments,
                replied_to_id: request.replied_to_id,
                client_message_id: request.client_message_id,
            })
            .await?;

        let view = self.hydrator.hydrate_one(message, Some(sender_id)).await?;
        if created {
            tracing::debug!(message_id = view.id, "message appended");
            self.broadcaster
                .emit(
                    view.conversation_id,
                    ServerEvent::ReceiveMessage(view.for_broadcast()),
                    origin,
                )
                .await;
        } else {
            tracing::debug!(message_id = view.id, "duplicate clientMessageId, returning stored message");
        }
        Ok(view)
    }

    async fn resolve_target(&self, target: &MessageTarget, actor: Uuid) -> AppResult<Message> {
        let message = match target {
            MessageTarget::Id(id) => self.repo.get_message(*id).await?,
            MessageTarget::Client {
                conversation_id,
                client_message_id,
            } => {
                self.repo
                    .find_message_by_client_id(*conversation_id, actor, client_message_id)
                    .await?
            }
        };
        Message::visible(message)
    }

    /// Only the original sender may edit; deleted messages are `NotFound`.
    #[tracing::instrument(skip(self, content))]
    pub async fn edit(
        &self,
        editor_id: Uuid,
        target: MessageTarget,
        content: &str,
        origin: Option<ConnectionId>,
    ) -> AppResult<MessageView> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("content must not be empty".into()));
        }
        let message = self.resolve_target(&target, editor_id).await?;
        if message.sender_id != editor_id {
            return Err(AppError::Forbidden);
        }
        ConversationMember::verify(self.repo.as_ref(), editor_id, message.conversation_id).await?;

        let updated = self
            .repo
            .update_message_content(message.id, content, Utc::now())
            .await?;
        let view = self.hydrator.hydrate_one(updated, Some(editor_id)).await?;
        self.broadcaster
            .emit(
                view.conversation_id,
                ServerEvent::MessageEdited(view.for_broadcast()),
                origin,
            )
            .await;
        Ok(view)
    }

    /// Flags the message deleted and clears its content. Only the sender may delete.
    #[tracing::instrument(skip(self))]
    pub async fn soft_delete(
        &self,
        actor_id: Uuid,
        message_id: i64,
        origin: Option<ConnectionId>,
    ) -> AppResult<Message> {
        let message = Message::visible(self.repo.get_message(message_id).await?)?;
        ConversationMember::verify(self.repo.as_ref(), actor_id, message.conversation_id).await?;
        if message.sender_id != actor_id {
            return Err(AppError::Forbidden);
        }

        let deleted = self.repo.soft_delete_message(message_id).await?;
        self.broadcaster
            .emit(
                deleted.conversation_id,
                ServerEvent::MessageDeleted {
                    conversation_id: deleted.conversation_id,
                    message_id: deleted.id,
                },
                origin,
            )
            .await;
        Ok(deleted)
    }

    /// Cursor page of visible messages, always returned oldest-first.
    ///
    /// With `mark_delivered`, every returned message from someone else gets an
    /// advance-only `delivered` receipt in one batch.
    #[tracing::instrument(skip(self))]
    pub async fn page(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
        request: PageRequest,
    ) -> AppResult<MessagePage> {
        ConversationMember::verify(self.repo.as_ref(), viewer, conversation_id).await?;

        let mut rows = self
            .repo
            .page_messages(
                conversation_id,
                request.cursor,
                request.direction,
                request.limit + 1,
            )
            .await?;
        let has_more = rows.len() > request.limit;
        rows.truncate(request.limit);
        let next_cursor = rows.last().map(|m| m.id).or(request.cursor);
        if request.direction == PageDirection::Backward {
            rows.reverse();
        }

        if request.mark_delivered {
            let from_others: Vec<i64> = rows
                .iter()
                .filter(|m| m.sender_id != viewer)
                .map(|m| m.id)
                .collect();
            if !from_others.is_empty() {
                let advanced = self
                    .repo
                    .upsert_receipts(&from_others, viewer, DeliveryStatus::Delivered)
                    .await?;
                if !advanced.is_empty() {
                    self.broadcaster
                        .emit(
                            conversation_id,
                            ServerEvent::MessageDelivered {
                                conversation_id,
                                message_ids: advanced,
                                user_id: viewer,
                            },
                            None,
                        )
                        .await;
                }
            }
        }

        Ok(MessagePage {
            messages: self.hydrator.hydrate(rows, Some(viewer)).await?,
            page_info: PageInfo {
                has_more,
                next_cursor,
                direction: request.direction,
            },
        })
    }

    pub async fn pin_message(
        &self,
        actor_id: Uuid,
        message_id: i64,
        origin: Option<ConnectionId>,
    ) -> AppResult<PinnedMessage> {
        let message = Message::visible(self.repo.get_message(message_id).await?)?;
        ConversationMember::verify(self.repo.as_ref(), actor_id, message.conversation_id).await?;

        let pin = self
            .repo
            .pin_message(message.conversation_id, message.id, actor_id)
            .await?;
        self.broadcaster
            .emit(
                pin.conversation_id,
                ServerEvent::MessagePinned {
                    conversation_id: pin.conversation_id,
                    message_id: pin.message_id,
                    pinned_by: pin.pinned_by,
                },
                origin,
            )
            .await;
        Ok(pin)
    }

    pub async fn unpin_message(
        &self,
        actor_id: Uuid,
        message_id: i64,
        origin: Option<ConnectionId>,
    ) -> AppResult<()> {
        let message = self
            .repo
            .get_message(message_id)
            .await?
            .ok_or(AppError::MessageNotFound)?;
        ConversationMember::verify(self.repo.as_ref(), actor_id, message.conversation_id).await?;

        if self
            .repo
            .unpin_message(message.conversation_id, message.id)
            .await?
        {
            self.broadcaster
                .emit(
                    message.conversation_id,
                    ServerEvent::MessageUnpinned {
                        conversation_id: message.conversation_id,
                        message_id: message.id,
                    },
                    origin,
                )
                .await;
        }
        Ok(())
    }

    /// Pins of the conversation, most recent first.
    pub async fn pinned_messages(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Vec<PinnedMessageView>> {
        ConversationMember::verify(self.repo.as_ref(), viewer, conversation_id).await?;

        let pins = self.repo.pinned_messages(conversation_id).await?;
        let ids: Vec<i64> = pins.iter().map(|p| p.message_id).collect();
        let messages = self.repo.get_messages(&ids).await?;
        let views = self.hydrator.hydrate(messages, Some(viewer)).await?;

        Ok(pins
            .into_iter()
            .filter_map(|pin| {
                let message = views.iter().find(|v| v.id == pin.message_id)?.clone();
                Some(PinnedMessageView { pin, message })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachmentKind;

    fn request(content: Option<&str>) -> SendMessageRequest {
        SendMessageRequest {
            conversation_id: Uuid::new_v4(),
            content: content.map(str::to_string),
            attachments: Vec::new(),
            replied_to_id: None,
            client_message_id: Some("c1".into()),
        }
    }

    fn attachment() -> Attachment {
        Attachment {
            url: "https://cdn.example.com/a.png".into(),
            mime: "image/png".into(),
            name: None,
            size: Some(1024),
            kind: AttachmentKind::Image,
        }
    }

    #[test]
    fn test_blank_message_rejected() {
        assert!(matches!(
            request(Some("   ")).validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(request(None).validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_attachment_only_message_accepted() {
        let mut req = request(None);
        req.attachments.push(attachment());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_attachment_limit() {
        let mut req = request(Some("hi"));
        req.attachments = vec![attachment(); MAX_ATTACHMENTS + 1];
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_client_message_id_bounds() {
        let mut req = request(Some("hi"));
        req.client_message_id = Some(String::new());
        assert!(req.validate().is_err());
        req.client_message_id = Some("x".repeat(MAX_CLIENT_MESSAGE_ID_LEN + 1));
        assert!(req.validate().is_err());
        req.client_message_id = None;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_send_request_wire_format() {
        let conversation_id = Uuid::new_v4();
        let req: SendMessageRequest = serde_json::from_value(serde_json::json!({
            "conversationId": conversation_id,
            "content": "hi",
            "clientMessageId": "c1"
        }))
        .unwrap();
        assert_eq!(req.conversation_id, conversation_id);
        assert!(req.attachments.is_empty());
        assert!(req.replied_to_id.is_none());
    }
}
