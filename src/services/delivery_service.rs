use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::ConversationMember;
use crate::models::DeliveryStatus;
use crate::repository::ChatRepository;
use crate::websocket::{Broadcaster, ConnectionId, ServerEvent};

/// Result of a receipt write: only the ids whose status actually advanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptBatch {
    pub conversation_id: Uuid,
    pub status: DeliveryStatus,
    pub message_ids: Vec<i64>,
}

/// Advance-only delivery and read tracking.
#[derive(Clone)]
pub struct DeliveryService {
    repo: Arc<dyn ChatRepository>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl DeliveryService {
    pub fn new(repo: Arc<dyn ChatRepository>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { repo, broadcaster }
    }

    pub async fn mark_delivered(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        origin: Option<ConnectionId>,
    ) -> AppResult<ReceiptBatch> {
        self.mark_conversation(user_id, conversation_id, DeliveryStatus::Delivered, origin)
            .await
    }

    /// Like `mark_delivered`, and also bumps the conversation's activity.
    pub async fn mark_read(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        origin: Option<ConnectionId>,
    ) -> AppResult<ReceiptBatch> {
        self.mark_conversation(user_id, conversation_id, DeliveryStatus::Read, origin)
            .await
    }

    /// Batch variant: every visible message in the conversation not sent by `user_id`.
    #[tracing::instrument(skip(self, origin))]
    pub async fn mark_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        status: DeliveryStatus,
        origin: Option<ConnectionId>,
    ) -> AppResult<ReceiptBatch> {
        ConversationMember::verify(self.repo.as_ref(), user_id, conversation_id).await?;

        let ids = self
            .repo
            .message_ids_from_others(conversation_id, user_id)
            .await?;
        let advanced = if ids.is_empty() {
            Vec::new()
        } else {
            self.repo.upsert_receipts(&ids, user_id, status).await?
        };
        if status == DeliveryStatus::Read {
            self.repo
                .touch_conversation(conversation_id, Utc::now())
                .await?;
        }

        self.publish(conversation_id, user_id, status, &advanced, origin)
            .await;
        Ok(ReceiptBatch {
            conversation_id,
            status,
            message_ids: advanced,
        })
    }

    /// Single-message variant used by the live `messageDelivered`/`messageRead`
    /// socket events. Receipts on one's own message are ignored.
    #[tracing::instrument(skip(self, origin))]
    pub async fn mark_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        message_id: i64,
        status: DeliveryStatus,
        origin: Option<ConnectionId>,
    ) -> AppResult<ReceiptBatch> {
        ConversationMember::verify(self.repo.as_ref(), user_id, conversation_id).await?;

        let message = self
            .repo
            .get_message(message_id)
            .await?
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or(AppError::MessageNotFound)?;

        let advanced = if message.sender_id == user_id {
            Vec::new()
        } else {
            self.repo
                .upsert_receipts(&[message.id], user_id, status)
                .await?
        };
        if status == DeliveryStatus::Read && !advanced.is_empty() {
            self.repo
                .touch_conversation(conversation_id, Utc::now())
                .await?;
        }

        self.publish(conversation_id, user_id, status, &advanced, origin)
            .await;
        Ok(ReceiptBatch {
            conversation_id,
            status,
            message_ids: advanced,
        })
    }

    async fn publish(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        status: DeliveryStatus,
        advanced: &[i64],
        origin: Option<ConnectionId>,
    ) {
        if advanced.is_empty() {
            return;
        }
        let message_ids = advanced.to_vec();
        let event = match status {
            DeliveryStatus::Read => ServerEvent::MessageRead {
                conversation_id,
                message_ids,
                user_id,
            },
            _ => ServerEvent::MessageDelivered {
                conversation_id,
                message_ids,
                user_id,
            },
        };
        self.broadcaster.emit(conversation_id, event, origin).await;
    }
}
