use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    DeliveryReceipt, DeliverySummary, Message, MessageView, Reaction, ReactionSummary,
    ReplyPreview, UserSummary,
};
use crate::repository::ChatRepository;
use crate::services::user_directory::{resolve_users, UserDirectory};

/// Turns message rows into client views: sender, reply preview, reactions, pin flag
/// and, for the viewer's own messages, the delivery summary.
#[derive(Clone)]
pub struct MessageHydrator {
    repo: Arc<dyn ChatRepository>,
    users: Arc<dyn UserDirectory>,
}

impl MessageHydrator {
    pub fn new(repo: Arc<dyn ChatRepository>, users: Arc<dyn UserDirectory>) -> Self {
        Self { repo, users }
    }

    pub async fn hydrate_one(&self, message: Message, viewer: Option<Uuid>) -> AppResult<MessageView> {
        let mut views = self.hydrate(vec![message], viewer).await?;
        views.pop().ok_or(crate::error::AppError::Internal)
    }

    /// Order of `messages` is preserved.
    pub async fn hydrate(
        &self,
        messages: Vec<Message>,
        viewer: Option<Uuid>,
    ) -> AppResult<Vec<MessageView>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();

        let reply_ids: Vec<i64> = messages
            .iter()
            .filter_map(|m| m.replied_to_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let replies: HashMap<i64, Message> = self
            .repo
            .get_messages(&reply_ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut user_ids: Vec<Uuid> = messages.iter().map(|m| m.sender_id).collect();
        user_ids.extend(replies.values().map(|m| m.sender_id));
        let users = resolve_users(self.users.as_ref(), &user_ids).await?;

        let mut reactions: HashMap<i64, Vec<Reaction>> = HashMap::new();
        for reaction in self.repo.reactions_for_messages(&ids).await? {
            reactions.entry(reaction.message_id).or_default().push(reaction);
        }

        let mut pinned: HashSet<i64> = HashSet::new();
        let conversations: HashSet<Uuid> = messages.iter().map(|m| m.conversation_id).collect();
        for conversation_id in conversations {
            pinned.extend(
                self.repo
                    .pinned_messages(conversation_id)
                    .await?
                    .into_iter()
                    .map(|p| p.message_id),
            );
        }

        let own_ids: Vec<i64> = messages
            .iter()
            .filter(|m| Some(m.sender_id) == viewer)
            .map(|m| m.id)
            .collect();
        let mut receipts: HashMap<i64, Vec<DeliveryReceipt>> = HashMap::new();
        for receipt in self.repo.receipts_for_messages(&own_ids).await? {
            receipts.entry(receipt.message_id).or_default().push(receipt);
        }

        Ok(messages
            .into_iter()
            .map(|message| {
                let sender = users
                    .get(&message.sender_id)
                    .cloned()
                    .unwrap_or_else(|| UserSummary::placeholder(message.sender_id));

                let replied_to = message.replied_to_id.map(|reply_id| {
                    match replies.get(&reply_id).filter(|r| !r.is_deleted) {
                        Some(original) => ReplyPreview {
                            id: original.id,
                            sender: users.get(&original.sender_id).cloned(),
                            content: original.content.clone(),
                            is_deleted: false,
                        },
                        None => ReplyPreview::tombstone(reply_id),
                    }
                });

                let summary = ReactionSummary::from_reactions(
                    reactions.get(&message.id).into_iter().flatten(),
                    viewer,
                );

                let delivery = (Some(message.sender_id) == viewer).then(|| {
                    DeliverySummary::from_receipts(
                        receipts
                            .get(&message.id)
                            .into_iter()
                            .flatten()
                            .filter(|r| r.user_id != message.sender_id),
                    )
                });

                MessageView {
                    id: message.id,
                    conversation_id: message.conversation_id,
                    pinned: pinned.contains(&message.id),
                    sender,
                    content: message.content,
                    attachments: message.attachments,
                    replied_to,
                    client_message_id: message.client_message_id,
                    is_deleted: message.is_deleted,
                    edited_at: message.edited_at,
                    created_at: message.created_at,
                    reactions: summary,
                    delivery,
                }
            })
            .collect())
    }
}

impl MessageView {
    /// Copy without viewer-specific fields, for room broadcasts.
    pub fn for_broadcast(&self) -> MessageView {
        let mut view = self.clone();
        view.delivery = None;
        view.reactions.my_emoji = None;
        view
    }
}
