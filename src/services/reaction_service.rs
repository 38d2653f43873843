use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::ConversationMember;
use crate::models::reaction::MAX_EMOJI_LEN;
use crate::models::{Message, ReactionSummary, ReactionToggle};
use crate::repository::ChatRepository;
use crate::websocket::{Broadcaster, ConnectionId, ServerEvent};

/// Largest id list accepted by `reactions_bulk`.
pub const MAX_BULK_IDS: usize = 200;

#[derive(Clone)]
pub struct ReactionService {
    repo: Arc<dyn ChatRepository>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl ReactionService {
    pub fn new(repo: Arc<dyn ChatRepository>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { repo, broadcaster }
    }

    async fn visible_message(&self, user_id: Uuid, message_id: i64) -> AppResult<Message> {
        let message = Message::visible(self.repo.get_message(message_id).await?)?;
        ConversationMember::verify(self.repo.as_ref(), user_id, message.conversation_id).await?;
        Ok(message)
    }

    async fn summary(&self, message_id: i64, viewer: Option<Uuid>) -> AppResult<ReactionSummary> {
        let reactions = self.repo.reactions_for_messages(&[message_id]).await?;
        Ok(ReactionSummary::from_reactions(&reactions, viewer))
    }

    /// Toggle: none → on, other emoji → replaced, same emoji → off. Always answers
    /// with the freshly recomputed snapshot.
    #[tracing::instrument(skip(self, origin))]
    pub async fn set_reaction(
        &self,
        user_id: Uuid,
        message_id: i64,
        emoji: &str,
        origin: Option<ConnectionId>,
    ) -> AppResult<ReactionToggle> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.len() > MAX_EMOJI_LEN {
            return Err(AppError::Validation(format!(
                "emoji must be 1 to {MAX_EMOJI_LEN} bytes"
            )));
        }
        let message = self.visible_message(user_id, message_id).await?;

        let toggled_on = self
            .repo
            .toggle_reaction(message.id, user_id, emoji)
            .await?;
        let summary = self.summary(message.id, Some(user_id)).await?;

        self.broadcaster
            .emit(
                message.conversation_id,
                ServerEvent::MessageReaction {
                    conversation_id: message.conversation_id,
                    message_id: message.id,
                    user_id,
                    emoji: emoji.to_string(),
                    toggled_on,
                },
                origin,
            )
            .await;
        self.broadcaster
            .emit(
                message.conversation_id,
                ServerEvent::ReactionUpdated {
                    conversation_id: message.conversation_id,
                    message_id: message.id,
                    groups: summary.groups.clone(),
                },
                origin,
            )
            .await;

        Ok(ReactionToggle {
            message_id: message.id,
            conversation_id: message.conversation_id,
            emoji: emoji.to_string(),
            toggled_on,
            summary,
        })
    }

    pub async fn reactions_for(&self, user_id: Uuid, message_id: i64) -> AppResult<ReactionSummary> {
        let message = self.visible_message(user_id, message_id).await?;
        self.summary(message.id, Some(user_id)).await
    }

    /// Snapshots for every requested message the caller can see; the rest are
    /// omitted rather than failing the whole request.
    pub async fn reactions_bulk(
        &self,
        user_id: Uuid,
        message_ids: &[i64],
    ) -> AppResult<BTreeMap<i64, ReactionSummary>> {
        let ids: Vec<i64> = message_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.len() > MAX_BULK_IDS {
            return Err(AppError::Validation(format!(
                "at most {MAX_BULK_IDS} message ids per request"
            )));
        }

        let mut membership: HashMap<Uuid, bool> = HashMap::new();
        let mut visible = Vec::new();
        for message in self.repo.get_messages(&ids).await? {
            if message.is_deleted {
                continue;
            }
            let is_member = match membership.get(&message.conversation_id) {
                Some(known) => *known,
                None => {
                    let known = self
                        .repo
                        .get_participant(message.conversation_id, user_id)
                        .await?
                        .is_some();
                    membership.insert(message.conversation_id, known);
                    known
                }
            };
            if is_member {
                visible.push(message.id);
            }
        }

        let reactions = self.repo.reactions_for_messages(&visible).await?;
        Ok(visible
            .into_iter()
            .map(|id| {
                let summary = ReactionSummary::from_reactions(
                    reactions.iter().filter(|r| r.message_id == id),
                    Some(user_id),
                );
                (id, summary)
            })
            .collect())
    }
}
