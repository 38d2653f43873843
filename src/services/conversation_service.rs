use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::ConversationMember;
use crate::models::conversation::MAX_GROUP_NAME_LEN;
use crate::models::{
    Conversation, ConversationSummary, LeaveOutcome, MemberRole, MessageView, ParticipantView,
    UserConversation,
};
use crate::repository::ChatRepository;
use crate::services::hydration::MessageHydrator;
use crate::services::user_directory::{resolve_users, UserDirectory};
use crate::websocket::{Broadcaster, ServerEvent};

/// Bounded retries for the direct-conversation find-or-create race.
const DIRECT_CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub member_ids: Vec<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct ConversationService {
    repo: Arc<dyn ChatRepository>,
    users: Arc<dyn UserDirectory>,
    hydrator: MessageHydrator,
    broadcaster: Arc<dyn Broadcaster>,
}

impl ConversationService {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        users: Arc<dyn UserDirectory>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            hydrator: MessageHydrator::new(repo.clone(), users.clone()),
            repo,
            users,
            broadcaster,
        }
    }

    /// Returns the direct conversation between the two users, creating it on first
    /// contact. Concurrent callers converge on one row through the unique pair key.
    #[tracing::instrument(skip(self))]
    pub async fn create_or_get_direct(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Conversation> {
        if user_a == user_b {
            return Err(AppError::Validation(
                "a direct conversation needs two distinct users".into(),
            ));
        }

        for attempt in 0..DIRECT_CREATE_ATTEMPTS {
            if let Some(existing) = self.repo.find_direct(user_a, user_b).await? {
                self.restore_direct_participants(&existing, &[user_a, user_b])
                    .await?;
                return Ok(existing);
            }

            match self.repo.create_direct(user_a, user_b).await {
                Ok(conversation) => {
                    self.announce_new_conversation(&conversation, &[user_a, user_b])
                        .await;
                    tracing::info!(conversation_id = %conversation.id, "direct conversation created");
                    return Ok(conversation);
                }
                Err(AppError::DirectConversationExists) => {
                    tracing::debug!(attempt, "direct conversation created concurrently, retrying lookup");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::DirectConversationExists)
    }

    /// A direct thread survives one side leaving; the returning user is re-added.
    async fn restore_direct_participants(
        &self,
        conversation: &Conversation,
        users: &[Uuid],
    ) -> AppResult<()> {
        for user_id in users {
            if self
                .repo
                .get_participant(conversation.id, *user_id)
                .await?
                .is_none()
            {
                match self
                    .repo
                    .add_participant(conversation.id, *user_id, MemberRole::Member)
                    .await
                {
                    Ok(_) | Err(AppError::ParticipantExists) => {
                        self.broadcaster.join_user(conversation.id, *user_id).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(members = request.member_ids.len()))]
    pub async fn create_group(
        &self,
        creator: Uuid,
        request: CreateGroupRequest,
    ) -> AppResult<Conversation> {
        let name = match request.name.as_deref().map(str::trim) {
            None => None,
            Some("") => {
                return Err(AppError::Validation("group name must not be blank".into()));
            }
            Some(name) if name.len() > MAX_GROUP_NAME_LEN => {
                return Err(AppError::Validation(format!(
                    "group name must be at most {MAX_GROUP_NAME_LEN} bytes"
                )));
            }
            Some(name) => Some(name.to_string()),
        };

        let mut seen = HashSet::from([creator]);
        let mut members = vec![creator];
        for id in request.member_ids {
            if seen.insert(id) {
                members.push(id);
            }
        }
        if members.len() < 2 {
            return Err(AppError::Validation(
                "a group needs at least 2 members".into(),
            ));
        }

        let conversation = self
            .repo
            .create_group(creator, &members, name.as_deref())
            .await?;
        self.announce_new_conversation(&conversation, &members).await;
        tracing::info!(conversation_id = %conversation.id, "group created");
        Ok(conversation)
    }

    async fn announce_new_conversation(&self, conversation: &Conversation, members: &[Uuid]) {
        for user_id in members {
            self.broadcaster.join_user(conversation.id, *user_id).await;
        }
        self.broadcaster
            .emit(
                conversation.id,
                ServerEvent::ConversationCreated(conversation.clone()),
                None,
            )
            .await;
    }

    /// Conversations of the user: pinned first (most recently pinned first), then
    /// by most recent activity.
    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let mut rows = self.repo.conversations_for_user(user_id).await?;
        rows.sort_by(|a, b| match (a.pinned_at, b.pinned_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b
                .conversation
                .last_activity_at
                .cmp(&a.conversation.last_activity_at),
        });
        self.summarize(rows, user_id).await
    }

    pub async fn get_for_user(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<ConversationSummary> {
        ConversationMember::verify(self.repo.as_ref(), user_id, conversation_id).await?;
        let rows = self
            .repo
            .conversations_for_user(user_id)
            .await?
            .into_iter()
            .filter(|row| row.conversation.id == conversation_id)
            .collect();
        self.summarize(rows, user_id)
            .await?
            .pop()
            .ok_or(AppError::ConversationNotFound)
    }

    async fn summarize(
        &self,
        rows: Vec<UserConversation>,
        viewer: Uuid,
    ) -> AppResult<Vec<ConversationSummary>> {
        let mut participants = HashMap::new();
        let mut user_ids = Vec::new();
        for row in &rows {
            let list = self.repo.participants(row.conversation.id).await?;
            user_ids.extend(list.iter().map(|p| p.user_id));
            participants.insert(row.conversation.id, list);
        }
        let users = resolve_users(self.users.as_ref(), &user_ids).await?;

        let last_ids: Vec<i64> = rows
            .iter()
            .filter_map(|row| row.conversation.last_message_id)
            .collect();
        let last_messages = self.repo.get_messages(&last_ids).await?;
        let mut last_views: HashMap<Uuid, MessageView> = self
            .hydrator
            .hydrate(
                last_messages.into_iter().filter(|m| !m.is_deleted).collect(),
                Some(viewer),
            )
            .await?
            .into_iter()
            .map(|view| (view.conversation_id, view))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.conversation.id;
                let participants = participants
                    .remove(&id)
                    .unwrap_or_default()
                    .iter()
                    .map(|p| {
                        let user = users
                            .get(&p.user_id)
                            .cloned()
                            .unwrap_or_else(|| crate::models::UserSummary::placeholder(p.user_id));
                        ParticipantView::new(p, user)
                    })
                    .collect();
                ConversationSummary {
                    last_message: last_views.remove(&id),
                    pinned: row.pinned_at.is_some(),
                    participants,
                    conversation: row.conversation,
                }
            })
            .collect())
    }

    pub async fn set_pinned(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        pinned: bool,
    ) -> AppResult<()> {
        ConversationMember::verify(self.repo.as_ref(), user_id, conversation_id).await?;
        self.repo
            .set_conversation_pinned(conversation_id, user_id, pinned)
            .await
    }

    /// Adds `user_id` to a group. The actor must be admin or owner and may only
    /// grant roles strictly below their own.
    #[tracing::instrument(skip(self))]
    pub async fn add_participant(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> AppResult<ParticipantView> {
        let member = ConversationMember::verify(self.repo.as_ref(), actor, conversation_id).await?;
        member.require_group()?;
        member.require_admin()?;
        if !member.can_manage_role(role) {
            return Err(AppError::Forbidden);
        }

        let participant = self
            .repo
            .add_participant(conversation_id, user_id, role)
            .await?;
        let user = resolve_users(self.users.as_ref(), &[user_id])
            .await?
            .remove(&user_id)
            .unwrap_or_else(|| crate::models::UserSummary::placeholder(user_id));
        let view = ParticipantView::new(&participant, user);

        self.broadcaster.join_user(conversation_id, user_id).await;
        self.broadcaster
            .emit(
                conversation_id,
                ServerEvent::ParticipantAdded {
                    conversation_id,
                    participant: view.clone(),
                },
                None,
            )
            .await;
        Ok(view)
    }

    /// Removes `target` (the actor itself when `None`). Removing someone else needs
    /// admin or owner, is limited to groups, and never applies to the owner. The last
    /// participant leaving tears the conversation down.
    #[tracing::instrument(skip(self))]
    pub async fn leave(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Option<Uuid>,
    ) -> AppResult<LeaveOutcome> {
        let member = ConversationMember::verify(self.repo.as_ref(), actor, conversation_id).await?;
        let target = target.unwrap_or(actor);

        if target != actor {
            member.require_group()?;
            member.require_admin()?;
            let victim = self
                .repo
                .get_participant(conversation_id, target)
                .await?
                .ok_or(AppError::ParticipantNotFound)?;
            if victim.role == MemberRole::Owner || !member.can_manage_role(victim.role) {
                return Err(AppError::Forbidden);
            }
        }

        let outcome = self.repo.remove_participant(conversation_id, target).await?;
        match &outcome {
            LeaveOutcome::Removed { promoted_owner } => {
                self.broadcaster
                    .emit(
                        conversation_id,
                        ServerEvent::ParticipantRemoved {
                            conversation_id,
                            user_id: target,
                            promoted_owner: *promoted_owner,
                        },
                        None,
                    )
                    .await;
                self.broadcaster.leave_user(conversation_id, target).await;
            }
            LeaveOutcome::ConversationDeleted => {
                self.broadcaster
                    .emit(conversation_id, ServerEvent::ChatDeleted { conversation_id }, None)
                    .await;
                self.broadcaster.close_room(conversation_id).await;
                tracing::info!(%conversation_id, "last participant left, conversation deleted");
            }
        }
        Ok(outcome)
    }

    /// Bumps activity so read receipts surface in conversation ordering.
    pub async fn touch(&self, conversation_id: Uuid) -> AppResult<()> {
        self.repo.touch_conversation(conversation_id, Utc::now()).await
    }
}
