use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ChatRepository;
use crate::error::{AppError, AppResult};
use crate::models::{
    direct_key, Conversation, DeliveryReceipt, DeliveryStatus, LeaveOutcome, MemberRole, Message,
    NewMessage, PageDirection, Participant, PinnedMessage, Reaction, UserConversation,
};

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<Uuid, Conversation>,
    direct_keys: HashMap<String, Uuid>,
    // conversation_id -> participants in join order
    participants: HashMap<Uuid, Vec<Participant>>,
    // (conversation_id, user_id) -> pinned_at
    conversation_pins: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    messages: BTreeMap<i64, Message>,
    last_message_id: i64,
    receipts: HashMap<(i64, Uuid), DeliveryReceipt>,
    reactions: HashMap<(i64, Uuid), Reaction>,
    pinned_messages: BTreeMap<(Uuid, i64), PinnedMessage>,
}

impl MemoryState {
    fn new_conversation(&mut self, is_group: bool, name: Option<&str>, creator: Uuid) -> Conversation {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            is_group,
            name: name.map(str::to_string),
            created_by: creator,
            last_message_id: None,
            last_activity_at: now,
            created_at: now,
        };
        self.conversations
            .insert(conversation.id, conversation.clone());
        conversation
    }

    fn push_participant(&mut self, conversation_id: Uuid, user_id: Uuid, role: MemberRole) -> Participant {
        let participant = Participant {
            conversation_id,
            user_id,
            role,
            online: false,
            joined_at: Utc::now(),
        };
        self.participants
            .entry(conversation_id)
            .or_default()
            .push(participant.clone());
        participant
    }

    fn latest_visible_message(&self, conversation_id: Uuid) -> Option<i64> {
        self.messages
            .values()
            .rev()
            .find(|m| m.conversation_id == conversation_id && !m.is_deleted)
            .map(|m| m.id)
    }

    fn teardown(&mut self, conversation_id: Uuid) {
        let message_ids: Vec<i64> = self
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.id)
            .collect();

        self.receipts
            .retain(|(message_id, _), _| !message_ids.contains(message_id));
        self.reactions
            .retain(|(message_id, _), _| !message_ids.contains(message_id));
        self.pinned_messages
            .retain(|(conv_id, _), _| *conv_id != conversation_id);
        for id in &message_ids {
            self.messages.remove(id);
        }
        self.conversation_pins
            .retain(|(conv_id, _), _| *conv_id != conversation_id);
        self.direct_keys.retain(|_, conv_id| *conv_id != conversation_id);
        self.participants.remove(&conversation_id);
        self.conversations.remove(&conversation_id);
    }
}

/// Process-local repository with the same semantics as the Postgres one.
///
/// Backs the test-suite and `STORAGE_BACKEND=memory` development runs.
#[derive(Default)]
pub struct InMemoryChatRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn find_direct(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state
            .direct_keys
            .get(&direct_key(a, b))
            .and_then(|id| state.conversations.get(id))
            .cloned())
    }

    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let mut state = self.state.write().await;
        let key = direct_key(a, b);
        if state.direct_keys.contains_key(&key) {
            return Err(AppError::DirectConversationExists);
        }

        let conversation = state.new_conversation(false, None, a);
        state.direct_keys.insert(key, conversation.id);
        state.push_participant(conversation.id, a, MemberRole::Member);
        state.push_participant(conversation.id, b, MemberRole::Member);
        Ok(conversation)
    }

    async fn create_group(
        &self,
        creator: Uuid,
        members: &[Uuid],
        name: Option<&str>,
    ) -> AppResult<Conversation> {
        let mut state = self.state.write().await;
        let conversation = state.new_conversation(true, name, creator);
        state.push_participant(conversation.id, creator, MemberRole::Owner);
        for member in members.iter().filter(|m| **m != creator) {
            state.push_participant(conversation.id, *member, MemberRole::Member);
        }
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserConversation>> {
        let state = self.state.read().await;
        Ok(state
            .participants
            .iter()
            .filter(|(_, list)| list.iter().any(|p| p.user_id == user_id))
            .filter_map(|(conv_id, _)| state.conversations.get(conv_id))
            .map(|conversation| UserConversation {
                conversation: conversation.clone(),
                pinned_at: state
                    .conversation_pins
                    .get(&(conversation.id, user_id))
                    .copied(),
            })
            .collect())
    }

    async fn conversation_ids_for_user(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .participants
            .iter()
            .filter(|(_, list)| list.iter().any(|p| p.user_id == user_id))
            .map(|(conv_id, _)| *conv_id)
            .collect())
    }

    async fn set_conversation_pinned(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        pinned: bool,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        if pinned {
            state
                .conversation_pins
                .insert((conversation_id, user_id), Utc::now());
        } else {
            state.conversation_pins.remove(&(conversation_id, user_id));
        }
        Ok(())
    }

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        if let Some(conversation) = state.conversations.get_mut(&conversation_id) {
            conversation.last_activity_at = conversation.last_activity_at.max(at);
        }
        Ok(())
    }

    async fn participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        Ok(self
            .state
            .read()
            .await
            .participants
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>> {
        Ok(self
            .state
            .read()
            .await
            .participants
            .get(&conversation_id)
            .and_then(|list| list.iter().find(|p| p.user_id == user_id))
            .cloned())
    }

    async fn add_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> AppResult<Participant> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&conversation_id) {
            return Err(AppError::ConversationNotFound);
        }
        let exists = state
            .participants
            .get(&conversation_id)
            .is_some_and(|list| list.iter().any(|p| p.user_id == user_id));
        if exists {
            return Err(AppError::ParticipantExists);
        }
        Ok(state.push_participant(conversation_id, user_id, role))
    }

    async fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<LeaveOutcome> {
        let mut state = self.state.write().await;
        let list = state
            .participants
            .get_mut(&conversation_id)
            .ok_or(AppError::ConversationNotFound)?;
        let pos = list
            .iter()
            .position(|p| p.user_id == user_id)
            .ok_or(AppError::ParticipantNotFound)?;
        let removed = list.remove(pos);

        if list.is_empty() {
            state.teardown(conversation_id);
            return Ok(LeaveOutcome::ConversationDeleted);
        }

        let mut promoted_owner = None;
        if removed.role == MemberRole::Owner {
            if let Some(heir) = list.first_mut() {
                heir.role = MemberRole::Owner;
                promoted_owner = Some(heir.user_id);
            }
        }
        state.conversation_pins.remove(&(conversation_id, user_id));
        Ok(LeaveOutcome::Removed { promoted_owner })
    }

    async fn set_online(&self, user_id: Uuid, online: bool) -> AppResult<Vec<Uuid>> {
        let mut state = self.state.write().await;
        let mut affected = Vec::new();
        for (conv_id, list) in state.participants.iter_mut() {
            if let Some(p) = list.iter_mut().find(|p| p.user_id == user_id) {
                p.online = online;
                affected.push(*conv_id);
            }
        }
        Ok(affected)
    }

    async fn insert_message(&self, new: NewMessage) -> AppResult<(Message, bool)> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&new.conversation_id) {
            return Err(AppError::ConversationNotFound);
        }

        if let Some(client_id) = new.client_message_id.as_deref() {
            let existing = state.messages.values().find(|m| {
                m.conversation_id == new.conversation_id
                    && m.sender_id == new.sender_id
                    && m.client_message_id.as_deref() == Some(client_id)
            });
            if let Some(existing) = existing {
                return Ok((existing.clone(), false));
            }
        }

        state.last_message_id += 1;
        let message = Message {
            id: state.last_message_id,
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            content: new.content,
            attachments: new.attachments,
            replied_to_id: new.replied_to_id,
            client_message_id: new.client_message_id,
            is_deleted: false,
            edited_at: None,
            created_at: Utc::now(),
        };
        state.messages.insert(message.id, message.clone());

        if let Some(conversation) = state.conversations.get_mut(&message.conversation_id) {
            conversation.last_message_id = Some(message.id);
            conversation.last_activity_at = message.created_at;
        }
        Ok((message, true))
    }

    async fn get_message(&self, id: i64) -> AppResult<Option<Message>> {
        Ok(self.state.read().await.messages.get(&id).cloned())
    }

    async fn get_messages(&self, ids: &[i64]) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.messages.get(id))
            .cloned()
            .collect())
    }

    async fn find_message_by_client_id(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        client_message_id: &str,
    ) -> AppResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .values()
            .find(|m| {
                m.conversation_id == conversation_id
                    && m.sender_id == sender_id
                    && m.client_message_id.as_deref() == Some(client_message_id)
            })
            .cloned())
    }

    async fn update_message_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Message> {
        let mut state = self.state.write().await;
        let message = state
            .messages
            .get_mut(&id)
            .filter(|m| !m.is_deleted)
            .ok_or(AppError::MessageNotFound)?;
        message.content = content.to_string();
        message.edited_at = Some(edited_at);
        Ok(message.clone())
    }

    async fn soft_delete_message(&self, id: i64) -> AppResult<Message> {
        let mut state = self.state.write().await;
        let message = state
            .messages
            .get_mut(&id)
            .filter(|m| !m.is_deleted)
            .ok_or(AppError::MessageNotFound)?;
        message.is_deleted = true;
        message.content.clear();
        message.attachments.clear();
        let deleted = message.clone();

        state
            .pinned_messages
            .remove(&(deleted.conversation_id, deleted.id));

        let points_here = state
            .conversations
            .get(&deleted.conversation_id)
            .is_some_and(|c| c.last_message_id == Some(deleted.id));
        if points_here {
            let previous = state.latest_visible_message(deleted.conversation_id);
            if let Some(conversation) = state.conversations.get_mut(&deleted.conversation_id) {
                conversation.last_message_id = previous;
            }
        }
        Ok(deleted)
    }

    async fn page_messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<i64>,
        direction: PageDirection,
        fetch: usize,
    ) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        let visible = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id && !m.is_deleted);

        let page = match direction {
            PageDirection::Backward => visible
                .rev()
                .filter(|m| cursor.map_or(true, |c| m.id < c))
                .take(fetch)
                .cloned()
                .collect(),
            PageDirection::Forward => visible
                .filter(|m| cursor.map_or(true, |c| m.id > c))
                .take(fetch)
                .cloned()
                .collect(),
        };
        Ok(page)
    }

    async fn message_ids_from_others(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .values()
            .filter(|m| {
                m.conversation_id == conversation_id && m.sender_id != user_id && !m.is_deleted
            })
            .map(|m| m.id)
            .collect())
    }

    async fn upsert_receipts(
        &self,
        message_ids: &[i64],
        user_id: Uuid,
        status: DeliveryStatus,
    ) -> AppResult<Vec<i64>> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut advanced = Vec::new();
        for &message_id in message_ids {
            if !state.messages.contains_key(&message_id) {
                continue;
            }
            let key = (message_id, user_id);
            let current = state.receipts.get(&key).map(|r| r.status);
            if current.is_some_and(|existing| existing >= status) {
                continue;
            }
            state.receipts.insert(
                key,
                DeliveryReceipt {
                    message_id,
                    user_id,
                    status,
                    updated_at: now,
                },
            );
            advanced.push(message_id);
        }
        Ok(advanced)
    }

    async fn receipts_for_messages(&self, ids: &[i64]) -> AppResult<Vec<DeliveryReceipt>> {
        let state = self.state.read().await;
        Ok(state
            .receipts
            .values()
            .filter(|r| ids.contains(&r.message_id))
            .cloned()
            .collect())
    }

    async fn toggle_reaction(
        &self,
        message_id: i64,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let key = (message_id, user_id);
        let current = state.reactions.get(&key).map(|r| r.emoji.clone());
        match current {
            Some(existing) if existing == emoji => {
                state.reactions.remove(&key);
                Ok(false)
            }
            _ => {
                state.reactions.insert(
                    key,
                    Reaction {
                        message_id,
                        user_id,
                        emoji: emoji.to_string(),
                        created_at: Utc::now(),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn reactions_for_messages(&self, ids: &[i64]) -> AppResult<Vec<Reaction>> {
        let state = self.state.read().await;
        Ok(state
            .reactions
            .values()
            .filter(|r| ids.contains(&r.message_id))
            .cloned()
            .collect())
    }

    async fn pin_message(
        &self,
        conversation_id: Uuid,
        message_id: i64,
        pinned_by: Uuid,
    ) -> AppResult<PinnedMessage> {
        let mut state = self.state.write().await;
        Ok(state
            .pinned_messages
            .entry((conversation_id, message_id))
            .or_insert_with(|| PinnedMessage {
                conversation_id,
                message_id,
                pinned_by,
                pinned_at: Utc::now(),
            })
            .clone())
    }

    async fn unpin_message(&self, conversation_id: Uuid, message_id: i64) -> AppResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .pinned_messages
            .remove(&(conversation_id, message_id))
            .is_some())
    }

    async fn pinned_messages(&self, conversation_id: Uuid) -> AppResult<Vec<PinnedMessage>> {
        let state = self.state.read().await;
        let mut pins: Vec<PinnedMessage> = state
            .pinned_messages
            .values()
            .filter(|p| p.conversation_id == conversation_id)
            .cloned()
            .collect();
        pins.sort_by(|a, b| b.pinned_at.cmp(&a.pinned_at));
        Ok(pins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(conversation_id: Uuid, sender_id: Uuid, content: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id,
            content: content.to_string(),
            attachments: Vec::new(),
            replied_to_id: None,
            client_message_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_direct_conflicts_on_same_pair() {
        let repo = InMemoryChatRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        repo.create_direct(a, b).await.unwrap();
        let err = repo.create_direct(b, a).await.unwrap_err();
        assert!(matches!(err, AppError::DirectConversationExists));
    }

    #[tokio::test]
    async fn test_soft_delete_repoints_last_message() {
        let repo = InMemoryChatRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = repo.create_direct(a, b).await.unwrap();
        let (first, _) = repo.insert_message(text(conv.id, a, "one")).await.unwrap();
        let (second, _) = repo.insert_message(text(conv.id, b, "two")).await.unwrap();

        let stored = repo.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_id, Some(second.id));

        repo.soft_delete_message(second.id).await.unwrap();
        let stored = repo.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_id, Some(first.id));

        repo.soft_delete_message(first.id).await.unwrap();
        let stored = repo.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_id, None);
    }

    #[tokio::test]
    async fn test_receipts_never_regress() {
        let repo = InMemoryChatRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = repo.create_direct(a, b).await.unwrap();
        let (msg, _) = repo.insert_message(text(conv.id, a, "hi")).await.unwrap();

        assert_eq!(
            repo.upsert_receipts(&[msg.id], b, DeliveryStatus::Read).await.unwrap(),
            vec![msg.id]
        );
        assert!(repo
            .upsert_receipts(&[msg.id], b, DeliveryStatus::Delivered)
            .await
            .unwrap()
            .is_empty());

        let receipts = repo.receipts_for_messages(&[msg.id]).await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn test_teardown_removes_everything() {
        let repo = InMemoryChatRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = repo.create_direct(a, b).await.unwrap();
        let (msg, _) = repo.insert_message(text(conv.id, a, "hi")).await.unwrap();
        repo.toggle_reaction(msg.id, b, "👍").await.unwrap();
        repo.upsert_receipts(&[msg.id], b, DeliveryStatus::Delivered)
            .await
            .unwrap();

        assert_eq!(
            repo.remove_participant(conv.id, a).await.unwrap(),
            LeaveOutcome::Removed {
                promoted_owner: None
            }
        );
        assert_eq!(
            repo.remove_participant(conv.id, b).await.unwrap(),
            LeaveOutcome::ConversationDeleted
        );

        assert!(repo.get_conversation(conv.id).await.unwrap().is_none());
        assert!(repo.get_message(msg.id).await.unwrap().is_none());
        assert!(repo.reactions_for_messages(&[msg.id]).await.unwrap().is_empty());
        assert!(repo.receipts_for_messages(&[msg.id]).await.unwrap().is_empty());
        assert!(repo.find_direct(a, b).await.unwrap().is_none());
    }
}
