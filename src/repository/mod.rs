//! Storage seam for conversations, messages, receipts, reactions and pins.
//!
//! Every multi-row mutation (group creation, leave/teardown, soft-delete with
//! last-message repointing) is atomic inside a single call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Conversation, DeliveryReceipt, DeliveryStatus, LeaveOutcome, MemberRole, Message, NewMessage,
    PageDirection, Participant, PinnedMessage, Reaction, UserConversation,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryChatRepository;
pub use postgres::PgChatRepository;

#[async_trait]
pub trait ChatRepository: Send + Sync {
    // ---- conversations ----

    async fn find_direct(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>>;

    /// Creates the direct conversation for the pair. Fails with `Conflict` when one
    /// already exists (the pair key is unique).
    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation>;

    /// Creates a group; `creator` becomes owner, `members` (creator excluded) members.
    async fn create_group(
        &self,
        creator: Uuid,
        members: &[Uuid],
        name: Option<&str>,
    ) -> AppResult<Conversation>;

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserConversation>>;

    async fn conversation_ids_for_user(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    async fn set_conversation_pinned(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        pinned: bool,
    ) -> AppResult<()>;

    async fn touch_conversation(&self, conversation_id: Uuid, at: DateTime<Utc>)
        -> AppResult<()>;

    // ---- participants ----

    /// Participants in join order.
    async fn participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>>;

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>>;

    /// Fails with `Conflict` if the user already participates.
    async fn add_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> AppResult<Participant>;

    /// Removes the participant, handing ownership to the earliest-joined remaining
    /// participant when the owner leaves, and tearing the conversation down (receipts,
    /// reactions, pins, messages, conversation) when nobody remains.
    async fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<LeaveOutcome>;

    /// Sets the online flag on every participation of the user and returns the
    /// affected conversation ids.
    async fn set_online(&self, user_id: Uuid, online: bool) -> AppResult<Vec<Uuid>>;

    // ---- messages ----

    /// Persists the message and moves the conversation's last-message pointer.
    ///
    /// Idempotent per `(conversation, sender, client_message_id)`: a repeated send
    /// returns the stored message and `false`.
    async fn insert_message(&self, new: NewMessage) -> AppResult<(Message, bool)>;

    async fn get_message(&self, id: i64) -> AppResult<Option<Message>>;

    async fn get_messages(&self, ids: &[i64]) -> AppResult<Vec<Message>>;

    async fn find_message_by_client_id(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        client_message_id: &str,
    ) -> AppResult<Option<Message>>;

    async fn update_message_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Message>;

    /// Flags the message deleted, clears its content and repoints the conversation's
    /// last message to the previous visible one when needed.
    async fn soft_delete_message(&self, id: i64) -> AppResult<Message>;

    /// Up to `fetch` visible messages past `cursor`: newest-first for backward,
    /// oldest-first for forward.
    async fn page_messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<i64>,
        direction: PageDirection,
        fetch: usize,
    ) -> AppResult<Vec<Message>>;

    /// Ids of visible messages in the conversation not sent by `user_id`.
    async fn message_ids_from_others(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<i64>>;

    // ---- receipts ----

    /// Advance-only upsert. Returns the ids whose stored status actually changed.
    async fn upsert_receipts(
        &self,
        message_ids: &[i64],
        user_id: Uuid,
        status: DeliveryStatus,
    ) -> AppResult<Vec<i64>>;

    async fn receipts_for_messages(&self, ids: &[i64]) -> AppResult<Vec<DeliveryReceipt>>;

    // ---- reactions ----

    /// Create, replace or remove the user's reaction. Returns `true` when the
    /// emoji is active afterwards.
    async fn toggle_reaction(&self, message_id: i64, user_id: Uuid, emoji: &str)
        -> AppResult<bool>;

    async fn reactions_for_messages(&self, ids: &[i64]) -> AppResult<Vec<Reaction>>;

    // ---- pinned messages ----

    async fn pin_message(
        &self,
        conversation_id: Uuid,
        message_id: i64,
        pinned_by: Uuid,
    ) -> AppResult<PinnedMessage>;

    async fn unpin_message(&self, conversation_id: Uuid, message_id: i64) -> AppResult<bool>;

    async fn pinned_messages(&self, conversation_id: Uuid) -> AppResult<Vec<PinnedMessage>>;
}
