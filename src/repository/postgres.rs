use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::ChatRepository;
use crate::error::{AppError, AppResult};
use crate::models::{
    direct_key, Attachment, Conversation, DeliveryReceipt, DeliveryStatus, LeaveOutcome,
    MemberRole, Message, NewMessage, PageDirection, Participant, PinnedMessage, Reaction,
    UserConversation,
};

const CONVERSATION_COLUMNS: &str =
    "c.id, c.is_group, c.name, c.created_by, c.last_message_id, c.last_activity_at, c.created_at";

const PARTICIPANT_COLUMNS: &str = "conversation_id, user_id, role, online, joined_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, attachments, \
     replied_to_id, client_message_id, is_deleted, edited_at, created_at";

#[derive(sqlx::FromRow)]
struct ConversationRecord {
    id: Uuid,
    is_group: bool,
    name: Option<String>,
    created_by: Uuid,
    last_message_id: Option<i64>,
    last_activity_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<ConversationRecord> for Conversation {
    fn from(r: ConversationRecord) -> Self {
        Conversation {
            id: r.id,
            is_group: r.is_group,
            name: r.name,
            created_by: r.created_by,
            last_message_id: r.last_message_id,
            last_activity_at: r.last_activity_at,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserConversationRecord {
    #[sqlx(flatten)]
    conversation: ConversationRecord,
    pinned_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ParticipantRecord {
    conversation_id: Uuid,
    user_id: Uuid,
    role: String,
    online: bool,
    joined_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = AppError;

    fn try_from(r: ParticipantRecord) -> Result<Self, Self::Error> {
        let role = MemberRole::from_db(&r.role)
            .ok_or_else(|| AppError::Database(format!("invalid role in database: {}", r.role)))?;
        Ok(Participant {
            conversation_id: r.conversation_id,
            user_id: r.user_id,
            role,
            online: r.online,
            joined_at: r.joined_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRecord {
    id: i64,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    attachments: Json<Vec<Attachment>>,
    replied_to_id: Option<i64>,
    client_message_id: Option<String>,
    is_deleted: bool,
    edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(r: MessageRecord) -> Self {
        Message {
            id: r.id,
            conversation_id: r.conversation_id,
            sender_id: r.sender_id,
            content: r.content,
            attachments: r.attachments.0,
            replied_to_id: r.replied_to_id,
            client_message_id: r.client_message_id,
            is_deleted: r.is_deleted,
            edited_at: r.edited_at,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReceiptRecord {
    message_id: i64,
    user_id: Uuid,
    status: i16,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReceiptRecord> for DeliveryReceipt {
    type Error = AppError;

    fn try_from(r: ReceiptRecord) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::from_rank(r.status)
            .ok_or_else(|| AppError::Database(format!("invalid receipt status: {}", r.status)))?;
        Ok(DeliveryReceipt {
            message_id: r.message_id,
            user_id: r.user_id,
            status,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReactionRecord {
    message_id: i64,
    user_id: Uuid,
    emoji: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PinnedMessageRecord {
    conversation_id: Uuid,
    message_id: i64,
    pinned_by: Uuid,
    pinned_at: DateTime<Utc>,
}

impl From<PinnedMessageRecord> for PinnedMessage {
    fn from(r: PinnedMessageRecord) -> Self {
        PinnedMessage {
            conversation_id: r.conversation_id,
            message_id: r.message_id,
            pinned_by: r.pinned_by,
            pinned_at: r.pinned_at,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// sqlx-backed repository. Receipts and reactions rely on conditional upserts,
/// direct conversations on the unique `direct_key`.
#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_participant(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> AppResult<Participant> {
        let record = sqlx::query_as::<_, ParticipantRecord>(&format!(
            "INSERT INTO conversation_participants (conversation_id, user_id, role) \
             VALUES ($1, $2, $3) RETURNING {PARTICIPANT_COLUMNS}"
        ))
        .bind(conversation_id)
        .bind(user_id)
        .bind(role.to_db())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::ParticipantExists
            } else if is_foreign_key_violation(&e) {
                AppError::ConversationNotFound
            } else {
                AppError::from(e)
            }
        })?;
        record.try_into()
    }

    async fn teardown(tx: &mut Transaction<'_, Postgres>, conversation_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "DELETE FROM message_receipts WHERE message_id IN \
             (SELECT id FROM messages WHERE conversation_id = $1)",
        )
        .bind(conversation_id)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "DELETE FROM message_reactions WHERE message_id IN \
             (SELECT id FROM messages WHERE conversation_id = $1)",
        )
        .bind(conversation_id)
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM pinned_messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn find_direct(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.direct_key = $1"
        ))
        .bind(direct_key(a, b))
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(Into::into))
    }

    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "INSERT INTO conversations AS c (id, is_group, created_by, direct_key) \
             VALUES ($1, FALSE, $2, $3) \
             ON CONFLICT (direct_key) DO NOTHING \
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(a)
        .bind(direct_key(a, b))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::DirectConversationExists)?;

        Self::insert_participant(&mut tx, record.id, a, MemberRole::Member).await?;
        Self::insert_participant(&mut tx, record.id, b, MemberRole::Member).await?;

        tx.commit().await?;
        Ok(record.into())
    }

    async fn create_group(
        &self,
        creator: Uuid,
        members: &[Uuid],
        name: Option<&str>,
    ) -> AppResult<Conversation> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "INSERT INTO conversations AS c (id, is_group, name, created_by) \
             VALUES ($1, TRUE, $2, $3) RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(creator)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_participant(&mut tx, record.id, creator, MemberRole::Owner).await?;
        for member in members.iter().filter(|m| **m != creator) {
            Self::insert_participant(&mut tx, record.id, *member, MemberRole::Member).await?;
        }

        tx.commit().await?;
        Ok(record.into())
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(Into::into))
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserConversation>> {
        let records = sqlx::query_as::<_, UserConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS}, p.pinned_at \
             FROM conversations c \
             JOIN conversation_participants p ON p.conversation_id = c.id \
             WHERE p.user_id = $1"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(|r| UserConversation {
                conversation: r.conversation.into(),
                pinned_at: r.pinned_at,
            })
            .collect())
    }

    async fn conversation_ids_for_user(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT conversation_id FROM conversation_participants WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn set_conversation_pinned(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        pinned: bool,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversation_participants \
             SET pinned_at = CASE WHEN $3 THEN NOW() ELSE NULL END \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(pinned)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations SET last_activity_at = GREATEST(last_activity_at, $2) \
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        let records = sqlx::query_as::<_, ParticipantRecord>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM conversation_participants \
             WHERE conversation_id = $1 ORDER BY joined_at, join_seq"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>> {
        let record = sqlx::query_as::<_, ParticipantRecord>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id = $2"
        ))
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        record.map(TryInto::try_into).transpose()
    }

    async fn add_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> AppResult<Participant> {
        let mut tx = self.pool.begin().await?;
        let participant = Self::insert_participant(&mut tx, conversation_id, user_id, role).await?;
        tx.commit().await?;
        Ok(participant)
    }

    async fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<LeaveOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent leaves so the zero-participant check is exact.
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::ConversationNotFound)?;

        let removed_role = sqlx::query_scalar::<_, String>(
            "DELETE FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id = $2 RETURNING role",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::ParticipantNotFound)?;

        let remaining = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(&mut *tx)
        .await?;

        if remaining == 0 {
            Self::teardown(&mut tx, conversation_id).await?;
            tx.commit().await?;
            return Ok(LeaveOutcome::ConversationDeleted);
        }

        let mut promoted_owner = None;
        if MemberRole::from_db(&removed_role) == Some(MemberRole::Owner) {
            promoted_owner = sqlx::query_scalar::<_, Uuid>(
                "UPDATE conversation_participants SET role = 'owner' \
                 WHERE conversation_id = $1 AND user_id = ( \
                     SELECT user_id FROM conversation_participants \
                     WHERE conversation_id = $1 \
                     ORDER BY joined_at, join_seq LIMIT 1) \
                 RETURNING user_id",
            )
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(LeaveOutcome::Removed { promoted_owner })
    }

    async fn set_online(&self, user_id: Uuid, online: bool) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "UPDATE conversation_participants SET online = $2 WHERE user_id = $1 \
             RETURNING conversation_id",
        )
        .bind(user_id)
        .bind(online)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_message(&self, new: NewMessage) -> AppResult<(Message, bool)> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages \
             (conversation_id, sender_id, content, attachments, replied_to_id, client_message_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (conversation_id, sender_id, client_message_id) \
                 WHERE client_message_id IS NOT NULL DO NOTHING \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(&new.content)
        .bind(Json(&new.attachments))
        .bind(new.replied_to_id)
        .bind(new.client_message_id.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::ConversationNotFound
            } else {
                AppError::from(e)
            }
        })?;

        let Some(record) = inserted else {
            // Repeated send of an already stored client message id.
            tx.rollback().await?;
            let client_id = new.client_message_id.as_deref().unwrap_or_default();
            let existing = self
                .find_message_by_client_id(new.conversation_id, new.sender_id, client_id)
                .await?
                .ok_or(AppError::Internal)?;
            return Ok((existing, false));
        };

        sqlx::query(
            "UPDATE conversations \
             SET last_message_id = GREATEST(COALESCE(last_message_id, 0), $2), \
                 last_activity_at = GREATEST(last_activity_at, $3) \
             WHERE id = $1",
        )
        .bind(record.conversation_id)
        .bind(record.id)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((record.into(), true))
    }

    async fn get_message(&self, id: i64) -> AppResult<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(Into::into))
    }

    async fn get_messages(&self, ids: &[i64]) -> AppResult<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn find_message_by_client_id(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        client_message_id: &str,
    ) -> AppResult<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND sender_id = $2 AND client_message_id = $3"
        ))
        .bind(conversation_id)
        .bind(sender_id)
        .bind(client_message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(Into::into))
    }

    async fn update_message_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "UPDATE messages SET content = $2, edited_at = $3 \
             WHERE id = $1 AND is_deleted = FALSE RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .bind(edited_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::MessageNotFound)?;
        Ok(record.into())
    }

    async fn soft_delete_message(&self, id: i64) -> AppResult<Message> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "UPDATE messages \
             SET is_deleted = TRUE, content = '', attachments = '[]'::jsonb, deleted_at = NOW() \
             WHERE id = $1 AND is_deleted = FALSE RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::MessageNotFound)?;

        sqlx::query("DELETE FROM pinned_messages WHERE message_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE conversations SET last_message_id = ( \
                 SELECT id FROM messages \
                 WHERE conversation_id = $1 AND is_deleted = FALSE \
                 ORDER BY id DESC LIMIT 1) \
             WHERE id = $1 AND last_message_id = $2",
        )
        .bind(record.conversation_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record.into())
    }

    async fn page_messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<i64>,
        direction: PageDirection,
        fetch: usize,
    ) -> AppResult<Vec<Message>> {
        let (bound, order) = match direction {
            PageDirection::Backward => ("id < $2", "DESC"),
            PageDirection::Forward => ("id > $2", "ASC"),
        };
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND is_deleted = FALSE \
               AND ($2::BIGINT IS NULL OR {bound}) \
             ORDER BY id {order} LIMIT $3"
        ))
        .bind(conversation_id)
        .bind(cursor)
        .bind(fetch as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn message_ids_from_others(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM messages \
             WHERE conversation_id = $1 AND sender_id <> $2 AND is_deleted = FALSE \
             ORDER BY id",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn upsert_receipts(
        &self,
        message_ids: &[i64],
        user_id: Uuid,
        status: DeliveryStatus,
    ) -> AppResult<Vec<i64>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        // Advance-only: the WHERE clause makes a concurrent lower status a no-op.
        let advanced = sqlx::query_scalar::<_, i64>(
            "INSERT INTO message_receipts (message_id, user_id, status, updated_at) \
             SELECT m.id, $2, $3, NOW() FROM messages m WHERE m.id = ANY($1) \
             ON CONFLICT (message_id, user_id) DO UPDATE \
                 SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at \
                 WHERE message_receipts.status < EXCLUDED.status \
             RETURNING message_id",
        )
        .bind(message_ids)
        .bind(user_id)
        .bind(status.rank())
        .fetch_all(&self.pool)
        .await?;
        Ok(advanced)
    }

    async fn receipts_for_messages(&self, ids: &[i64]) -> AppResult<Vec<DeliveryReceipt>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, ReceiptRecord>(
            "SELECT message_id, user_id, status, updated_at FROM message_receipts \
             WHERE message_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(TryInto::try_into).collect()
    }

    async fn toggle_reaction(
        &self,
        message_id: i64,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query_scalar::<_, i64>(
            "DELETE FROM message_reactions \
             WHERE message_id = $1 AND user_id = $2 AND emoji = $3 RETURNING message_id",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .fetch_optional(&mut *tx)
        .await?;

        if removed.is_some() {
            tx.commit().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO message_reactions (message_id, user_id, emoji, created_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (message_id, user_id) DO UPDATE \
                 SET emoji = EXCLUDED.emoji, created_at = EXCLUDED.created_at",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn reactions_for_messages(&self, ids: &[i64]) -> AppResult<Vec<Reaction>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, ReactionRecord>(
            "SELECT message_id, user_id, emoji, created_at FROM message_reactions \
             WHERE message_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(records
            .into_iter()
            .map(|r| Reaction {
                message_id: r.message_id,
                user_id: r.user_id,
                emoji: r.emoji,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn pin_message(
        &self,
        conversation_id: Uuid,
        message_id: i64,
        pinned_by: Uuid,
    ) -> AppResult<PinnedMessage> {
        // The no-op update lets RETURNING yield the existing pin.
        let record = sqlx::query_as::<_, PinnedMessageRecord>(
            "INSERT INTO pinned_messages (conversation_id, message_id, pinned_by) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (conversation_id, message_id) DO UPDATE \
                 SET pinned_by = pinned_messages.pinned_by \
             RETURNING conversation_id, message_id, pinned_by, pinned_at",
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(pinned_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(record.into())
    }

    async fn unpin_message(&self, conversation_id: Uuid, message_id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM pinned_messages WHERE conversation_id = $1 AND message_id = $2",
        )
        .bind(conversation_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn pinned_messages(&self, conversation_id: Uuid) -> AppResult<Vec<PinnedMessage>> {
        let records = sqlx::query_as::<_, PinnedMessageRecord>(
            "SELECT conversation_id, message_id, pinned_by, pinned_at FROM pinned_messages \
             WHERE conversation_id = $1 ORDER BY pinned_at DESC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}
