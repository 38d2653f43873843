use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageView, ParticipantView};

/// Maximum byte length of a group name.
pub const MAX_GROUP_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_by: Uuid,
    pub last_message_id: Option<i64>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A conversation as seen by one of its participants.
#[derive(Debug, Clone)]
pub struct UserConversation {
    pub conversation: Conversation,
    pub pinned_at: Option<DateTime<Utc>>,
}

/// List-view row: conversation, participants and its last visible message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ParticipantView>,
    pub last_message: Option<MessageView>,
    pub pinned: bool,
}

/// Order-independent key identifying the direct conversation between two users.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_key_is_symmetric() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(direct_key(a, b), direct_key(b, a));
        assert_ne!(direct_key(a, b), direct_key(a, Uuid::new_v4()));
    }
}
