use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public profile fields attached to senders and participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl UserSummary {
    /// Stand-in for users the directory no longer knows about.
    pub fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            username: "Unknown user".to_string(),
            avatar_url: None,
        }
    }
}
