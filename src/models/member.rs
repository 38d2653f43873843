//! Participant roles and membership rows
//!
//! Roles have a natural ordering: Member < Admin < Owner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::UserSummary;

/// Participant role in a conversation with natural hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Regular participant - can send, react, pin
    Member = 0,
    /// Admin - can add participants and remove non-owners
    Admin = 1,
    /// Owner - full control, removed only by leaving or teardown
    Owner = 2,
}

impl MemberRole {
    /// Parse role from database string
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    /// Convert role to database string
    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Check if this role can manage another role
    /// Rule: You can only manage roles strictly below yours
    pub fn can_manage(&self, target: MemberRole) -> bool {
        *self > target
    }

    /// Check if this role can perform admin actions
    pub fn is_privileged(&self) -> bool {
        *self >= MemberRole::Admin
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

/// Parse from string (for API requests)
impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db(s).ok_or_else(|| format!("Invalid role: {}", s))
    }
}

/// Link between a user and a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub online: bool,
    pub joined_at: DateTime<Utc>,
}

/// Participant as rendered to clients, with the user's public profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user: UserSummary,
    pub role: MemberRole,
    pub online: bool,
    pub joined_at: DateTime<Utc>,
}

impl ParticipantView {
    pub fn new(participant: &Participant, user: UserSummary) -> Self {
        Self {
            user,
            role: participant.role,
            online: participant.online,
            joined_at: participant.joined_at,
        }
    }
}

/// Result of removing a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Participant removed; `promoted_owner` is set when ownership was handed off.
    Removed { promoted_owner: Option<Uuid> },
    /// Last participant left and the conversation was torn down.
    ConversationDeleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(MemberRole::Member < MemberRole::Admin);
        assert!(MemberRole::Admin < MemberRole::Owner);
    }

    #[test]
    fn test_can_manage() {
        let owner = MemberRole::Owner;
        let admin = MemberRole::Admin;
        let member = MemberRole::Member;

        assert!(owner.can_manage(admin));
        assert!(owner.can_manage(member));

        assert!(admin.can_manage(member));
        assert!(!admin.can_manage(admin)); // Cannot manage same level
        assert!(!admin.can_manage(owner)); // Cannot manage higher

        assert!(!member.can_manage(member));
    }

    #[test]
    fn test_is_privileged() {
        assert!(!MemberRole::Member.is_privileged());
        assert!(MemberRole::Admin.is_privileged());
        assert!(MemberRole::Owner.is_privileged());
    }

    #[test]
    fn test_db_round_trip() {
        for role in [MemberRole::Member, MemberRole::Admin, MemberRole::Owner] {
            assert_eq!(MemberRole::from_db(role.to_db()), Some(role));
        }
        assert_eq!(MemberRole::from_db("moderator"), None);
        assert!("superuser".parse::<MemberRole>().is_err());
    }
}
