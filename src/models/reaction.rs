use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Maximum byte length of a reaction emoji.
pub const MAX_EMOJI_LEN: usize = 32;

/// A user's single active reaction on a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub message_id: i64,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub users: Vec<Uuid>,
}

/// Grouped reaction snapshot for one message, recomputed from rows on every read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub groups: Vec<ReactionGroup>,
    pub my_emoji: Option<String>,
}

impl ReactionSummary {
    /// Groups by emoji, largest group first, ties broken by emoji. Users within a group
    /// are listed in reaction order.
    pub fn from_reactions<'a>(
        reactions: impl IntoIterator<Item = &'a Reaction>,
        viewer: Option<Uuid>,
    ) -> Self {
        let mut sorted: Vec<&Reaction> = reactions.into_iter().collect();
        sorted.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let mut my_emoji = None;
        let mut by_emoji: HashMap<&str, Vec<Uuid>> = HashMap::new();
        for reaction in sorted {
            if Some(reaction.user_id) == viewer {
                my_emoji = Some(reaction.emoji.clone());
            }
            by_emoji
                .entry(reaction.emoji.as_str())
                .or_default()
                .push(reaction.user_id);
        }

        let mut groups: Vec<ReactionGroup> = by_emoji
            .into_iter()
            .map(|(emoji, users)| ReactionGroup {
                emoji: emoji.to_string(),
                count: users.len(),
                users,
            })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emoji.cmp(&b.emoji)));

        Self { groups, my_emoji }
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}

/// Outcome of a reaction toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionToggle {
    pub message_id: i64,
    pub conversation_id: Uuid,
    pub emoji: String,
    pub toggled_on: bool,
    pub summary: ReactionSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reaction(user_id: Uuid, emoji: &str, offset_secs: i64) -> Reaction {
        Reaction {
            message_id: 1,
            user_id,
            emoji: emoji.to_string(),
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_grouping_and_viewer_emoji() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let rows = vec![
            reaction(alice, "👍", 0),
            reaction(bob, "❤️", 1),
            reaction(carol, "👍", 2),
        ];

        let summary = ReactionSummary::from_reactions(&rows, Some(bob));
        assert_eq!(summary.groups.len(), 2);
        assert_eq!(summary.groups[0].emoji, "👍");
        assert_eq!(summary.groups[0].count, 2);
        assert_eq!(summary.groups[0].users, vec![alice, carol]);
        assert_eq!(summary.my_emoji.as_deref(), Some("❤️"));
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ReactionSummary::from_reactions(&Vec::<Reaction>::new(), None);
        assert!(summary.groups.is_empty());
        assert!(summary.my_emoji.is_none());
    }
}
