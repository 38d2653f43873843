//! Read-only view of the identity service's public profiles.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::UserSummary;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Profiles for the requested ids; unknown ids are simply absent.
    async fn summaries(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserSummary>>;
}

/// Resolves each id, falling back to a placeholder for unknown users.
pub async fn resolve_users(
    directory: &dyn UserDirectory,
    ids: &[Uuid],
) -> AppResult<HashMap<Uuid, UserSummary>> {
    let mut unique: Vec<Uuid> = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let mut found = directory.summaries(&unique).await?;
    for id in unique {
        found
            .entry(id)
            .or_insert_with(|| UserSummary::placeholder(id));
    }
    Ok(found)
}

#[derive(sqlx::FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    avatar_url: Option<String>,
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn summaries(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, avatar_url FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    UserSummary {
                        id: r.id,
                        username: r.username,
                        avatar_url: r.avatar_url,
                    },
                )
            })
            .collect())
    }
}

/// Directory held in process memory; seeded by tests and memory-backed runs.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, UserSummary>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserSummary) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn summaries(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserSummary>> {
        let users = self.users.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).map(|u| (*id, u.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_users_get_placeholder() {
        let directory = InMemoryUserDirectory::new();
        let known = Uuid::new_v4();
        directory
            .insert(UserSummary {
                id: known,
                username: "alice".into(),
                avatar_url: None,
            })
            .await;

        let unknown = Uuid::new_v4();
        let resolved = resolve_users(&directory, &[known, unknown, known])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&known].username, "alice");
        assert_eq!(resolved[&unknown], UserSummary::placeholder(unknown));
    }
}
