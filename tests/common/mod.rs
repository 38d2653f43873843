#![allow(dead_code)]

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use realtime_messaging_service::{
    config::{Config, JwtKey},
    middleware::Claims,
    models::{Conversation, UserSummary},
    repository::InMemoryChatRepository,
    services::{CreateGroupRequest, InMemoryUserDirectory},
    state::AppState,
    websocket::ConnectionId,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub struct TestApp {
    pub state: AppState,
    pub users: Arc<InMemoryUserDirectory>,
    pub config: Config,
}

pub fn test_app() -> TestApp {
    let config = Config::test_defaults();
    let users = Arc::new(InMemoryUserDirectory::new());
    let state = AppState::new(
        config.clone(),
        Arc::new(InMemoryChatRepository::new()),
        users.clone(),
    )
    .expect("state");
    TestApp {
        state,
        users,
        config,
    }
}

impl TestApp {
    pub async fn user(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.users
            .insert(UserSummary {
                id,
                username: username.to_string(),
                avatar_url: None,
            })
            .await;
        id
    }

    pub fn token(&self, user_id: Uuid) -> String {
        let JwtKey::Secret(secret) = &self.config.jwt else {
            panic!("tests use an HS256 secret");
        };
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token")
    }

    pub async fn direct(&self, a: Uuid, b: Uuid) -> Conversation {
        self.state
            .conversations
            .create_or_get_direct(a, b)
            .await
            .expect("direct conversation")
    }

    pub async fn group(&self, creator: Uuid, members: &[Uuid]) -> Conversation {
        self.state
            .conversations
            .create_group(
                creator,
                CreateGroupRequest {
                    member_ids: members.to_vec(),
                    name: Some("team".into()),
                },
            )
            .await
            .expect("group")
    }

    pub async fn connect(&self, user_id: Uuid) -> (ConnectionId, UnboundedReceiver<String>) {
        self.state.gateway.connect(user_id).await.expect("connect")
    }
}

/// Frames currently queued for a connection, parsed.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(text) = rx.try_recv() {
        frames.push(serde_json::from_str(&text).expect("json frame"));
    }
    frames
}

pub fn events(frames: &[serde_json::Value]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| f["event"].as_str().map(str::to_string))
        .collect()
}

pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok()
}
