//! Authorization guards that enforce permission checks at the type level

use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::bearer_token;
use crate::models::MemberRole;
use crate::repository::ChatRepository;
use crate::state::AppState;
use actix_web::{http::header, web, FromRequest, HttpRequest};

/// Represents an authenticated user extracted from the bearer token
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl User {
    fn authenticate(req: &HttpRequest) -> Result<Self, AppError> {
        let state = req
            .app_data::<web::Data<AppState>>()
            .ok_or(AppError::Internal)?;
        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        let token = bearer_token(header).ok_or(AppError::MissingToken)?;
        let id = state.jwt.verify(token)?;
        Ok(User { id })
    }
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(Self::authenticate(req))
    }
}

/// Represents a verified conversation participant with its permission context
#[derive(Debug, Clone)]
pub struct ConversationMember {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub role: MemberRole,
    pub is_group: bool,
}

impl ConversationMember {
    /// `NotFound` when the conversation does not exist, `NotParticipant` when the
    /// user is not in it.
    pub async fn verify(
        repo: &dyn ChatRepository,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        let conversation = repo
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::ConversationNotFound)?;
        let participant = repo
            .get_participant(conversation_id, user_id)
            .await?
            .ok_or(AppError::NotParticipant)?;

        Ok(ConversationMember {
            user_id,
            conversation_id,
            role: participant.role,
            is_group: conversation.is_group,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_privileged()
    }

    pub fn require_group(&self) -> Result<(), AppError> {
        if !self.is_group {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if !self.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    /// Check if this member can manage another member's role
    pub fn can_manage_role(&self, target_role: MemberRole) -> bool {
        self.role.can_manage(target_role)
    }
}
