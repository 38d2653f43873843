use crate::middleware::error_handling;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        error_handling::map_error(self).0
    }

    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self.clone())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing bearer token")]
    MissingToken,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not a participant of this conversation")]
    NotParticipant,

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("message not found")]
    MessageNotFound,

    /// Soft-deleted messages answer like missing ones but keep their own code.
    #[error("message was deleted")]
    MessageDeleted,

    #[error("participant not found")]
    ParticipantNotFound,

    #[error("user is already a participant")]
    ParticipantExists,

    #[error("direct conversation already exists")]
    DirectConversationExists,

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::StartServer(format!("migrations: {e}"))
    }
}

// NOTE: actix-web provides `impl<T: ResponseError + 'static> From<T> for actix_web::Error`,
// so handlers can return `Result<_, AppError>` directly.

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::MissingToken | AppError::Unauthorized => 401,
            AppError::Forbidden | AppError::NotParticipant => 403,
            AppError::ConversationNotFound
            | AppError::MessageNotFound
            | AppError::MessageDeleted
            | AppError::ParticipantNotFound => 404,
            AppError::ParticipantExists | AppError::DirectConversationExists => 409,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized.status_code(), 401);
        assert_eq!(AppError::NotParticipant.status_code(), 403);
        assert_eq!(AppError::MessageDeleted.status_code(), 404);
        assert_eq!(AppError::DirectConversationExists.status_code(), 409);
        assert_eq!(AppError::Database("boom".into()).status_code(), 500);
    }
}
