use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as categories, ErrorResponse};

/// Stable machine readable code for an error, shared by REST bodies and socket acks.
pub fn error_code(err: &AppError) -> &'static str {
    match err {
        AppError::Validation(_) => error_codes::INVALID_REQUEST,
        AppError::MissingToken => error_codes::TOKEN_MISSING,
        AppError::Unauthorized => error_codes::TOKEN_INVALID,
        AppError::Forbidden => error_codes::INSUFFICIENT_ROLE,
        AppError::NotParticipant => error_codes::NOT_CONVERSATION_MEMBER,
        AppError::ConversationNotFound => error_codes::CONVERSATION_NOT_FOUND,
        AppError::MessageNotFound => error_codes::MESSAGE_NOT_FOUND,
        AppError::MessageDeleted => error_codes::MESSAGE_DELETED,
        AppError::ParticipantNotFound => error_codes::PARTICIPANT_NOT_FOUND,
        AppError::ParticipantExists => error_codes::PARTICIPANT_EXISTS,
        AppError::DirectConversationExists => error_codes::DIRECT_CONVERSATION_CONFLICT,
        AppError::Database(_) => error_codes::DATABASE_ERROR,
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            error_codes::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_category(err: &AppError) -> &'static str {
    match err {
        AppError::Validation(_) => categories::VALIDATION_ERROR,
        AppError::MissingToken | AppError::Unauthorized => categories::AUTHENTICATION_ERROR,
        AppError::Forbidden | AppError::NotParticipant => categories::AUTHORIZATION_ERROR,
        AppError::ConversationNotFound
        | AppError::MessageNotFound
        | AppError::MessageDeleted
        | AppError::ParticipantNotFound => categories::NOT_FOUND_ERROR,
        AppError::ParticipantExists | AppError::DirectConversationExists => {
            categories::CONFLICT_ERROR
        }
        AppError::Config(_)
        | AppError::StartServer(_)
        | AppError::Database(_)
        | AppError::Internal => categories::SERVER_ERROR,
    }
}

/// Map domain errors to HTTP responses
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    // Internal details stay in the logs.
    let message = match status {
        StatusCode::INTERNAL_SERVER_ERROR => {
            tracing::error!(error = %err, "request failed");
            "internal server error".to_string()
        }
        _ => err.to_string(),
    };

    let response = ErrorResponse::new(
        match status {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        },
        &message,
        status.as_u16(),
        error_category(err),
        error_code(err),
    );

    let response = match err {
        AppError::Validation(reason) => response.with_details(reason.clone()),
        _ => response,
    };

    (status, response)
}

pub fn into_response(err: AppError) -> HttpResponse {
    let (status, response) = map_error(&err);
    HttpResponse::build(status).json(response)
}
