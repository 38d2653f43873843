use serde::{Deserialize, Serialize};

/// Unified JSON error body returned by every REST endpoint and carried inside
/// socket acks with `status: "error"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// Short human readable status text ("Not Found", "Forbidden", ...)
    pub error: String,

    /// Error message safe to show to the user
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Error category for client-side routing:
    /// - "validation_error" - malformed payload
    /// - "authentication_error" - missing or invalid credential
    /// - "authorization_error" - actor lacks membership or role
    /// - "not_found_error" - resource absent or soft-deleted
    /// - "conflict_error" - uniqueness race or duplicate membership
    /// - "server_error" - internal failure
    pub error_type: String,

    /// Stable machine readable code, e.g. "MESSAGE_NOT_FOUND"
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

/// Stable error codes for the messaging domain
pub mod error_codes {
    // Authentication
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";

    // Conversations
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const NOT_CONVERSATION_MEMBER: &str = "NOT_CONVERSATION_MEMBER";
    pub const INSUFFICIENT_ROLE: &str = "INSUFFICIENT_ROLE";
    pub const PARTICIPANT_EXISTS: &str = "PARTICIPANT_EXISTS";
    pub const PARTICIPANT_NOT_FOUND: &str = "PARTICIPANT_NOT_FOUND";
    pub const DIRECT_CONVERSATION_CONFLICT: &str = "DIRECT_CONVERSATION_CONFLICT";

    // Messages
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const MESSAGE_DELETED: &str = "MESSAGE_DELETED";

    // Validation
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Standard error categories
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Not Found",
            "message not found",
            404,
            error_types::NOT_FOUND_ERROR,
            error_codes::MESSAGE_NOT_FOUND,
        );

        assert_eq!(error.status, 404);
        assert_eq!(error.error_type, error_types::NOT_FOUND_ERROR);
        assert_eq!(error.code, error_codes::MESSAGE_NOT_FOUND);
        assert!(error.details.is_none());
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let error = ErrorResponse::new(
            "Forbidden",
            "not a participant",
            403,
            error_types::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        );

        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("details").is_none());

        let with_details = error.with_details("conversation 42".to_string());
        let json = serde_json::to_value(&with_details).unwrap();
        assert_eq!(json["details"], "conversation 42");
    }
}
