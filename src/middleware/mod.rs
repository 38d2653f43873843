pub mod auth;
pub mod error_handling;
pub mod guards;

pub use auth::{bearer_token, Claims, JwtVerifier};
pub use guards::{ConversationMember, User};
