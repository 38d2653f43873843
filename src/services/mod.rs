pub mod conversation_service;
pub mod delivery_service;
pub mod hydration;
pub mod message_service;
pub mod reaction_service;
pub mod user_directory;

pub use conversation_service::{ConversationService, CreateGroupRequest};
pub use delivery_service::{DeliveryService, ReceiptBatch};
pub use hydration::MessageHydrator;
pub use message_service::{MessageService, MessageTarget, PinnedMessageView, SendMessageRequest};
pub use reaction_service::ReactionService;
pub use user_directory::{InMemoryUserDirectory, PgUserDirectory, UserDirectory};
