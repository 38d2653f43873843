pub mod conversation;
pub mod member;
pub mod message;
pub mod reaction;
pub mod receipt;
pub mod user;

pub use conversation::{direct_key, Conversation, ConversationSummary, UserConversation};
pub use member::{LeaveOutcome, MemberRole, Participant, ParticipantView};
pub use message::{
    Attachment, AttachmentKind, Message, MessagePage, MessageView, NewMessage, PageDirection,
    PageInfo, PageRequest, PinnedMessage, ReplyPreview,
};
pub use reaction::{Reaction, ReactionGroup, ReactionSummary, ReactionToggle};
pub use receipt::{DeliveryReceipt, DeliveryStatus, DeliverySummary};
pub use user::UserSummary;
