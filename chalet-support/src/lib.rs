pub mod desk;
pub mod feed;
pub mod grouping;
pub mod memory;
pub mod models;
pub mod repository;
pub mod watcher;

pub use desk::{SupportDesk, SupportError, MAX_BODY_CHARS};
pub use feed::{BroadcastFeed, ChangeFeed};
pub use grouping::group_conversations;
pub use models::{ConversationSummary, Message, SenderRole};
pub use repository::MessageRepository;
pub use watcher::ConversationWatcher;
