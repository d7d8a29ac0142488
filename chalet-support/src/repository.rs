use crate::models::{Message, SenderRole};
use async_trait::async_trait;
use chalet_core::RepoResult;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Stores `message`, moving its timestamp one microsecond past the
    /// conversation's latest when it would not sort last. Returns the
    /// timestamp actually stored.
    async fn append(&self, message: &Message) -> RepoResult<DateTime<Utc>>;
    async fn get(&self, id: Uuid) -> RepoResult<Option<Message>>;
    /// Messages of one conversation, oldest first.
    async fn conversation(&self, conversation_id: Uuid) -> RepoResult<Vec<Message>>;
    /// Messages newer than `after`, oldest first.
    async fn since(&self, conversation_id: Uuid, after: Option<DateTime<Utc>>) -> RepoResult<Vec<Message>>;
    async fn latest_timestamp(&self, conversation_id: Uuid) -> RepoResult<Option<DateTime<Utc>>>;
    /// Customer owning the conversation, if it has any message.
    async fn conversation_owner(&self, conversation_id: Uuid) -> RepoResult<Option<Uuid>>;
    async fn list_all(&self) -> RepoResult<Vec<Message>>;
    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Message>>;
    async fn mark_read(&self, id: Uuid) -> RepoResult<Message>;
    /// Flags every unread message written by `sender`; returns how many.
    async fn mark_conversation_read(&self, conversation_id: Uuid, sender: SenderRole) -> RepoResult<u64>;
}
