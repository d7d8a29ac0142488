use crate::models::{Message, SenderRole};
use crate::repository::MessageRepository;
use async_trait::async_trait;
use chalet_core::{RepoError, RepoResult};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only message log kept in insertion order.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn oldest_first(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    messages
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: &Message) -> RepoResult<DateTime<Utc>> {
        let mut messages = self.messages.write().await;
        let latest = messages
            .iter()
            .filter(|m| m.conversation_id == message.conversation_id)
            .map(|m| m.created_at)
            .max();
        let mut stored = message.clone();
        if let Some(latest) = latest.filter(|latest| stored.created_at <= *latest) {
            stored.created_at = latest + Duration::microseconds(1);
        }
        let created_at = stored.created_at;
        messages.push(stored);
        Ok(created_at)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Message>> {
        Ok(self.messages.read().await.iter().find(|m| m.id == id).cloned())
    }

    async fn conversation(&self, conversation_id: Uuid) -> RepoResult<Vec<Message>> {
        self.since(conversation_id, None).await
    }

    async fn since(&self, conversation_id: Uuid, after: Option<DateTime<Utc>>) -> RepoResult<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(oldest_first(
            messages
                .iter()
                .filter(|m| m.conversation_id == conversation_id && after.map_or(true, |t| m.created_at > t))
                .cloned()
                .collect(),
        ))
    }

    async fn latest_timestamp(&self, conversation_id: Uuid) -> RepoResult<Option<DateTime<Utc>>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.created_at)
            .max())
    }

    async fn conversation_owner(&self, conversation_id: Uuid) -> RepoResult<Option<Uuid>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .find(|m| m.conversation_id == conversation_id)
            .map(|m| m.customer_id))
    }

    async fn list_all(&self) -> RepoResult<Vec<Message>> {
        Ok(self.messages.read().await.clone())
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|m| m.customer_id == customer_id).cloned().collect())
    }

    async fn mark_read(&self, id: Uuid) -> RepoResult<Message> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| RepoError::NotFound(format!("message {}", id)))?;
        message.is_read = true;
        Ok(message.clone())
    }

    async fn mark_conversation_read(&self, conversation_id: Uuid, sender: SenderRole) -> RepoResult<u64> {
        let mut messages = self.messages.write().await;
        let mut flagged = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender == sender && !m.is_read)
        {
            message.is_read = true;
            flagged += 1;
        }
        Ok(flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;

    fn message(conversation_id: Uuid, created_at: DateTime<Utc>) -> Message {
        let customer_id = Uuid::new_v4();
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            customer_id,
            sender_id: customer_id,
            sender: SenderRole::Customer,
            body: "hi".to_string(),
            is_read: false,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_append_keeps_conversation_timestamps_increasing() {
        let repo = InMemoryMessageRepository::new();
        let conversation_id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(6);

        assert_eq!(repo.append(&message(conversation_id, now)).await.unwrap(), now);
        let stale = repo.append(&message(conversation_id, now - Duration::seconds(5))).await.unwrap();
        assert_eq!(stale, now + Duration::microseconds(1));

        // Other conversations are not affected.
        let elsewhere = now - Duration::seconds(5);
        assert_eq!(repo.append(&message(Uuid::new_v4(), elsewhere)).await.unwrap(), elsewhere);

        let thread = repo.conversation(conversation_id).await.unwrap();
        assert!(thread[0].created_at < thread[1].created_at);
        assert_eq!(repo.latest_timestamp(conversation_id).await.unwrap(), Some(stale));
    }
}
