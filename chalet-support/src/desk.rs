use crate::feed::ChangeFeed;
use crate::grouping::group_conversations;
use crate::models::{ConversationSummary, Message, SenderRole};
use crate::repository::MessageRepository;
use crate::watcher::ConversationWatcher;
use chalet_core::{Actor, CoreError, EventPublisher, RepoError};
use chalet_shared::models::events::MessagePostedEvent;
use chalet_shared::DomainEvent;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use uuid::Uuid;

pub const MAX_BODY_CHARS: usize = 4000;
const WATCH_BUFFER: usize = 64;

type ConversationClock = Arc<Mutex<Option<DateTime<Utc>>>>;
type ClockMap = StdMutex<HashMap<Uuid, ConversationClock>>;

/// A conversation's clock on loan to one post. The map entry goes away
/// with the last lease, so idle conversations cost nothing.
struct ClockLease<'a> {
    clocks: &'a ClockMap,
    conversation_id: Uuid,
    clock: ConversationClock,
}

impl<'a> ClockLease<'a> {
    fn acquire(clocks: &'a ClockMap, conversation_id: Uuid) -> Self {
        let clock = clocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id)
            .or_default()
            .clone();
        Self {
            clocks,
            conversation_id,
            clock,
        }
    }
}

impl Drop for ClockLease<'_> {
    fn drop(&mut self) {
        let mut clocks = self.clocks.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under this lock: two holders means the map and us.
        if Arc::strong_count(&self.clock) == 2 {
            clocks.remove(&self.conversation_id);
        }
    }
}

/// Customer support messaging.
///
/// Posts to one conversation are serialized so timestamps strictly increase
/// within it; different conversations never wait on each other.
pub struct SupportDesk {
    messages: Arc<dyn MessageRepository>,
    feed: Option<Arc<dyn ChangeFeed>>,
    publisher: Arc<dyn EventPublisher>,
    poll_interval: Duration,
    clocks: ClockMap,
}

impl SupportDesk {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        feed: Option<Arc<dyn ChangeFeed>>,
        publisher: Arc<dyn EventPublisher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            messages,
            feed,
            publisher,
            poll_interval,
            clocks: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn post_message(&self, actor: &Actor, conversation_id: Uuid, body: &str) -> Result<Message, SupportError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(SupportError::EmptyBody);
        }
        let chars = body.chars().count();
        if chars > MAX_BODY_CHARS {
            return Err(SupportError::BodyTooLong(chars));
        }
        let sender = SenderRole::for_actor(actor);

        let lease = ClockLease::acquire(&self.clocks, conversation_id);
        let mut last = lease.clock.lock().await;

        let customer_id = match (self.messages.conversation_owner(conversation_id).await?, sender) {
            (Some(owner), SenderRole::Team) => owner,
            (Some(owner), SenderRole::Customer) if owner == actor.user_id => owner,
            (Some(_), SenderRole::Customer) => return Err(SupportError::not_participant(actor, conversation_id)),
            (None, SenderRole::Customer) => actor.user_id,
            (None, SenderRole::Team) => return Err(SupportError::UnknownConversation(conversation_id)),
        };

        // Other instances write to the same conversation; storage has the last word.
        let previous = (*last).max(self.messages.latest_timestamp(conversation_id).await?);
        let now = Utc::now().trunc_subsecs(6);
        let created_at = match previous {
            Some(previous) if now <= previous => previous + chrono::Duration::microseconds(1),
            _ => now,
        };

        let mut message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            customer_id,
            sender_id: actor.user_id,
            sender,
            body: body.to_string(),
            is_read: false,
            created_at,
        };
        message.created_at = self.messages.append(&message).await?;
        let created_at = message.created_at;
        *last = Some(created_at);
        drop(last);
        drop(lease);

        info!(message_id = %message.id, %conversation_id, sender = sender.as_str(), "message posted");
        if let Some(feed) = &self.feed {
            feed.announce(&message);
        }
        self.publisher.publish(DomainEvent::MessagePosted(MessagePostedEvent {
            message_id: message.id,
            conversation_id,
            customer_id,
            sender: sender.as_str().to_string(),
            created_at,
        }));
        Ok(message)
    }

    /// Full thread, oldest first.
    pub async fn conversation(&self, actor: &Actor, conversation_id: Uuid) -> Result<Vec<Message>, SupportError> {
        self.authorize(actor, conversation_id).await?;
        Ok(self.messages.conversation(conversation_id).await?)
    }

    /// Every conversation, most recently active first. Team only.
    pub async fn inbox(&self, actor: &Actor) -> Result<Vec<ConversationSummary>, SupportError> {
        if !actor.is_support_team() {
            return Err(SupportError::NotAuthorized(format!(
                "user {} is not on the support team",
                actor.user_id
            )));
        }
        Ok(group_conversations(self.messages.list_all().await?))
    }

    pub async fn customer_conversations(&self, actor: &Actor) -> Result<Vec<ConversationSummary>, SupportError> {
        Ok(group_conversations(self.messages.list_for_customer(actor.user_id).await?))
    }

    pub async fn mark_read(&self, actor: &Actor, message_id: Uuid) -> Result<Message, SupportError> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or(SupportError::MessageNotFound(message_id))?;
        if !actor.is_support_team() && message.customer_id != actor.user_id {
            return Err(SupportError::not_participant(actor, message.conversation_id));
        }
        Ok(self.messages.mark_read(message_id).await?)
    }

    /// Flags what the other side wrote as read by `actor`.
    pub async fn mark_conversation_read(&self, actor: &Actor, conversation_id: Uuid) -> Result<u64, SupportError> {
        self.authorize(actor, conversation_id).await?;
        let written_by = SenderRole::for_actor(actor).other();
        Ok(self.messages.mark_conversation_read(conversation_id, written_by).await?)
    }

    /// Messages posted from now on.
    pub async fn watch(&self, actor: &Actor, conversation_id: Uuid) -> Result<mpsc::Receiver<Message>, SupportError> {
        self.authorize(actor, conversation_id).await?;
        let latest = self.messages.latest_timestamp(conversation_id).await?;
        Ok(ConversationWatcher::new(conversation_id, self.messages.clone(), self.feed.clone(), self.poll_interval)
            .starting_after(latest)
            .spawn(WATCH_BUFFER))
    }

    async fn authorize(&self, actor: &Actor, conversation_id: Uuid) -> Result<(), SupportError> {
        if actor.is_support_team() {
            return Ok(());
        }
        match self.messages.conversation_owner(conversation_id).await? {
            Some(owner) if owner != actor.user_id => Err(SupportError::not_participant(actor, conversation_id)),
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    fn tracked_clocks(&self) -> usize {
        self.clocks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupportError {
    #[error("Message body is empty")]
    EmptyBody,

    #[error("Message body has {0} characters, the limit is 4000")]
    BodyTooLong(usize),

    #[error("Conversation {0} does not exist")]
    UnknownConversation(Uuid),

    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    #[error("{0}")]
    NotAuthorized(String),

    #[error(transparent)]
    Backend(#[from] RepoError),
}

impl SupportError {
    fn not_participant(actor: &Actor, conversation_id: Uuid) -> Self {
        SupportError::NotAuthorized(format!(
            "user {} is not part of conversation {}",
            actor.user_id, conversation_id
        ))
    }
}

impl From<SupportError> for CoreError {
    fn from(err: SupportError) -> Self {
        match err {
            SupportError::EmptyBody | SupportError::BodyTooLong(_) => CoreError::Validation(err.to_string()),
            SupportError::UnknownConversation(_) | SupportError::MessageNotFound(_) => {
                CoreError::NotFound(err.to_string())
            }
            SupportError::NotAuthorized(msg) => CoreError::NotAuthorized(msg),
            SupportError::Backend(e) => e.into(),
        }
    }
}
