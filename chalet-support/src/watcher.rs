use crate::feed::ChangeFeed;
use crate::models::Message;
use crate::repository::MessageRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

/// Streams new messages of one conversation.
///
/// Uses the change feed when one is available and polls storage otherwise,
/// or once the feed closes. Stops when the receiving side is dropped.
pub struct ConversationWatcher {
    conversation_id: Uuid,
    messages: Arc<dyn MessageRepository>,
    feed: Option<Arc<dyn ChangeFeed>>,
    poll_interval: Duration,
    last_seen: Option<DateTime<Utc>>,
}

impl ConversationWatcher {
    pub fn new(
        conversation_id: Uuid,
        messages: Arc<dyn MessageRepository>,
        feed: Option<Arc<dyn ChangeFeed>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            conversation_id,
            messages,
            feed,
            poll_interval,
            last_seen: None,
        }
    }

    /// Skip everything stored at or before `at`.
    pub fn starting_after(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.last_seen = at;
        self
    }

    pub fn spawn(self, buffer: usize) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(self.run(tx));
        rx
    }

    async fn run(mut self, tx: mpsc::Sender<Message>) {
        let conversation_id = self.conversation_id;
        let subscription = self.feed.as_ref().and_then(|feed| feed.subscribe());
        if let Some(mut rx) = subscription {
            debug!(%conversation_id, "watching conversation via change feed");
            // Subscribed first, so nothing posted in between is missed.
            if !self.catch_up(&tx).await {
                return;
            }
            loop {
                tokio::select! {
                    _ = tx.closed() => return,
                    received = rx.recv() => match received {
                        Ok(message) => {
                            if message.conversation_id != conversation_id || !self.is_new(&message) {
                                continue;
                            }
                            self.last_seen = Some(message.created_at);
                            if tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%conversation_id, skipped, "change feed lagged, catching up from storage");
                            if !self.catch_up(&tx).await {
                                return;
                            }
                        }
                        Err(RecvError::Closed) => {
                            warn!(%conversation_id, "change feed closed, falling back to polling");
                            break;
                        }
                    }
                }
            }
        } else {
            debug!(%conversation_id, interval_ms = self.poll_interval.as_millis() as u64, "watching conversation by polling");
        }
        self.poll(tx).await;
    }

    async fn poll(mut self, tx: mpsc::Sender<Message>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tx.closed() => return,
                _ = ticker.tick() => {
                    if !self.catch_up(&tx).await {
                        return;
                    }
                }
            }
        }
    }

    fn is_new(&self, message: &Message) -> bool {
        self.last_seen.map_or(true, |seen| message.created_at > seen)
    }

    /// Forwards stored messages newer than the last one seen. Returns false
    /// once nobody is listening.
    async fn catch_up(&mut self, tx: &mpsc::Sender<Message>) -> bool {
        match self.messages.since(self.conversation_id, self.last_seen).await {
            Ok(batch) => {
                for message in batch {
                    self.last_seen = Some(message.created_at);
                    if tx.send(message).await.is_err() {
                        return false;
                    }
                }
                true
            }
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, error = %e, "message poll failed");
                true
            }
        }
    }
}
