use crate::models::Message;
use tokio::sync::broadcast;

/// Optional realtime push of newly posted messages.
///
/// `subscribe` returning `None` means no push is available right now and
/// watchers poll storage instead.
pub trait ChangeFeed: Send + Sync {
    fn announce(&self, message: &Message);
    fn subscribe(&self) -> Option<broadcast::Receiver<Message>>;
}

/// In-process feed over a broadcast channel.
#[derive(Clone)]
pub struct BroadcastFeed {
    tx: broadcast::Sender<Message>,
}

impl BroadcastFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl ChangeFeed for BroadcastFeed {
    fn announce(&self, message: &Message) {
        // No receivers is fine.
        let _ = self.tx.send(message.clone());
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<Message>> {
        Some(self.tx.subscribe())
    }
}
