use chalet_core::{Actor, NoopPublisher};
use chalet_support::memory::InMemoryMessageRepository;
use chalet_support::{BroadcastFeed, ChangeFeed, ConversationWatcher, Message, MessageRepository, SupportDesk};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use uuid::Uuid;

/// A feed that never has push available.
struct Offline;

impl ChangeFeed for Offline {
    fn announce(&self, _message: &Message) {}

    fn subscribe(&self) -> Option<broadcast::Receiver<Message>> {
        None
    }
}

async fn next(rx: &mut mpsc::Receiver<Message>) -> Message {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("watcher produced nothing")
        .expect("watcher stopped")
}

#[tokio::test]
async fn watcher_streams_new_messages_from_feed() {
    let desk = SupportDesk::new(
        Arc::new(InMemoryMessageRepository::new()),
        Some(Arc::new(BroadcastFeed::new(32)) as Arc<dyn ChangeFeed>),
        Arc::new(NoopPublisher),
        Duration::from_secs(60),
    );
    let customer = Actor::customer(Uuid::new_v4());
    let team = Actor::admin(Uuid::new_v4());
    let conversation_id = Uuid::new_v4();
    desk.post_message(&customer, conversation_id, "Before watching").await.unwrap();

    let mut rx = desk.watch(&customer, conversation_id).await.unwrap();
    // Other conversations are filtered out.
    desk.post_message(&Actor::customer(Uuid::new_v4()), Uuid::new_v4(), "Unrelated").await.unwrap();
    let reply = desk.post_message(&team, conversation_id, "Welcome!").await.unwrap();

    // The next poll is a minute away, so this can only have come from the feed.
    assert_eq!(next(&mut rx).await.id, reply.id);
}

#[tokio::test]
async fn watcher_polls_when_feed_is_unavailable() {
    let desk = SupportDesk::new(
        Arc::new(InMemoryMessageRepository::new()),
        Some(Arc::new(Offline) as Arc<dyn ChangeFeed>),
        Arc::new(NoopPublisher),
        Duration::from_millis(10),
    );
    let customer = Actor::customer(Uuid::new_v4());
    let conversation_id = Uuid::new_v4();
    desk.post_message(&customer, conversation_id, "Old news").await.unwrap();

    let mut rx = desk.watch(&customer, conversation_id).await.unwrap();
    let first = desk.post_message(&customer, conversation_id, "One").await.unwrap();
    let second = desk.post_message(&customer, conversation_id, "Two").await.unwrap();

    assert_eq!(next(&mut rx).await.id, first.id);
    assert_eq!(next(&mut rx).await.id, second.id);
}

#[tokio::test]
async fn watcher_without_feed_replays_from_given_point() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let desk = SupportDesk::new(repo.clone(), None, Arc::new(NoopPublisher), Duration::from_millis(10));
    let customer = Actor::customer(Uuid::new_v4());
    let conversation_id = Uuid::new_v4();

    let first = desk.post_message(&customer, conversation_id, "first").await.unwrap();
    let second = desk.post_message(&customer, conversation_id, "second").await.unwrap();

    let mut rx = ConversationWatcher::new(conversation_id, repo.clone(), None, Duration::from_millis(10))
        .starting_after(Some(first.created_at))
        .spawn(8);
    assert_eq!(next(&mut rx).await.id, second.id);
    assert_eq!(repo.conversation(conversation_id).await.unwrap().len(), 2);
}
