use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use folio_types::events::FeedEvent;

const CHANNEL_CAPACITY: usize = 1024;

/// Fans store writes out to every subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every subscriber receives every event; filtering happens in `Subscription`
    broadcast_tx: broadcast::Sender<FeedEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Publish an event. Dropped silently when nobody is listening.
    pub fn publish(&self, event: FeedEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Raw receiver for every event.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Receiver that only yields events `user_id` should be notified about.
    pub fn subscribe_user(&self, user_id: impl Into<String>) -> Subscription {
        Subscription {
            user_id: user_id.into(),
            rx: self.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

/// Per-user view of the feed.
pub struct Subscription {
    user_id: String,
    rx: broadcast::Receiver<FeedEvent>,
}

impl Subscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Next relevant event, or `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.concerns(&self.user_id) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!("Feed subscriber {} lagged by {} events", self.user_id, n);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(sender: &str) -> FeedEvent {
        message_in(["alice", "bob"], sender)
    }

    fn message_in(participants: [&str; 2], sender: &str) -> FeedEvent {
        FeedEvent::MessageCreated {
            id: "m".into(),
            conversation_id: participants.join("-"),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            sender_id: sender.into(),
            sender_name: sender.into(),
            text: "hi".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscription_skips_own_messages() {
        let dispatcher = Dispatcher::new();
        let mut bob = dispatcher.subscribe_user("bob");

        dispatcher.publish(message("bob"));
        dispatcher.publish(message("alice"));

        match bob.recv().await {
            Some(FeedEvent::MessageCreated { sender_id, .. }) => assert_eq!(sender_id, "alice"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn subscription_skips_other_peoples_threads() {
        let dispatcher = Dispatcher::new();
        let mut bob = dispatcher.subscribe_user("bob");

        dispatcher.publish(message_in(["alice", "carol"], "alice"));
        dispatcher.publish(message_in(["alice", "bob"], "alice"));

        match bob.recv().await {
            Some(FeedEvent::MessageCreated { conversation_id, .. }) => {
                assert_eq!(conversation_id, "alice-bob")
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn closed_dispatcher_ends_subscription() {
        let dispatcher = Dispatcher::new();
        let mut sub = dispatcher.subscribe_user("u");
        drop(dispatcher);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.subscriber_count(), 0);
        dispatcher.publish(message("a"));
    }
}
