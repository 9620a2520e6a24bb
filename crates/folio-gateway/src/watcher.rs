use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use folio_db::Collection;
use folio_types::events::FeedEvent;
use folio_types::models::{Conversation, Message};

use crate::dispatcher::Dispatcher;

/// Stand-in for a real event feed: re-reads the message list on an interval
/// and publishes messages appended by other processes sharing the store.
///
/// Messages already announced on the dispatcher (writes made through stores
/// in this process) are not announced twice. The task stops when the watcher
/// is dropped.
pub struct ChangeWatcher {
    task: JoinHandle<()>,
}

impl ChangeWatcher {
    /// Start watching. Messages present at startup are treated as already seen.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        messages: Collection<Message>,
        conversations: Collection<Conversation>,
        dispatcher: Dispatcher,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        // Subscribe before the baseline read so nothing falls in between
        let announced = dispatcher.subscribe();
        let seen: HashSet<String> = messages.load()?.into_iter().map(|m| m.id).collect();

        info!(
            "Change watcher polling '{}' every {:?} ({} existing messages)",
            messages.key(),
            poll_interval,
            seen.len()
        );

        let task = tokio::spawn(poll_loop(
            messages,
            conversations,
            dispatcher,
            announced,
            seen,
            poll_interval,
        ));
        Ok(Self { task })
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    messages: Collection<Message>,
    conversations: Collection<Conversation>,
    dispatcher: Dispatcher,
    mut announced: broadcast::Receiver<FeedEvent>,
    mut seen: HashSet<String>,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let col = messages.clone();
        let convs = conversations.clone();
        let loaded = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            Ok((col.load()?, convs.load()?))
        });
        let (all, threads) = match loaded.await {
            Ok(Ok(lists)) => lists,
            Ok(Err(e)) => {
                warn!("Change watcher read failed: {}", e);
                continue;
            }
            Err(e) => {
                warn!("Change watcher join error: {}", e);
                continue;
            }
        };

        // Anything a local store published up to now is already out
        if !mark_announced(&mut announced, &mut seen) {
            break;
        }

        let mut fresh = 0usize;
        for msg in &all {
            if seen.insert(msg.id.clone()) {
                let conv = threads.iter().find(|c| c.id == msg.conversation_id);
                dispatcher.publish(FeedEvent::message_created(msg, conv));
                fresh += 1;
            }
        }

        if fresh > 0 {
            debug!("Change watcher picked up {} new messages", fresh);
        }
    }
}

/// Drains pending feed events into `seen`. Returns false once the feed is closed.
fn mark_announced(rx: &mut broadcast::Receiver<FeedEvent>, seen: &mut HashSet<String>) -> bool {
    loop {
        match rx.try_recv() {
            Ok(FeedEvent::MessageCreated { id, .. }) => {
                seen.insert(id);
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(n)) => {
                warn!("Change watcher lagged by {} events", n);
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => return false,
        }
    }
}
