mod cleanup;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use folio_api::{Config, Folio};
use folio_db::{Database, KvStore};
use folio_gateway::{ChangeWatcher, Dispatcher};
use folio_types::events::FeedEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "folio_server=debug,folio_api=debug,folio_gateway=debug,folio_db=info".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init storage
    let db = Arc::new(Database::open(&config.db_path)?);
    let store: Arc<dyn KvStore> = db.clone();

    let dispatcher = Dispatcher::new();
    let folio = Folio::open(store, config.record_ttl, dispatcher.clone())?;

    // Expired entries only exist when records carry a TTL
    let cleanup = config
        .record_ttl
        .map(|_| tokio::spawn(cleanup::run_cleanup_loop(db.clone(), config.cleanup_interval)));

    let _watcher = ChangeWatcher::spawn(
        folio.chat.message_collection(),
        folio.chat.conversation_collection(),
        dispatcher.clone(),
        config.poll_interval,
    )?;

    let watching = match folio.identity.current_user() {
        Some(user) => {
            info!("Watching activity for {} ({})", user.name, user.id);
            Some(user.id.clone())
        }
        None => {
            info!("No signed-in user, watching all activity");
            None
        }
    };
    let mut feed = dispatcher.subscribe();

    loop {
        tokio::select! {
            event = feed.recv() => match event {
                Ok(event) => {
                    if watching.as_deref().is_none_or(|id| event.concerns(id)) {
                        notify(&folio, &event);
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Feed lagged by {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    if let Some(task) = cleanup {
        task.abort();
    }
    Ok(())
}

fn notify(folio: &Folio, event: &FeedEvent) {
    match event {
        FeedEvent::MessageCreated { sender_name, text, conversation_id, .. } => {
            info!("New message from {} in {}: {}", sender_name, conversation_id, text);
        }
        FeedEvent::ConversationStarted { conversation_id, .. } => {
            info!("New conversation {}", conversation_id);
        }
        FeedEvent::ReviewAdded { provider_id, rating, .. } => {
            let average = folio.reviews.provider_rating(provider_id).unwrap_or_default();
            info!("New {}/5 review for {} (average {:.1})", rating, provider_id, average);
        }
    }
}
