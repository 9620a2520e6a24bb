//! Folio stores: accounts and sessions, conversations, and provider reviews,
//! all persisted through a shared `KvStore`.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod reviews;

use std::sync::Arc;
use std::time::Duration;

use folio_db::KvStore;
use folio_gateway::Dispatcher;

pub use chat::ChatStore;
pub use config::Config;
pub use error::{FolioError, FolioResult};
pub use identity::IdentityStore;
pub use reviews::ReviewStore;

/// Everything a front end needs, wired to one storage backend. Build one per
/// client and pass it to whatever renders; there is no global instance.
pub struct Folio {
    pub identity: IdentityStore,
    pub chat: ChatStore,
    pub reviews: ReviewStore,
    dispatcher: Dispatcher,
}

impl Folio {
    /// Opens all stores and restores the persisted session.
    pub fn open(store: Arc<dyn KvStore>, ttl: Option<Duration>, dispatcher: Dispatcher) -> FolioResult<Self> {
        Ok(Self {
            identity: IdentityStore::open(store.clone(), ttl)?,
            chat: ChatStore::new(store.clone(), ttl, Some(dispatcher.clone())),
            reviews: ReviewStore::new(store, ttl, Some(dispatcher.clone())),
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
