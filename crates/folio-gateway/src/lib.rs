//! Live side of Folio: the event feed that replaces storage polling, the
//! watcher that bridges writes from other processes into it, and the
//! simulated call unit.

pub mod call;
pub mod dispatcher;
pub mod watcher;

pub use call::{CallKind, CallSimulator, CallSnapshot, CallState};
pub use dispatcher::{Dispatcher, Subscription};
pub use watcher::ChangeWatcher;
