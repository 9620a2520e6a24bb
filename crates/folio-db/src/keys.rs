//! Fixed storage keys, one per persisted collection.

/// Profile of the signed-in user, or absent.
pub const CURRENT_SESSION: &str = "current-session";
pub const CREDENTIALS: &str = "credential-list";
pub const PROFILES: &str = "profile-list";
pub const CONVERSATIONS: &str = "conversation-list";
pub const MESSAGES: &str = "message-list";
pub const REVIEWS: &str = "review-list";

/// Owned by the i18n layer; this workspace never writes it.
pub const LOCALE_PREFERENCE: &str = "locale-preference";
