use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown wherever a participant or profile lookup comes back empty.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Provider,
    Seeker,
}

/// Login record. Only used for credential lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub email: String,
    pub password: String,
    /// Stable link to the owning profile. Older blobs lack it and are joined
    /// by email instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub user_type: UserType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_provider(&self) -> bool {
        self.user_type == UserType::Provider
    }
}

/// A two-party message thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub participant_names: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// True when the participant pair is exactly {`a`, `b`}, in either order.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        let [p0, p1] = &self.participants;
        (p0 == a && p1 == b) || (p0 == b && p1 == a)
    }

    /// Display name of whoever is not `me`.
    pub fn other_participant_name(&self, me: &str) -> &str {
        self.participants
            .iter()
            .find(|p| p.as_str() != me)
            .and_then(|other| self.participant_names.get(other))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// Informational only. Thread order is insertion order.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub provider_id: String,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub rating: i32,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
