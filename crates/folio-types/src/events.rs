use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message, Review};

/// Notifications pushed to subscribers whenever a store writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// A new conversation record was created (not emitted on dedup hits)
    ConversationStarted {
        conversation_id: String,
        participants: [String; 2],
    },

    /// A message was appended. `participants` is empty when the message
    /// points at a conversation that does not exist.
    MessageCreated {
        id: String,
        conversation_id: String,
        participants: Vec<String>,
        sender_id: String,
        sender_name: String,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A review was appended
    ReviewAdded {
        id: String,
        provider_id: String,
        reviewer_id: String,
        rating: i32,
    },
}

impl FeedEvent {
    /// Event for `msg`, addressed to the participants of `conversation`.
    pub fn message_created(msg: &Message, conversation: Option<&Conversation>) -> Self {
        Self::MessageCreated {
            id: msg.id.clone(),
            conversation_id: msg.conversation_id.clone(),
            participants: conversation
                .map(|c| c.participants.to_vec())
                .unwrap_or_default(),
            sender_id: msg.sender_id.clone(),
            sender_name: msg.sender_name.clone(),
            text: msg.text.clone(),
            timestamp: msg.timestamp,
        }
    }

    /// Whether `user_id` should be notified about this event.
    pub fn concerns(&self, user_id: &str) -> bool {
        match self {
            Self::ConversationStarted { participants, .. } => {
                participants.iter().any(|p| p == user_id)
            }
            // Senders don't need to hear about their own messages
            Self::MessageCreated { participants, sender_id, .. } => {
                sender_id != user_id && participants.iter().any(|p| p == user_id)
            }
            Self::ReviewAdded { provider_id, .. } => provider_id == user_id,
        }
    }
}

impl From<&Conversation> for FeedEvent {
    fn from(conv: &Conversation) -> Self {
        Self::ConversationStarted {
            conversation_id: conv.id.clone(),
            participants: conv.participants.clone(),
        }
    }
}

impl From<&Review> for FeedEvent {
    fn from(review: &Review) -> Self {
        Self::ReviewAdded {
            id: review.id.clone(),
            provider_id: review.provider_id.clone(),
            reviewer_id: review.reviewer_id.clone(),
            rating: review.rating,
        }
    }
}
