use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use folio_db::{Collection, KvStore, keys};
use folio_gateway::Dispatcher;
use folio_types::events::FeedEvent;
use folio_types::models::{Conversation, Message, Profile};
use folio_types::new_id;

use crate::error::{FolioError, FolioResult};

/// Conversations and their messages.
///
/// Storage is the source of truth. The `current` thread and the user's
/// conversation list are views of the last load; call `refresh` to pick up
/// writes made elsewhere.
pub struct ChatStore {
    conversations: Collection<Conversation>,
    messages: Collection<Message>,
    dispatcher: Option<Dispatcher>,
    current: Option<Conversation>,
    thread: Vec<Message>,
    inbox_owner: Option<String>,
    inbox: Vec<Conversation>,
}

impl ChatStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Option<Duration>, dispatcher: Option<Dispatcher>) -> Self {
        Self {
            conversations: Collection::new(store.clone(), keys::CONVERSATIONS, ttl),
            messages: Collection::new(store, keys::MESSAGES, ttl),
            dispatcher,
            current: None,
            thread: Vec::new(),
            inbox_owner: None,
            inbox: Vec::new(),
        }
    }

    /// Returns the id of the conversation between the two users, creating it
    /// if none exists. Argument order does not matter. A conversation always
    /// has two distinct participants.
    pub fn start_conversation(
        &self,
        id_a: &str,
        name_a: &str,
        id_b: &str,
        name_b: &str,
    ) -> FolioResult<String> {
        if id_a == id_b {
            return Err(FolioError::CannotContactSelf);
        }

        let candidate = Conversation {
            id: new_id(),
            participants: [id_a.to_string(), id_b.to_string()],
            participant_names: HashMap::from([
                (id_a.to_string(), name_a.to_string()),
                (id_b.to_string(), name_b.to_string()),
            ]),
            last_message: None,
            last_message_time: None,
            created_at: Utc::now(),
        };

        let existing = self.conversations.update(|all| {
            if let Some(found) = all.iter().find(|c| c.is_between(id_a, id_b)) {
                return Some(found.id.clone());
            }
            all.push(candidate.clone());
            None
        })?;

        if let Some(id) = existing {
            return Ok(id);
        }

        info!("Conversation {} started between {} and {}", candidate.id, id_a, id_b);
        self.publish(FeedEvent::from(&candidate));
        Ok(candidate.id)
    }

    /// Apply the contact rules, then open (or reuse) the conversation.
    pub fn contact(&self, initiator: &Profile, target: &Profile) -> FolioResult<String> {
        if initiator.is_provider() && target.is_provider() {
            return Err(FolioError::ProvidersContactSeekersOnly);
        }
        if initiator.id == target.id {
            return Err(FolioError::CannotContactSelf);
        }
        self.start_conversation(&initiator.id, &initiator.name, &target.id, &target.name)
    }

    /// Append a message. The conversation's summary is updated when the
    /// conversation exists; otherwise the message is kept without one.
    /// Text is stored as given.
    pub fn send_message(
        &mut self,
        conversation_id: &str,
        sender_id: &str,
        sender_name: &str,
        text: &str,
    ) -> FolioResult<Message> {
        let message = Message {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };

        self.messages.push(message.clone())?;

        let summary = self.conversations.update(|all| {
            let conv = all.iter_mut().find(|c| c.id == conversation_id)?;
            conv.last_message = Some(message.text.clone());
            conv.last_message_time = Some(message.timestamp);
            Some(conv.clone())
        })?;

        match &summary {
            Some(conv) => {
                if let Some(cached) = self.inbox.iter_mut().find(|c| c.id == conv.id) {
                    *cached = conv.clone();
                }
                if self.current.as_ref().is_some_and(|c| c.id == conv.id) {
                    self.current = Some(conv.clone());
                }
            }
            None => debug!("Message {} stored for unknown conversation {}", message.id, conversation_id),
        }

        if self.current.as_ref().is_some_and(|c| c.id == conversation_id) {
            self.thread.push(message.clone());
        }

        self.publish(FeedEvent::message_created(&message, summary.as_ref()));
        Ok(message)
    }

    /// Make `conversation_id` the current thread and load its messages in
    /// insertion order. Returns `None` if the conversation does not exist.
    pub fn load_conversation(&mut self, conversation_id: &str) -> FolioResult<Option<Conversation>> {
        let conversation = self
            .conversations
            .load()?
            .into_iter()
            .find(|c| c.id == conversation_id);

        self.thread = self
            .messages
            .load()?
            .into_iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        self.current = conversation.clone();

        Ok(conversation)
    }

    /// Conversations `user_id` takes part in.
    pub fn load_user_conversations(&mut self, user_id: &str) -> FolioResult<Vec<Conversation>> {
        self.inbox = self
            .conversations
            .load()?
            .into_iter()
            .filter(|c| c.has_participant(user_id))
            .collect();
        self.inbox_owner = Some(user_id.to_string());
        Ok(self.inbox.clone())
    }

    /// Re-read the current thread and inbox from storage.
    pub fn refresh(&mut self) -> FolioResult<()> {
        if let Some(id) = self.current.as_ref().map(|c| c.id.clone()) {
            self.load_conversation(&id)?;
        }
        if let Some(owner) = self.inbox_owner.clone() {
            self.load_user_conversations(&owner)?;
        }
        Ok(())
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current.as_ref()
    }

    /// Messages of the current thread.
    pub fn messages(&self) -> &[Message] {
        &self.thread
    }

    /// Conversations from the last `load_user_conversations`.
    pub fn conversations(&self) -> &[Conversation] {
        &self.inbox
    }

    /// The underlying message list, for watchers.
    pub fn message_collection(&self) -> Collection<Message> {
        self.messages.clone()
    }

    pub fn conversation_collection(&self) -> Collection<Conversation> {
        self.conversations.clone()
    }

    fn publish(&self, event: FeedEvent) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_db::MemoryKv;
    use folio_types::models::{UNKNOWN_NAME, UserType};

    fn store(kv: &Arc<MemoryKv>) -> ChatStore {
        ChatStore::new(kv.clone(), None, None)
    }

    fn profile(id: &str, user_type: UserType) -> Profile {
        Profile {
            id: id.into(),
            name: id.to_uppercase(),
            email: format!("{}@example.com", id),
            user_type,
            specialty: None,
            bio: None,
            avatar: None,
            skills: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn start_is_idempotent_in_either_order() {
        let kv = Arc::new(MemoryKv::new());
        let chat = store(&kv);

        let first = chat.start_conversation("a", "Alice", "b", "Bob").unwrap();
        let again = chat.start_conversation("b", "Bob", "a", "Alice").unwrap();
        assert_eq!(first, again);

        let other = chat.start_conversation("a", "Alice", "c", "Cy").unwrap();
        assert_ne!(first, other);

        let all: Vec<Conversation> =
            serde_json::from_str(&kv.get(keys::CONVERSATIONS).unwrap().unwrap()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn conversation_with_yourself_is_rejected() {
        let kv = Arc::new(MemoryKv::new());
        let chat = store(&kv);

        assert!(matches!(
            chat.start_conversation("a", "Alice", "a", "Alice"),
            Err(FolioError::CannotContactSelf)
        ));
        assert!(kv.get(keys::CONVERSATIONS).unwrap().is_none());
    }

    #[test]
    fn send_updates_summary_and_current_thread() {
        let kv = Arc::new(MemoryKv::new());
        let mut chat = store(&kv);
        let conv = chat.start_conversation("a", "Alice", "b", "Bob").unwrap();
        chat.load_conversation(&conv).unwrap();
        chat.load_user_conversations("a").unwrap();

        let sent = chat.send_message(&conv, "a", "Alice", "hello").unwrap();

        assert_eq!(chat.messages(), &[sent.clone()]);
        let current = chat.current_conversation().unwrap();
        assert_eq!(current.last_message.as_deref(), Some("hello"));
        assert_eq!(current.last_message_time, Some(sent.timestamp));
        assert_eq!(chat.conversations()[0].last_message.as_deref(), Some("hello"));
    }

    #[test]
    fn orphan_messages_are_stored() {
        let kv = Arc::new(MemoryKv::new());
        let mut chat = store(&kv);

        chat.send_message("nowhere", "a", "Alice", "").unwrap();

        assert!(kv.get(keys::CONVERSATIONS).unwrap().is_none());
        assert!(chat.load_conversation("nowhere").unwrap().is_none());
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn thread_keeps_insertion_order() {
        let kv = Arc::new(MemoryKv::new());
        let mut chat = store(&kv);
        let conv = chat.start_conversation("a", "Alice", "b", "Bob").unwrap();
        let other = chat.start_conversation("a", "Alice", "c", "Cy").unwrap();

        for text in ["one", "two", "three"] {
            chat.send_message(&conv, "a", "Alice", text).unwrap();
            chat.send_message(&other, "c", "Cy", "noise").unwrap();
        }

        chat.load_conversation(&conv).unwrap();
        let texts: Vec<&str> = chat.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn refresh_sees_other_instances() {
        let kv = Arc::new(MemoryKv::new());
        let mut mine = store(&kv);
        let mut theirs = store(&kv);

        let conv = mine.start_conversation("a", "Alice", "b", "Bob").unwrap();
        mine.load_conversation(&conv).unwrap();
        theirs.send_message(&conv, "b", "Bob", "hi from the other tab").unwrap();

        assert!(mine.messages().is_empty());
        mine.refresh().unwrap();
        assert_eq!(mine.messages().len(), 1);
        assert_eq!(
            mine.current_conversation().unwrap().last_message.as_deref(),
            Some("hi from the other tab")
        );
    }

    #[test]
    fn user_conversations_filter_by_participant() {
        let kv = Arc::new(MemoryKv::new());
        let mut chat = store(&kv);
        chat.start_conversation("a", "Alice", "b", "Bob").unwrap();
        chat.start_conversation("b", "Bob", "c", "Cy").unwrap();

        assert_eq!(chat.load_user_conversations("b").unwrap().len(), 2);
        let for_a = chat.load_user_conversations("a").unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].other_participant_name("a"), "Bob");
        assert!(chat.load_user_conversations("z").unwrap().is_empty());
    }

    #[test]
    fn dangling_participant_reads_unknown() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(
            keys::CONVERSATIONS,
            r#"[{"id":"c","participants":["a","gone"],"participantNames":{"a":"Alice"},"createdAt":"2024-04-01T10:00:00Z"}]"#,
            None,
        )
        .unwrap();

        let mut chat = store(&kv);
        let conv = chat.load_conversation("c").unwrap().unwrap();
        assert_eq!(conv.other_participant_name("a"), UNKNOWN_NAME);
    }

    #[test]
    fn contact_rules() {
        let kv = Arc::new(MemoryKv::new());
        let chat = store(&kv);
        let p1 = profile("p1", UserType::Provider);
        let p2 = profile("p2", UserType::Provider);
        let s1 = profile("s1", UserType::Seeker);

        assert!(matches!(
            chat.contact(&p1, &p2),
            Err(FolioError::ProvidersContactSeekersOnly)
        ));
        // The provider rule is checked first, even against yourself
        assert!(matches!(
            chat.contact(&p1, &p1),
            Err(FolioError::ProvidersContactSeekersOnly)
        ));
        assert!(matches!(chat.contact(&s1, &s1), Err(FolioError::CannotContactSelf)));

        let a = chat.contact(&s1, &p1).unwrap();
        let b = chat.contact(&p1, &s1).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn writes_are_published() {
        let kv = Arc::new(MemoryKv::new());
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let mut chat = ChatStore::new(kv.clone(), None, Some(dispatcher));

        let conv = chat.start_conversation("a", "Alice", "b", "Bob").unwrap();
        chat.start_conversation("b", "Bob", "a", "Alice").unwrap();
        chat.send_message(&conv, "a", "Alice", "ping").unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            FeedEvent::ConversationStarted { conversation_id, .. } if conversation_id == conv
        ));
        // The dedup hit publishes nothing, so the next event is the message
        assert!(matches!(
            rx.recv().await.unwrap(),
            FeedEvent::MessageCreated { text, participants, .. }
                if text == "ping" && participants == ["a", "b"]
        ));
    }
}
