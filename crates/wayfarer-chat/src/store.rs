//! Message store: the append-only transcript and its persistence.
//!
//! The whole list is serialized under a single key after every mutation.
//! A missing or unreadable key on startup means "no history".

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use wayfarer_core::events::{ChatEvent, EventBus};
use wayfarer_core::types::{Message, MessageId};
use wayfarer_storage::KeyValueStore;

use crate::error::ChatError;

/// Key holding the serialized transcript.
pub const HISTORY_KEY: &str = "chat_messages";

/// Ordered, append-only log of chat turns.
pub struct MessageStore {
    messages: Vec<Message>,
    kv: Arc<dyn KeyValueStore>,
    events: EventBus,
}

impl MessageStore {
    /// Create an empty store without reading persisted history.
    pub fn new(kv: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self {
            messages: Vec::new(),
            kv,
            events,
        }
    }

    /// Create a store populated from persisted history.
    pub fn restore(kv: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        let messages = load_history(kv.as_ref());
        info!(count = messages.len(), "Chat history restored");
        Self {
            messages,
            kv,
            events,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    /// Append a message and persist the whole list.
    ///
    /// The message is re-keyed if its id would not be strictly greater than
    /// the last one; when no greater id exists the message is rejected and
    /// nothing changes. Otherwise the in-memory append always happens and a
    /// persistence failure is reported afterwards.
    pub fn append(&mut self, message: Message) -> Result<&Message, ChatError> {
        let message = match self.messages.last() {
            Some(last) if message.id() <= last.id() => {
                let id = last.id().next().ok_or_else(|| {
                    ChatError::Storage(format!("no message id after {}", last.id()))
                })?;
                debug!(requested = %message.id(), assigned = %id, "Message id collision; re-keyed");
                message.with_id(id)
            }
            _ => message,
        };

        let id = message.id();
        let author = message.author();
        self.messages.push(message);
        self.events.emit(ChatEvent::MessageAppended {
            message_id: id,
            author,
            timestamp: Utc::now(),
        });

        let persisted = self.persist();
        let appended = self
            .messages
            .last()
            .ok_or_else(|| ChatError::Storage("message list empty after append".to_string()))?;
        persisted.map(|_| appended)
    }

    /// Empty the transcript and erase its persisted copy.
    pub fn clear(&mut self) -> Result<(), ChatError> {
        let removed = self.messages.len();
        self.messages.clear();
        self.events.emit(ChatEvent::HistoryCleared {
            timestamp: Utc::now(),
        });
        self.kv.remove(HISTORY_KEY)?;
        info!(removed, "Chat history cleared");
        Ok(())
    }

    fn persist(&self) -> Result<(), ChatError> {
        let json = serde_json::to_string(&self.messages)?;
        self.kv.set(HISTORY_KEY, &json)?;
        debug!(count = self.messages.len(), "Chat history persisted");
        Ok(())
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

/// Read and parse persisted history; any failure yields an empty list.
fn load_history(kv: &dyn KeyValueStore) -> Vec<Message> {
    let raw = match kv.get(HISTORY_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read chat history; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Message>>(&raw) {
        Ok(messages) => messages,
        Err(e) => {
            warn!(error = %e, "Stored chat history is corrupt; starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::error::WayfarerError;
    use wayfarer_core::types::{Block, MessageBody, StructuredContent};
    use wayfarer_storage::MemoryKeyValueStore;

    fn memory_store() -> (MemoryKeyValueStore, MessageStore) {
        let kv = MemoryKeyValueStore::new();
        let store = MessageStore::new(Arc::new(kv.clone()), EventBus::default());
        (kv, store)
    }

    /// Accepts reads but rejects every write.
    struct ReadOnlyKv;

    impl KeyValueStore for ReadOnlyKv {
        fn get(&self, _key: &str) -> Result<Option<String>, WayfarerError> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), WayfarerError> {
            Err(WayfarerError::Storage("read-only".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), WayfarerError> {
            Err(WayfarerError::Storage("read-only".into()))
        }
    }

    /// Fails every read.
    struct BrokenKv;

    impl KeyValueStore for BrokenKv {
        fn get(&self, _key: &str) -> Result<Option<String>, WayfarerError> {
            Err(WayfarerError::Storage("disk gone".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), WayfarerError> {
            Ok(())
        }
        fn remove(&self, _key: &str) -> Result<(), WayfarerError> {
            Ok(())
        }
    }

    #[test]
    fn test_append_persists_and_restores_in_order() {
        let (kv, mut store) = memory_store();
        let texts = ["one", "two", "three", "four"];
        for text in texts {
            store.append(Message::user(text)).unwrap();
        }
        assert_eq!(store.len(), 4);

        let restored = MessageStore::restore(Arc::new(kv), EventBus::default());
        let restored_texts: Vec<String> =
            restored.messages().iter().map(|m| m.plain_text()).collect();
        assert_eq!(restored_texts, texts);
        assert_eq!(restored.messages(), store.messages());
    }

    #[test]
    fn test_ids_strictly_increase() {
        let (_kv, mut store) = memory_store();
        let fixed = MessageId(1_000);
        for _ in 0..5 {
            store.append(Message::user("same").with_id(fixed)).unwrap();
        }
        let ids: Vec<u64> = store.messages().iter().map(|m| m.id().0).collect();
        assert_eq!(ids, vec![1_000, 1_001, 1_002, 1_003, 1_004]);
    }

    #[test]
    fn test_restore_missing_key_is_empty() {
        let kv = MemoryKeyValueStore::new();
        let store = MessageStore::restore(Arc::new(kv), EventBus::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_corrupt_json_is_empty() {
        let kv = MemoryKeyValueStore::new();
        kv.set(HISTORY_KEY, "{not valid json").unwrap();
        let store = MessageStore::restore(Arc::new(kv), EventBus::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_read_error_is_empty() {
        let store = MessageStore::restore(Arc::new(BrokenKv), EventBus::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_then_append_continues_ids() {
        let (kv, mut store) = memory_store();
        store
            .append(Message::user("first").with_id(MessageId(u64::MAX - 1)))
            .unwrap();

        let mut restored = MessageStore::restore(Arc::new(kv), EventBus::default());
        let appended = restored.append(Message::user("second")).unwrap();
        assert_eq!(appended.id(), MessageId(u64::MAX));
    }

    #[test]
    fn test_append_after_max_id_is_rejected() {
        let (kv, mut store) = memory_store();
        store
            .append(Message::user("a").with_id(MessageId(u64::MAX)))
            .unwrap();

        let result = store.append(Message::user("b"));
        assert!(matches!(result, Err(ChatError::Storage(_))));
        assert_eq!(store.len(), 1);

        let restored = MessageStore::restore(Arc::new(kv), EventBus::default());
        let ids: Vec<MessageId> = restored.messages().iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![MessageId(u64::MAX)]);
    }

    #[test]
    fn test_formatted_messages_roundtrip() {
        let (kv, mut store) = memory_store();
        let content = StructuredContent::new(vec![
            Block::Heading("Seville".into()),
            Block::Subheading("Local Specialty".into()),
            Block::Paragraph("Gazpacho".into()),
        ]);
        store
            .append(Message::assistant(MessageBody::Formatted(content.clone())))
            .unwrap();

        let restored = MessageStore::restore(Arc::new(kv), EventBus::default());
        let msg = restored.last().unwrap();
        assert!(msg.is_formatted());
        assert_eq!(msg.body(), &MessageBody::Formatted(content));
    }

    #[test]
    fn test_clear_removes_persisted_key() {
        let (kv, mut store) = memory_store();
        store.append(Message::user("a")).unwrap();
        store
            .append(Message::assistant_error("Sorry"))
            .unwrap();
        assert!(kv.contains_key(HISTORY_KEY));

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!kv.contains_key(HISTORY_KEY));
    }

    #[test]
    fn test_append_keeps_message_when_persist_fails() {
        let mut store = MessageStore::new(Arc::new(ReadOnlyKv), EventBus::default());
        let result = store.append(Message::user("kept"));
        assert!(matches!(result, Err(ChatError::Storage(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.last().unwrap().plain_text(), "kept");
    }

    #[test]
    fn test_get_by_id() {
        let (_kv, mut store) = memory_store();
        let id = store.append(Message::user("find me")).unwrap().id();
        assert_eq!(store.get(id).unwrap().plain_text(), "find me");
        assert!(store.get(MessageId(0)).is_none());
    }

    #[test]
    fn test_mutations_emit_events() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        let mut store = MessageStore::new(Arc::new(MemoryKeyValueStore::new()), bus);

        store.append(Message::user("hello")).unwrap();
        store.clear().unwrap();

        let first = sub.try_recv().unwrap();
        assert!(matches!(
            first,
            ChatEvent::MessageAppended { author: wayfarer_core::Author::User, .. }
        ));
        let second = sub.try_recv().unwrap();
        assert_eq!(second.event_name(), "history_cleared");
    }
}
