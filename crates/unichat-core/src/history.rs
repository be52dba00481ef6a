use tracing::{debug, warn};
use unichat_ai::Message;

use crate::storage::{KeyValueStore, StorageError};

pub const HISTORY_STORAGE_KEY: &str = "conversationHistory";
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Ordered conversation history.
///
/// Growth is unbounded; only the last `window` entries are replayed into a
/// new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    window: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl ConversationHistory {
    pub fn new(window: usize) -> Self {
        Self {
            messages: Vec::new(),
            window,
        }
    }

    /// Loads the stored history. Unreadable state is logged, removed from the
    /// store and replaced by an empty history.
    pub fn restore(store: &dyn KeyValueStore, window: usize) -> Self {
        let mut history = Self::new(window);
        let raw = match store.get(HISTORY_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return history,
            Err(error) => {
                warn!(key = HISTORY_STORAGE_KEY, %error, "history read failed, starting empty");
                return history;
            }
        };

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) => {
                debug!(count = messages.len(), "restored conversation history");
                history.messages = messages;
            }
            Err(error) => {
                warn!(key = HISTORY_STORAGE_KEY, %error, "stored history is corrupt, discarding");
                if let Err(error) = store.remove(HISTORY_STORAGE_KEY) {
                    warn!(key = HISTORY_STORAGE_KEY, %error, "failed to remove corrupt history");
                }
            }
        }
        history
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
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

    pub fn window(&self) -> usize {
        self.window
    }

    /// The last `min(window, len)` entries, keeping only user and assistant
    /// turns.
    pub fn build_outbound_window(&self) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(self.window);
        self.messages[start..]
            .iter()
            .filter(|message| message.role.is_conversational())
            .cloned()
            .collect()
    }

    /// Clears the history and drops the stored copy.
    pub fn reset(&mut self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        self.messages.clear();
        store.remove(HISTORY_STORAGE_KEY)
    }

    pub fn replace_with(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(&self.messages)?;
        store.set(HISTORY_STORAGE_KEY, &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use unichat_ai::Role;

    #[test]
    fn outbound_window_is_bounded_and_skips_system_entries() {
        let mut history = ConversationHistory::default();
        history.append(Message::system("be nice"));
        for index in 0..14 {
            if index % 2 == 0 {
                history.append(Message::user(format!("q{index}")));
            } else {
                history.append(Message::assistant(format!("a{index}")));
            }
        }
        history.append(Message::system("late system note"));

        let window = history.build_outbound_window();
        assert!(window.len() <= DEFAULT_HISTORY_WINDOW);
        assert_eq!(window.len(), 9);
        assert!(window.iter().all(|message| message.role != Role::System));
        assert_eq!(window.last().map(|m| m.content.as_str()), Some("a13"));
        assert_eq!(history.len(), 16);
    }

    #[test]
    fn short_history_is_replayed_whole() {
        let mut history = ConversationHistory::new(10);
        history.append(Message::user("hi"));
        history.append(Message::assistant("hello"));
        assert_eq!(history.build_outbound_window(), history.snapshot());
    }

    #[test]
    fn persist_then_restore_round_trips() {
        let store = MemoryStore::new();
        let mut history = ConversationHistory::new(4);
        history.append(Message::user("hi"));
        history.append(Message::assistant("hello"));
        history.persist(&store).unwrap();

        let restored = ConversationHistory::restore(&store, 4);
        assert_eq!(restored.messages(), history.messages());
        assert_eq!(restored.window(), 4);
    }

    #[test]
    fn corrupt_history_restores_empty_and_removes_key() {
        let store = MemoryStore::new();
        store.set(HISTORY_STORAGE_KEY, "[{\"role\":").unwrap();

        let restored = ConversationHistory::restore(&store, DEFAULT_HISTORY_WINDOW);
        assert!(restored.is_empty());
        assert_eq!(store.get(HISTORY_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn reset_clears_memory_and_store() {
        let store = MemoryStore::new();
        let mut history = ConversationHistory::default();
        history.append(Message::user("hi"));
        history.persist(&store).unwrap();

        history.reset(&store).unwrap();
        assert!(history.is_empty());
        assert_eq!(store.get(HISTORY_STORAGE_KEY).unwrap(), None);
    }
}
