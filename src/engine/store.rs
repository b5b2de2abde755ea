// ── Luma Engine: Conversation Store ────────────────────────────────────────
//
// The append-only conversation record seam. Durable storage lives in the
// host app; the engine only needs these four operations. The streaming
// pipeline appends exactly one user record and exactly one assistant record
// per successful turn — the assistant record is mutated in place while
// streaming, then frozen.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::ChatRecord;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

pub trait ConversationStore: Send + Sync {
    /// Append a record to a conversation's history.
    fn append(&self, conversation: &str, record: ChatRecord) -> EngineResult<()>;

    /// Append a text delta to a record's content (streaming mutation).
    /// Fails on a frozen or missing record.
    fn append_content(&self, conversation: &str, id: Uuid, delta: &str) -> EngineResult<()>;

    /// Freeze a record: no further content mutation is allowed.
    fn freeze(&self, conversation: &str, id: Uuid) -> EngineResult<()>;

    /// Full history, oldest first.
    fn history(&self, conversation: &str) -> Vec<ChatRecord>;
}

// ── In-memory implementation ───────────────────────────────────────────────

/// Conversation store backed by a process-local map. Good enough for the
/// engine's own bookkeeping and for tests; hosts that need durability wrap
/// their own record store in the trait instead.
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Vec<ChatRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryStore {
    fn append(&self, conversation: &str, record: ChatRecord) -> EngineResult<()> {
        self.conversations
            .lock()
            .entry(conversation.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    fn append_content(&self, conversation: &str, id: Uuid, delta: &str) -> EngineResult<()> {
        let mut map = self.conversations.lock();
        let records = map
            .get_mut(conversation)
            .ok_or_else(|| EngineError::Store(format!("unknown conversation {conversation}")))?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::Store(format!("unknown record {id}")))?;
        if record.frozen {
            return Err(EngineError::Store(format!("record {id} is frozen")));
        }
        record.content.push_str(delta);
        Ok(())
    }

    fn freeze(&self, conversation: &str, id: Uuid) -> EngineResult<()> {
        let mut map = self.conversations.lock();
        let record = map
            .get_mut(conversation)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| EngineError::Store(format!("unknown record {id}")))?;
        record.frozen = true;
        Ok(())
    }

    fn history(&self, conversation: &str) -> Vec<ChatRecord> {
        self.conversations
            .lock()
            .get(conversation)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::Sender;
    use chrono::Utc;

    #[test]
    fn test_append_and_history_order() {
        let store = MemoryStore::new();
        store.append("c1", ChatRecord::new(Sender::User, "hi", Utc::now())).unwrap();
        store.append("c1", ChatRecord::new(Sender::Assistant, "hey", Utc::now())).unwrap();

        let history = store.history("c1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender, Sender::User);
        assert_eq!(history[1].sender, Sender::Assistant);
    }

    #[test]
    fn test_streaming_mutation_then_freeze() {
        let store = MemoryStore::new();
        let record = ChatRecord::new(Sender::Assistant, "", Utc::now());
        let id = record.id;
        store.append("c1", record).unwrap();

        store.append_content("c1", id, "Hello").unwrap();
        store.append_content("c1", id, ", world").unwrap();
        store.freeze("c1", id).unwrap();

        assert!(store.append_content("c1", id, "!").is_err(), "frozen record must reject writes");
        assert_eq!(store.history("c1")[0].content, "Hello, world");
    }

    #[test]
    fn test_unknown_targets_error() {
        let store = MemoryStore::new();
        assert!(store.append_content("nope", Uuid::new_v4(), "x").is_err());
        assert!(store.freeze("nope", Uuid::new_v4()).is_err());
        assert!(store.history("nope").is_empty());
    }
}
