//! Durable store seam for traces
//!
//! The tracer only relies on the operations below, so any embedded
//! relational engine can back it. [`SqliteTraceStore`](crate::SqliteTraceStore)
//! is the production implementation; [`InMemoryTraceStore`] backs tests and
//! hosts that run without a database file.

use parking_lot::Mutex;

use crate::error::{Result, TraceError};
use crate::message::{Message, MessageFilter, TracerRecord};

/// Operations the trace component needs from a durable store
pub trait TraceStore: Send + Sync {
    /// Create the tracer and message tables if they do not exist
    fn migrate(&self) -> Result<()>;

    /// Insert a tracer row
    fn create_tracer(&self, record: &TracerRecord) -> Result<()>;

    /// Overwrite an existing tracer row
    fn update_tracer(&self, record: &TracerRecord) -> Result<()>;

    /// Delete a tracer and every message that belongs to it
    fn delete_tracer(&self, uuid: &str) -> Result<()>;

    /// All tracers with their messages preloaded
    fn tracers(&self) -> Result<Vec<TracerRecord>>;

    /// Insert one message row
    fn create_message(&self, message: &Message) -> Result<()> {
        self.create_messages(std::slice::from_ref(message))
    }

    /// Insert a batch of message rows
    fn create_messages(&self, messages: &[Message]) -> Result<()>;

    /// Messages matching the filter, oldest first
    fn find_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>>;

    /// Number of durable messages owned by a tracer
    fn count_messages(&self, tracer_uuid: &str) -> Result<usize>;

    /// Delete messages by identifier, returning how many rows went away
    fn delete_messages(&self, ids: &[String]) -> Result<usize>;

    /// Evict then insert as one unit of work.
    ///
    /// Stores with transactions override this so a failed insert leaves the
    /// evicted rows in place.
    fn apply_retention(&self, evict: &[String], insert: &[Message]) -> Result<()> {
        if !evict.is_empty() {
            self.delete_messages(evict)?;
        }
        if !insert.is_empty() {
            self.create_messages(insert)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    tracers: Vec<TracerRecord>,
    /// Insertion order is age order
    messages: Vec<Message>,
}

impl InMemoryState {
    fn has_tracer(&self, uuid: &str) -> bool {
        self.tracers.iter().any(|t| t.uuid == uuid)
    }

    fn check_batch(&self, messages: &[Message]) -> Result<()> {
        for message in messages {
            let owner = message.tracer_uuid.as_deref().unwrap_or_default();
            if !self.has_tracer(owner) {
                return Err(TraceError::Storage {
                    operation: "create_messages",
                    target: message.uuid.clone(),
                    message: format!("unknown tracer '{}'", owner),
                });
            }
            if self.messages.iter().any(|m| m.uuid == message.uuid) {
                return Err(TraceError::Storage {
                    operation: "create_messages",
                    target: message.uuid.clone(),
                    message: "duplicate message uuid".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Store that keeps every row in process memory
#[derive(Debug, Default)]
pub struct InMemoryTraceStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceStore for InMemoryTraceStore {
    fn migrate(&self) -> Result<()> {
        Ok(())
    }

    fn create_tracer(&self, record: &TracerRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.has_tracer(&record.uuid) {
            return Err(TraceError::Storage {
                operation: "create_tracer",
                target: record.uuid.clone(),
                message: "tracer already exists".to_string(),
            });
        }
        let mut row = record.clone();
        row.messages.clear();
        state.tracers.push(row);
        Ok(())
    }

    fn update_tracer(&self, record: &TracerRecord) -> Result<()> {
        let mut state = self.state.lock();
        let row = state
            .tracers
            .iter_mut()
            .find(|t| t.uuid == record.uuid)
            .ok_or_else(|| TraceError::Storage {
                operation: "update_tracer",
                target: record.uuid.clone(),
                message: "tracer not found".to_string(),
            })?;
        *row = TracerRecord {
            messages: Vec::new(),
            ..record.clone()
        };
        Ok(())
    }

    fn delete_tracer(&self, uuid: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.tracers.retain(|t| t.uuid != uuid);
        state
            .messages
            .retain(|m| m.tracer_uuid.as_deref() != Some(uuid));
        Ok(())
    }

    fn tracers(&self) -> Result<Vec<TracerRecord>> {
        let state = self.state.lock();
        Ok(state
            .tracers
            .iter()
            .map(|t| TracerRecord {
                messages: state
                    .messages
                    .iter()
                    .filter(|m| m.tracer_uuid.as_deref() == Some(t.uuid.as_str()))
                    .cloned()
                    .collect(),
                ..t.clone()
            })
            .collect())
    }

    fn create_messages(&self, messages: &[Message]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_batch(messages)?;
        state.messages.extend_from_slice(messages);
        Ok(())
    }

    fn find_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let state = self.state.lock();
        let matching = state.messages.iter().filter(|m| filter.matches(m)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn count_messages(&self, tracer_uuid: &str) -> Result<usize> {
        let state = self.state.lock();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.tracer_uuid.as_deref() == Some(tracer_uuid))
            .count())
    }

    fn delete_messages(&self, ids: &[String]) -> Result<usize> {
        let mut state = self.state.lock();
        let before = state.messages.len();
        state.messages.retain(|m| !ids.contains(&m.uuid));
        Ok(before - state.messages.len())
    }

    fn apply_retention(&self, evict: &[String], insert: &[Message]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_batch(insert)?;
        state.messages.retain(|m| !evict.contains(&m.uuid));
        state.messages.extend_from_slice(insert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TraceLevel;

    fn tracer(uuid: &str) -> TracerRecord {
        TracerRecord {
            uuid: uuid.to_string(),
            path: "plugin".to_string(),
            instance_uuid: "node-1".to_string(),
            ..Default::default()
        }
    }

    fn message(owner: &str, text: &str) -> Message {
        let mut message = Message::new("plugin", text, TraceLevel::Info, true);
        message.tracer_uuid = Some(owner.to_string());
        message
    }

    #[test]
    fn test_messages_require_known_tracer() {
        let store = InMemoryTraceStore::new();
        let result = store.create_message(&message("ghost", "lost"));
        assert!(matches!(result, Err(TraceError::Storage { .. })));
    }

    #[test]
    fn test_find_is_oldest_first_and_limited() {
        let store = InMemoryTraceStore::new();
        store.create_tracer(&tracer("t1")).unwrap();
        store
            .create_messages(&[message("t1", "a"), message("t1", "b"), message("t1", "c")])
            .unwrap();

        let found = store.find_messages(&MessageFilter::tracer("t1").limit(2)).unwrap();
        let texts: Vec<_> = found.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_delete_tracer_cascades() {
        let store = InMemoryTraceStore::new();
        store.create_tracer(&tracer("t1")).unwrap();
        store.create_tracer(&tracer("t2")).unwrap();
        store.create_message(&message("t1", "a")).unwrap();
        store.create_message(&message("t2", "b")).unwrap();

        store.delete_tracer("t1").unwrap();

        assert_eq!(store.count_messages("t1").unwrap(), 0);
        assert_eq!(store.count_messages("t2").unwrap(), 1);
        assert_eq!(store.tracers().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_retention_keeps_rows() {
        let store = InMemoryTraceStore::new();
        store.create_tracer(&tracer("t1")).unwrap();
        let kept = message("t1", "kept");
        store.create_message(&kept).unwrap();

        let result = store.apply_retention(&[kept.uuid.clone()], &[message("ghost", "bad")]);

        assert!(result.is_err());
        assert_eq!(store.count_messages("t1").unwrap(), 1);
    }
}
