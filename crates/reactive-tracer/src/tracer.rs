//! Per-node diagnostic channel with two-tier storage
//!
//! Messages are appended to an in-memory buffer and echoed to the `log`
//! facade immediately. [`Tracer::save_messages_to_db`] migrates the
//! disk-bound part of the buffer into the durable store while keeping the
//! tracer's durable row count at or under a ceiling.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::LOG_TARGET;
use crate::error::{Result, TraceError};
use crate::message::{Message, MessageFilter, TraceLevel, TracerRecord};
use crate::store::TraceStore;

/// Serializes every retention pass across all tracers sharing a store
static RETENTION_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Diagnostic log stream owned by exactly one node or subsystem
pub struct Tracer {
    uuid: Option<String>,
    path: String,
    application: String,
    key: String,
    instance_uuid: String,
    unsaved: Vec<Message>,
    store: Option<Arc<dyn TraceStore>>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("uuid", &self.uuid)
            .field("path", &self.path)
            .field("application", &self.application)
            .field("key", &self.key)
            .field("instance_uuid", &self.instance_uuid)
            .field("unsaved", &self.unsaved.len())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Tracer {
    /// Create a tracer for a plugin path and application tag
    pub fn new(
        path: impl Into<String>,
        application: impl Into<String>,
        store: Option<Arc<dyn TraceStore>>,
    ) -> Self {
        Self {
            uuid: None,
            path: path.into(),
            application: application.into(),
            key: String::new(),
            instance_uuid: String::new(),
            unsaved: Vec::new(),
            store,
        }
    }

    /// Durable identity, assigned by [`add_tracer`](Self::add_tracer)
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn instance_uuid(&self) -> &str {
        &self.instance_uuid
    }

    /// Change the default path and application used by the convenience appenders
    pub fn setup(&mut self, path: impl Into<String>, application: impl Into<String>) {
        self.path = path.into();
        self.application = application.into();
    }

    /// Key could be `modbus read-coil` or something common
    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    /// Bind (or replace) the durable store handle
    pub fn bind_store(&mut self, store: Arc<dyn TraceStore>) {
        self.store = Some(store);
    }

    fn store(&self) -> Result<&Arc<dyn TraceStore>> {
        self.store.as_ref().ok_or(TraceError::StoreNotBound)
    }

    fn record(&self) -> Result<TracerRecord> {
        let uuid = self.uuid.clone().ok_or(TraceError::MissingIdentity)?;
        Ok(TracerRecord {
            uuid,
            path: self.path.clone(),
            application: self.application.clone(),
            key: self.key.clone(),
            instance_uuid: self.instance_uuid.clone(),
            messages: Vec::new(),
        })
    }

    /// Register this tracer in the durable store and take on its identity
    pub fn add_tracer(&mut self, instance_uuid: impl Into<String>, key: impl Into<String>) -> Result<()> {
        let store = Arc::clone(self.store()?);
        let record = TracerRecord {
            uuid: crate::short_uuid(),
            path: self.path.clone(),
            application: self.application.clone(),
            key: key.into(),
            instance_uuid: instance_uuid.into(),
            messages: Vec::new(),
        };
        store.create_tracer(&record)?;

        log::debug!(
            "Registered tracer {} for instance {}",
            record.uuid,
            record.instance_uuid
        );
        self.uuid = Some(record.uuid);
        self.key = record.key;
        self.instance_uuid = record.instance_uuid;
        Ok(())
    }

    /// Persist the current path/application/key of this tracer
    pub fn update_tracer(&self) -> Result<()> {
        let record = self.record()?;
        self.store()?.update_tracer(&record)
    }

    /// Delete a tracer row and its messages.
    ///
    /// Deleting this tracer's own row also clears its identity and buffer.
    pub fn delete_tracer(&mut self, uuid: &str) -> Result<()> {
        self.store()?.delete_tracer(uuid)?;
        if self.uuid.as_deref() == Some(uuid) {
            self.uuid = None;
            self.unsaved.clear();
        }
        Ok(())
    }

    /// Every tracer in the store, with messages preloaded
    pub fn all_tracers(&self) -> Result<Vec<TracerRecord>> {
        self.store()?.tracers()
    }

    /// Durable messages owned by a tracer, oldest first
    pub fn messages_for(&self, tracer_uuid: &str) -> Result<Vec<Message>> {
        self.store()?.find_messages(&MessageFilter::tracer(tracer_uuid))
    }

    /// Append a message to the in-memory buffer and echo it to the log sink.
    ///
    /// Never touches the durable store.
    pub fn add_message(
        &mut self,
        path: impl Into<String>,
        text: impl Into<String>,
        level: TraceLevel,
        persist_to_disk: bool,
    ) -> Message {
        let mut message = Message::new(path, text, level, persist_to_disk);
        message.tracer_uuid = self.uuid.clone();

        log::log!(target: LOG_TARGET, log::Level::from(level), "{}", message.log_line());

        self.unsaved.push(message.clone());
        message
    }

    pub fn info(&mut self, text: impl Into<String>) -> Message {
        let path = self.path.clone();
        self.add_message(path, text, TraceLevel::Info, true)
    }

    pub fn debug(&mut self, text: impl Into<String>) -> Message {
        let path = self.path.clone();
        self.add_message(path, text, TraceLevel::Debug, true)
    }

    pub fn warning(&mut self, text: impl Into<String>) -> Message {
        let path = self.path.clone();
        self.add_message(path, text, TraceLevel::Warning, true)
    }

    pub fn error(&mut self, text: impl Into<String>) -> Message {
        let path = self.path.clone();
        self.add_message(path, text, TraceLevel::Error, true)
    }

    /// Messages not yet migrated to the durable store
    pub fn in_memory_messages(&self) -> &[Message] {
        &self.unsaved
    }

    /// This tracer's durable messages, optionally followed by the unsaved buffer
    pub fn all_messages(&self, from_memory: bool) -> Result<Vec<Message>> {
        let uuid = self.uuid.as_deref().ok_or(TraceError::MissingIdentity)?;
        let mut messages = self.messages_for(uuid)?;
        if from_memory {
            messages.extend(self.unsaved.iter().cloned());
        }
        Ok(messages)
    }

    /// Migrate disk-bound buffered messages to the durable store.
    ///
    /// When durable plus pending rows exceed `max_table_size`, the overflow
    /// is taken from the oldest pending messages first (they are never
    /// written); overflow left once the pending batch is exhausted evicts
    /// the tracer's oldest durable rows. Nothing is deleted when the
    /// combined count fits. On any store failure the buffer is kept intact
    /// so the batch can be retried.
    pub fn save_messages_to_db(&mut self, max_table_size: usize) -> Result<()> {
        let _guard = RETENTION_LOCK.lock();

        let uuid = self.uuid.clone().ok_or(TraceError::MissingIdentity)?;
        let store = Arc::clone(self.store()?);

        let mut pending: Vec<Message> = self
            .unsaved
            .iter()
            .filter(|m| m.persist_to_disk)
            .cloned()
            .collect();
        let durable = store.count_messages(&uuid)?;
        let combined = durable + pending.len();

        let mut evict = Vec::new();
        if combined > max_table_size {
            let overflow = combined - max_table_size;
            let dropped = overflow.min(pending.len());
            pending.drain(..dropped);

            let remaining = overflow - dropped;
            if remaining > 0 {
                evict = store
                    .find_messages(&MessageFilter::tracer(&uuid).limit(remaining))?
                    .into_iter()
                    .map(|m| m.uuid)
                    .collect();
            }
            log::debug!(
                "Tracer {} over budget by {}: dropping {} pending, evicting {} durable",
                uuid,
                overflow,
                dropped,
                evict.len()
            );
        }

        for message in &mut pending {
            message.tracer_uuid = Some(uuid.clone());
        }
        store.apply_retention(&evict, &pending)?;

        self.unsaved.clear();
        Ok(())
    }
}
