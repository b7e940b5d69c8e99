//! Reactive Tracer - per-node diagnostic logs with bounded retention
//!
//! Each node (or subsystem) owns one [`Tracer`]. Messages are buffered in
//! memory, mirrored to the `log` facade as they are recorded, and migrated
//! in batches to a [`TraceStore`] whose per-tracer row count is kept under a
//! configured ceiling.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reactive_tracer::{SqliteTraceStore, Tracer};
//!
//! let store = Arc::new(SqliteTraceStore::open("rx.db")?);
//! let mut tracer = Tracer::new("my-plugin", "modbus", Some(store));
//! tracer.add_tracer("node-uuid", "read-coil")?;
//! tracer.info("polled 4 coils");
//! tracer.save_messages_to_db(1000)?;
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod message;
pub mod sqlite;
pub mod store;
pub mod tracer;

pub use config::TraceConfig;
pub use error::{Result, TraceError};
pub use message::{Message, MessageFilter, TraceLevel, TracerRecord};
pub use sqlite::SqliteTraceStore;
pub use store::{InMemoryTraceStore, TraceStore};
pub use tracer::Tracer;

/// Generate a short random identifier for trace rows
pub fn short_uuid() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(constants::ID_LEN);
    id
}
