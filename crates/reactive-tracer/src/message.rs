//! Trace records: messages and tracer rows
//!
//! Field names on the serialized shapes are part of the on-wire contract
//! (`uuid`, `tracerUUID`, `path`, `text`, `type`, `timestamp`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a trace message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Info,
    Debug,
    Error,
    Warning,
}

impl TraceLevel {
    /// Name used in storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::Info => "info",
            TraceLevel::Debug => "debug",
            TraceLevel::Error => "error",
            TraceLevel::Warning => "warning",
        }
    }

    /// Parse a stored level name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "info" => Some(TraceLevel::Info),
            "debug" => Some(TraceLevel::Debug),
            "error" => Some(TraceLevel::Error),
            "warning" => Some(TraceLevel::Warning),
            _ => None,
        }
    }
}

impl From<TraceLevel> for log::Level {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Info => log::Level::Info,
            TraceLevel::Debug => log::Level::Debug,
            TraceLevel::Error => log::Level::Error,
            TraceLevel::Warning => log::Level::Warn,
        }
    }
}

impl std::fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn persisted() -> bool {
    true
}

/// A single diagnostic line recorded by a tracer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub uuid: String,
    #[serde(rename = "tracerUUID", default, skip_serializing_if = "Option::is_none")]
    pub tracer_uuid: Option<String>,
    pub path: String,
    pub text: String,
    #[serde(rename = "type")]
    pub level: TraceLevel,
    /// Whether the message migrates to the durable store on save
    #[serde(skip, default = "persisted")]
    pub persist_to_disk: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time and a fresh identifier
    pub fn new(
        path: impl Into<String>,
        text: impl Into<String>,
        level: TraceLevel,
        persist_to_disk: bool,
    ) -> Self {
        Self {
            uuid: crate::short_uuid(),
            tracer_uuid: None,
            path: path.into(),
            text: text.into(),
            level,
            persist_to_disk,
            timestamp: Utc::now(),
        }
    }

    /// Render the line emitted to the log sink
    pub fn log_line(&self) -> String {
        format!(
            "TS:{} UUID: {}: Path: {} ->: {}",
            self.timestamp.to_rfc2822(),
            self.uuid,
            self.path,
            self.text
        )
    }
}

/// Durable row describing one tracer instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerRecord {
    pub uuid: String,
    /// Plugin or service name
    pub path: String,
    /// Application tag, e.g. `modbus`
    pub application: String,
    /// Common grouping key, e.g. `modbus read-coil`
    pub key: String,
    /// Node (or subsystem) instance the tracer belongs to
    #[serde(rename = "instanceUUID")]
    pub instance_uuid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

/// Predicate for message lookups; results are always oldest first
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub tracer_uuid: Option<String>,
    pub limit: Option<usize>,
}

impl MessageFilter {
    /// All messages belonging to one tracer
    pub fn tracer(uuid: impl Into<String>) -> Self {
        Self {
            tracer_uuid: Some(uuid.into()),
            limit: None,
        }
    }

    /// Cap the number of rows returned
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, message: &Message) -> bool {
        match &self.tracer_uuid {
            Some(uuid) => message.tracer_uuid.as_deref() == Some(uuid.as_str()),
            None => true,
        }
    }
}
