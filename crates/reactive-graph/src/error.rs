//! Error types for the node graph

use thiserror::Error;

/// Result type alias using ReactiveError
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors that can occur in the node graph
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// No value has been observed for the port yet
    #[error("port with ID {0} not found")]
    PortValueNotFound(String),

    /// The node declares no port with this ID
    #[error("Unknown port '{port}' on node '{node}'")]
    UnknownPort { node: String, port: String },

    /// Value does not match the port's declared data kind
    #[error("Invalid value for port '{port}': expected {expected}, got {actual}")]
    InvalidPortValue {
        port: String,
        expected: String,
        actual: String,
    },

    /// The input's receiver was already handed to a processing loop
    #[error("Input '{0}' is already being consumed")]
    InputTaken(String),

    /// No child node with this UUID
    #[error("Child node not found: {0}")]
    ChildNotFound(String),

    /// The node's registry back-reference is unset or dropped
    #[error("Runtime registry is not available")]
    RegistryUnavailable,

    /// No durable store attached to the node
    #[error("node db has not been added")]
    StoreNotAttached,

    /// No tracer attached to the node
    #[error("node tracer has not been added")]
    TracerNotAttached,

    /// Trace or durable store failure
    #[error("Trace error: {0}")]
    Trace(#[from] reactive_tracer::TraceError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReactiveError {
    /// Create a port-value-not-found error
    pub fn not_found(port_id: impl Into<String>) -> Self {
        Self::PortValueNotFound(port_id.into())
    }
}
