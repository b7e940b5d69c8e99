//! Error types for the trace store

use thiserror::Error;

/// Result type alias using TraceError
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors that can occur while recording or persisting traces
#[derive(Debug, Error)]
pub enum TraceError {
    /// The tracer has not been registered with a durable identity yet
    #[error("tracer-uuid can not be empty")]
    MissingIdentity,

    /// The tracer has no durable store bound
    #[error("tracer has no durable store bound")]
    StoreNotBound,

    /// A durable store operation failed
    #[error("{operation} failed for '{target}': {message}")]
    Storage {
        operation: &'static str,
        target: String,
        message: String,
    },
}

impl TraceError {
    /// Build a `map_err` adapter that wraps a backend failure with the
    /// operation name and the identifiers involved.
    pub fn storage<E: std::fmt::Display>(
        operation: &'static str,
        target: impl Into<String>,
    ) -> impl FnOnce(E) -> Self {
        let target = target.into();
        move |err| Self::Storage {
            operation,
            target,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_carries_context() {
        let err = Err::<(), _>("disk full")
            .map_err(TraceError::storage("create_messages", "tracer-1"))
            .unwrap_err();

        let text = err.to_string();
        assert!(text.contains("create_messages"));
        assert!(text.contains("tracer-1"));
        assert!(text.contains("disk full"));
    }
}
