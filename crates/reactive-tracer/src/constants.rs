//! Shared constants for trace storage

/// Default values for trace configuration
pub mod defaults {
    /// Durable rows kept per tracer before the oldest are trimmed
    pub const MAX_TABLE_SIZE: usize = 1000;
}

/// Log target used for the structured-log side channel
pub const LOG_TARGET: &str = "reactive::trace";

/// Length of generated record identifiers
pub const ID_LEN: usize = 16;
