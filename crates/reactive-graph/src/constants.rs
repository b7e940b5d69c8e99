//! Shared constants for the node graph

/// Default values for runtime configuration
pub mod defaults {
    /// Log filter used when `RUST_LOG` is unset
    pub const LOG_FILTER: &str = "info";
    /// Messages buffered for each live-view listener
    pub const LIVE_VIEW_CAPACITY: usize = 64;
    /// Slots in an input port's mailbox
    pub const MAILBOX_CAPACITY: usize = 1;
}

/// Length of generated node UUIDs
pub const NODE_UUID_LEN: usize = 10;
