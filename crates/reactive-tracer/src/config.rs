//! Configuration for trace recording and retention

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Trace recording configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Attach a tracer to every node created through the runtime
    pub enabled: bool,
    /// SQLite file for durable traces (in-memory store when unset)
    pub database_path: Option<PathBuf>,
    /// Ceiling on durable rows kept per tracer
    pub max_table_size: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
            max_table_size: defaults::MAX_TABLE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_takes_defaults() {
        let config: TraceConfig = serde_json::from_str(r#"{"database_path":"rx.db"}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.database_path, Some(PathBuf::from("rx.db")));
        assert_eq!(config.max_table_size, defaults::MAX_TABLE_SIZE);
    }
}
