//! Configuration for a graph runtime

use std::path::Path;

use reactive_tracer::TraceConfig;
use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::error::Result;

/// Runtime configuration
///
/// Loaded from JSON; any missing field takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Live-view buffer per listener (0 disables the live view)
    pub live_view_capacity: usize,
    pub trace: TraceConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_filter: defaults::LOG_FILTER.to_string(),
            live_view_capacity: defaults::LIVE_VIEW_CAPACITY,
            trace: TraceConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.log_filter, "info");
        assert!(config.trace.enabled);
    }

    #[test]
    fn test_load_nested_trace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(
            &path,
            r#"{"log_filter":"debug","trace":{"database_path":"traces.db","max_table_size":50}}"#,
        )
        .unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.live_view_capacity, defaults::LIVE_VIEW_CAPACITY);
        assert_eq!(config.trace.database_path, Some(PathBuf::from("traces.db")));
        assert_eq!(config.trace.max_table_size, 50);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            RuntimeConfig::load("/nonexistent/runtime.json"),
            Err(crate::ReactiveError::Io(_))
        ));
    }
}
