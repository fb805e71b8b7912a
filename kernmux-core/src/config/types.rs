use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// First port handed out by the built-in port pool
pub const DEFAULT_PORT_START: u16 = 50000;
/// Last port (inclusive) handed out by the built-in port pool
pub const DEFAULT_PORT_END: u16 = 50999;
/// Depth of each session's client-to-kernel queue
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;
/// Kernel messages kept for a detached session
pub const DEFAULT_BACKLOG_CAPACITY: usize = 1000;

/// Configuration as stored in TOML files (optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawMuxConfig {
    #[serde(default)]
    pub ports: RawPortRange,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub relay: RawRelayConfig,

    #[serde(default)]
    pub pipeline: RawPipelineConfig,

    #[serde(default)]
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPortRange {
    pub start: Option<u16>,
    pub end: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRelayConfig {
    pub inbound_capacity: Option<usize>,
    pub backlog_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPipelineConfig {
    pub drop_types: Option<Vec<String>>,
    pub tag_session: Option<bool>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MuxConfig {
    #[serde(default)]
    pub ports: PortRangeConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub documents: DocumentsConfig,
}

/// Inclusive port range served by the built-in port pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRangeConfig {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRangeConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_START,
            end: DEFAULT_PORT_END,
        }
    }
}

/// What happens to a session after its connection goes away
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Seconds a detached session is kept before its kernel is torn down.
    /// Unset keeps detached sessions until explicit teardown.
    #[serde(default)]
    pub grace_period_secs: Option<u64>,
}

impl RetentionConfig {
    pub fn grace_period(&self) -> Option<Duration> {
        self.grace_period_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayConfig {
    pub inbound_capacity: usize,
    pub backlog_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
        }
    }
}

/// Built-in processors placed at the head of every chain
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Message types vetoed in both directions
    #[serde(default)]
    pub drop_types: Vec<String>,

    /// Stamp `metadata.session_key` onto messages bound for the kernel
    #[serde(default)]
    pub tag_session: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentsConfig {
    /// Root of the filesystem document store (defaults to the XDG data dir)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Document loaded for connections that don't ask for one.
    /// Unset gives them a fresh blank document.
    #[serde(default)]
    pub default_path: Option<PathBuf>,
}

impl DocumentsConfig {
    pub fn root_or_default(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(kernmux_paths::notebooks_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = MuxConfig::default();
        assert_eq!(config.ports.start, DEFAULT_PORT_START);
        assert_eq!(config.ports.end, DEFAULT_PORT_END);
        assert!(config.retention.grace_period().is_none());
        assert_eq!(config.relay.inbound_capacity, DEFAULT_INBOUND_CAPACITY);
        assert_eq!(config.relay.backlog_capacity, DEFAULT_BACKLOG_CAPACITY);
        assert!(config.pipeline.drop_types.is_empty());
        assert!(!config.pipeline.tag_session);
        assert!(config.documents.default_path.is_none());
    }

    #[test]
    fn grace_period_converts_seconds() {
        let retention = RetentionConfig {
            grace_period_secs: Some(90),
        };
        assert_eq!(retention.grace_period(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn raw_config_parses_partial_toml() {
        let raw: RawMuxConfig = toml::from_str(
            r#"
            [ports]
            start = 6000

            [pipeline]
            drop_types = ["comm_open"]
            "#,
        )
        .unwrap();

        assert_eq!(raw.ports.start, Some(6000));
        assert_eq!(raw.ports.end, None);
        assert_eq!(raw.pipeline.drop_types, Some(vec!["comm_open".to_string()]));
        assert_eq!(raw.pipeline.tag_session, None);
    }

    #[test]
    fn mux_config_toml_roundtrip() {
        let config = MuxConfig {
            retention: RetentionConfig {
                grace_period_secs: Some(300),
            },
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        let parsed: MuxConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
