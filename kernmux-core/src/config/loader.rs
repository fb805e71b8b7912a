use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::{
    DocumentsConfig, MuxConfig, PipelineConfig, PortRangeConfig, RawMuxConfig, RawPipelineConfig,
    RawPortRange, RawRelayConfig, RelayConfig, RetentionConfig,
};

/// Errors while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid port range {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<MuxConfig, ConfigError> {
        let layers = [Self::user_config_path(), Self::project_config_path()];
        Self::load_layers(&layers)
    }

    /// Load configuration from explicit layers; later layers win.
    /// Missing files are skipped.
    pub fn load_layers(paths: &[PathBuf]) -> Result<MuxConfig, ConfigError> {
        let mut raw = RawMuxConfig::default();

        for path in paths {
            if !path.exists() {
                continue;
            }
            let layer = Self::read_layer(path)?;
            tracing::debug!(path = %path.display(), "Applied config layer");
            raw = Self::merge_raw(raw, layer);
        }

        Self::finalize(raw)
    }

    /// Parse a single TOML document with defaults applied
    pub fn from_toml_str(contents: &str) -> Result<MuxConfig, ConfigError> {
        let raw: RawMuxConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::finalize(raw)
    }

    /// `$XDG_CONFIG_HOME/kernmux/config.toml`
    pub fn user_config_path() -> PathBuf {
        kernmux_paths::config_dir().join("config.toml")
    }

    /// Project config path.
    /// Can be overridden with KERNMUX_PROJECT_CONFIG_DIR (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("KERNMUX_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".kernmux/config.toml")
        }
    }

    fn read_layer(path: &Path) -> Result<RawMuxConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values override base only if explicitly set
    fn merge_raw(base: RawMuxConfig, overlay: RawMuxConfig) -> RawMuxConfig {
        RawMuxConfig {
            ports: RawPortRange {
                start: overlay.ports.start.or(base.ports.start),
                end: overlay.ports.end.or(base.ports.end),
            },
            retention: RetentionConfig {
                grace_period_secs: overlay
                    .retention
                    .grace_period_secs
                    .or(base.retention.grace_period_secs),
            },
            relay: RawRelayConfig {
                inbound_capacity: overlay
                    .relay
                    .inbound_capacity
                    .or(base.relay.inbound_capacity),
                backlog_capacity: overlay
                    .relay
                    .backlog_capacity
                    .or(base.relay.backlog_capacity),
            },
            pipeline: RawPipelineConfig {
                drop_types: overlay.pipeline.drop_types.or(base.pipeline.drop_types),
                tag_session: overlay.pipeline.tag_session.or(base.pipeline.tag_session),
            },
            documents: DocumentsConfig {
                root: overlay.documents.root.or(base.documents.root),
                default_path: overlay
                    .documents
                    .default_path
                    .or(base.documents.default_path),
            },
        }
    }

    fn finalize(raw: RawMuxConfig) -> Result<MuxConfig, ConfigError> {
        let port_defaults = PortRangeConfig::default();
        let ports = PortRangeConfig {
            start: raw.ports.start.unwrap_or(port_defaults.start),
            end: raw.ports.end.unwrap_or(port_defaults.end),
        };
        if ports.start > ports.end {
            return Err(ConfigError::InvalidPortRange {
                start: ports.start,
                end: ports.end,
            });
        }

        let relay_defaults = RelayConfig::default();
        Ok(MuxConfig {
            ports,
            retention: raw.retention,
            relay: RelayConfig {
                inbound_capacity: raw
                    .relay
                    .inbound_capacity
                    .unwrap_or(relay_defaults.inbound_capacity)
                    .max(1),
                backlog_capacity: raw
                    .relay
                    .backlog_capacity
                    .unwrap_or(relay_defaults.backlog_capacity),
            },
            pipeline: PipelineConfig {
                drop_types: raw.pipeline.drop_types.unwrap_or_default(),
                tag_session: raw.pipeline.tag_session.unwrap_or(false),
            },
            documents: raw.documents,
        })
    }
}
