//! Multiplexer configuration
//!
//! Configuration is layered from TOML files (user, then project) on top of
//! built-in defaults. See [`ConfigLoader`].

mod loader;
mod types;

pub use loader::{ConfigError, ConfigLoader};
pub use types::{
    DEFAULT_BACKLOG_CAPACITY, DEFAULT_INBOUND_CAPACITY, DEFAULT_PORT_END, DEFAULT_PORT_START,
    DocumentsConfig, MuxConfig, PipelineConfig, PortRangeConfig, RawMuxConfig, RelayConfig,
    RetentionConfig,
};
