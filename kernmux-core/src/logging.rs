//! Tracing bootstrap for processes embedding the multiplexer

use tracing_subscriber::EnvFilter;

pub use tracing_subscriber::util::TryInitError;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive` (e.g. `"info"` or
/// `"kernmux_core=debug"`). Fails instead of panicking when a global
/// subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .finish()
        .try_init()
}
