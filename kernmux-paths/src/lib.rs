//! XDG Base Directory paths for kernmux.
//!
//! The multiplexer runs as a long-lived service next to its kernels, so it
//! follows XDG paths on every platform rather than platform-native locations.

use std::path::PathBuf;

const APP_DIR: &str = "kernmux";

/// Get the kernmux config directory.
///
/// Returns `$XDG_CONFIG_HOME/kernmux` if set, otherwise `~/.config/kernmux`.
/// The user-level `config.toml` lives here.
///
/// # Examples
///
/// ```
/// use kernmux_paths::config_dir;
///
/// let config_file = config_dir().join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    resolve("XDG_CONFIG_HOME", ".config")
}

/// Get the kernmux data directory.
///
/// Returns `$XDG_DATA_HOME/kernmux` if set, otherwise `~/.local/share/kernmux`.
/// Notebook documents are stored under [`notebooks_dir`] inside it.
pub fn data_dir() -> PathBuf {
    resolve("XDG_DATA_HOME", ".local/share")
}

/// Default root of the filesystem document store.
pub fn notebooks_dir() -> PathBuf {
    data_dir().join("notebooks")
}

fn resolve(xdg_var: &str, home_relative: &str) -> PathBuf {
    if let Ok(base) = std::env::var(xdg_var) {
        PathBuf::from(base).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(home_relative).join(APP_DIR)
    } else {
        PathBuf::from(home_relative).join(APP_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var mutation is process-wide, so every assertion that touches
    // XDG_* lives in this single test.
    #[test]
    fn dirs_respect_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
            std::env::set_var("XDG_DATA_HOME", "/tmp/test-data");
        }
        assert_eq!(config_dir(), PathBuf::from("/tmp/test-config/kernmux"));
        assert_eq!(data_dir(), PathBuf::from("/tmp/test-data/kernmux"));
        assert_eq!(
            notebooks_dir(),
            PathBuf::from("/tmp/test-data/kernmux/notebooks")
        );
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
            std::env::remove_var("XDG_DATA_HOME");
        }
        assert!(config_dir().ends_with("kernmux"));
        assert!(data_dir().ends_with("kernmux"));
    }
}
