//! Detached-session retention
//!
//! Decides what happens to a session once its connection goes away. By
//! default the session, its kernel and its document are kept until explicit
//! teardown. With a grace period, a timer closes the session if nobody has
//! reattached by the time it fires.

use std::sync::Weak;
use std::time::Duration;

use super::key::SessionKey;
use super::registry::SessionRegistry;
use crate::config::RetentionConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    grace_period: Option<Duration>,
}

impl RetentionPolicy {
    /// Detached sessions live until torn down explicitly
    pub fn keep_forever() -> Self {
        Self { grace_period: None }
    }

    /// Detached sessions are closed after `grace_period`
    pub fn expire_after(grace_period: Duration) -> Self {
        Self {
            grace_period: Some(grace_period),
        }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
        }
    }

    pub fn grace_period(&self) -> Option<Duration> {
        self.grace_period
    }
}

/// Result of handling a connection going away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The session lost its current connection
    Detached {
        /// Time left before the session is closed, if retention expires
        expires_in: Option<Duration>,
    },
    /// The connection had already been replaced; nothing changed
    Stale,
}

/// Close the session at `key` after `grace_period` unless it was reattached.
///
/// `generation` is the session's attachment generation right after the
/// detach; any attach in between changes it and cancels the expiry.
pub(super) fn schedule_expiry(
    registry: Weak<SessionRegistry>,
    key: SessionKey,
    generation: u64,
    grace_period: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(grace_period).await;
        let Some(registry) = registry.upgrade() else {
            return;
        };
        if registry.expire(&key, generation).await {
            tracing::info!(session_key = %key, "Detached session expired");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keeps_forever() {
        assert_eq!(RetentionPolicy::default(), RetentionPolicy::keep_forever());
        assert!(RetentionPolicy::default().grace_period().is_none());
    }

    #[test]
    fn from_config_reads_grace_period() {
        let policy = RetentionPolicy::from_config(&RetentionConfig {
            grace_period_secs: Some(30),
        });
        assert_eq!(policy, RetentionPolicy::expire_after(Duration::from_secs(30)));
    }
}
