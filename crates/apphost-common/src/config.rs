//! Global configuration model for the composition host.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for a composition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppHostConfig {
    /// Path to the composition manifest.
    pub manifest: PathBuf,
    /// Where a state snapshot is written after every state change, if anywhere.
    pub state_file: Option<PathBuf>,
    /// Upper bound for a single resource to become ready, in milliseconds.
    pub startup_timeout_ms: u64,
    /// Delay between readiness probes, in milliseconds.
    pub readiness_poll_ms: u64,
    /// Delay between liveness sweeps, in milliseconds.
    pub supervise_interval_ms: u64,
}

impl AppHostConfig {
    /// Returns the startup timeout as a [`Duration`].
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Returns the readiness poll interval as a [`Duration`].
    #[must_use]
    pub const fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    /// Returns the supervision interval as a [`Duration`].
    #[must_use]
    pub const fn supervise_interval(&self) -> Duration {
        Duration::from_millis(self.supervise_interval_ms)
    }

    /// Checks that every interval is usable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any interval is zero.
    pub fn validate(&self) -> crate::error::Result<()> {
        let intervals = [
            ("startup_timeout_ms", self.startup_timeout_ms),
            ("readiness_poll_ms", self.readiness_poll_ms),
            ("supervise_interval_ms", self.supervise_interval_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(crate::error::AppHostError::Config {
                    message: format!("{field} must be greater than zero"),
                });
            }
        }
        Ok(())
    }
}

impl Default for AppHostConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(constants::DEFAULT_MANIFEST),
            state_file: None,
            startup_timeout_ms: constants::DEFAULT_STARTUP_TIMEOUT_MS,
            readiness_poll_ms: constants::DEFAULT_READINESS_POLL_MS,
            supervise_interval_ms: constants::DEFAULT_SUPERVISE_INTERVAL_MS,
        }
    }
}
