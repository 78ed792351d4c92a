//! Link configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! timeout_s = 0.5
//! command_retries = 3
//! mission_retries = 5
//! own_system_id = 245
//! own_component_id = 190
//! mission_debugging = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LinkError;

const DEFAULT_TIMEOUT_S: f64 = 0.5;

/// Env var enabling verbose command protocol logs.
pub const COMMAND_DEBUGGING_ENV: &str = "WAYLINK_COMMAND_DEBUGGING";
/// Env var enabling verbose mission transfer logs.
pub const MISSION_DEBUGGING_ENV: &str = "WAYLINK_MISSION_TRANSFER_DEBUGGING";

/// Protocol timing, retry budgets and identity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_s: f64,
    /// Resends of an unanswered command.
    pub command_retries: u32,
    /// Retry ceiling of a mission transfer.
    pub mission_retries: u32,
    /// Driver tick period while the link is connected.
    pub poll_interval_connected_ms: u64,
    /// Driver tick period while the link is idle.
    pub poll_interval_idle_ms: u64,
    pub own_system_id: u8,
    pub own_component_id: u8,
    pub command_debugging: bool,
    pub mission_debugging: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout_s: DEFAULT_TIMEOUT_S,
            command_retries: 3,
            mission_retries: 5,
            poll_interval_connected_ms: 10,
            poll_interval_idle_ms: 100,
            own_system_id: 245,
            own_component_id: 190,
            command_debugging: false,
            mission_debugging: false,
        }
    }
}

impl LinkConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, LinkError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, LinkError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Turn on debugging flags requested through the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if env_flag(COMMAND_DEBUGGING_ENV) {
            self.command_debugging = true;
        }
        if env_flag(MISSION_DEBUGGING_ENV) {
            self.mission_debugging = true;
        }
        self
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        if !(self.timeout_s.is_finite() && self.timeout_s > 0.0) {
            return Err(LinkError::InvalidConfig(format!(
                "timeout_s must be a positive number, got {}",
                self.timeout_s
            )));
        }
        if self.poll_interval_connected_ms == 0 || self.poll_interval_idle_ms == 0 {
            return Err(LinkError::InvalidConfig(
                "poll intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Per-attempt timeout, falling back to the default on invalid values.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_s)
            .unwrap_or(Duration::from_millis(500))
    }

    pub fn poll_interval(&self, connected: bool) -> Duration {
        if connected {
            Duration::from_millis(self.poll_interval_connected_ms)
        } else {
            Duration::from_millis(self.poll_interval_idle_ms)
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| value == "1")
}
