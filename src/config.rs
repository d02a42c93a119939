//! Bridge configuration.
//!
//! Loaded once at startup from an optional TOML file, then overridden by CLI
//! flags. Immutable after [`crate::bridge::Bridge`] is built.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::backoff::BackoffScheduler;
use crate::error::{BridgeError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONTROL_KEY: &str = "ROS_COMMAND";
pub const DEFAULT_STATS_KEY: &str = "ROS_STATS";
/// Capacity of the outbound `{basename}_updates` queue.
pub const DEFAULT_UPDATES_CAPACITY: usize = 40;

/// Runtime configuration for the bridge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Basic-auth user. No `Authorization` header is sent when empty.
    pub username: String,
    pub password: String,
    /// Group whose members are long-polled.
    pub group_name: String,
    /// Prefix for the bus topics (`{basename}_command`, `_set`, `_updates`).
    pub basename: String,
    /// Reserved item key carrying bridge-control commands.
    pub control_key: String,
    /// Item that receives the stats heartbeat line.
    pub stats_key: String,
    pub stats_interval_secs: u64,
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub connect_timeout_secs: u64,
    /// Timeout for command/status writes.
    pub request_timeout_secs: u64,
    /// Timeout for the long poll. `None` waits as long as the server holds
    /// the connection.
    pub poll_timeout_secs: Option<u64>,
    pub updates_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_HOST.to_string(),
            server_port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            group_name: "All".to_string(),
            basename: "openhab".to_string(),
            control_key: DEFAULT_CONTROL_KEY.to_string(),
            stats_key: DEFAULT_STATS_KEY.to_string(),
            stats_interval_secs: 60,
            initial_delay_secs: 0.125,
            max_delay_secs: 257.0,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            poll_timeout_secs: None,
            updates_capacity: DEFAULT_UPDATES_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: BridgeConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a TOML config file without validating it.
    ///
    /// CLI flags may still override fields, so callers run
    /// [`validate`](Self::validate) once the final values are known.
    /// [`crate::bridge::BridgeBuilder::build`] validates as well.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&text)?)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server_host.trim().is_empty() {
            return Err(BridgeError::Config("server_host must not be empty".into()));
        }
        if self.server_port == 0 {
            return Err(BridgeError::Config("server_port must be non-zero".into()));
        }
        if self.group_name.trim().is_empty() {
            return Err(BridgeError::Config("group_name must not be empty".into()));
        }
        if self.basename.trim().is_empty() {
            return Err(BridgeError::Config("basename must not be empty".into()));
        }
        let initial = delay_secs("initial_delay_secs", self.initial_delay_secs)?;
        if initial.is_zero() {
            return Err(BridgeError::Config("initial_delay_secs must be > 0".into()));
        }
        let max = delay_secs("max_delay_secs", self.max_delay_secs)?;
        if max < initial {
            return Err(BridgeError::Config(
                "max_delay_secs must be >= initial_delay_secs".into(),
            ));
        }
        if self.updates_capacity == 0 {
            return Err(BridgeError::Config("updates_capacity must be > 0".into()));
        }
        Ok(())
    }

    /// `http://{host}:{port}`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }

    /// Falls back to [`BackoffScheduler::DEFAULT_INITIAL`] for a value `validate` rejects.
    pub fn initial_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.initial_delay_secs)
            .unwrap_or(BackoffScheduler::DEFAULT_INITIAL)
    }

    /// Falls back to [`BackoffScheduler::DEFAULT_MAX`] for a value `validate` rejects.
    pub fn max_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay_secs)
            .unwrap_or(BackoffScheduler::DEFAULT_MAX)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }
}

// Negative, NaN, infinite and out-of-range values are all config errors.
fn delay_secs(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| BridgeError::Config(format!("{field} = {secs} is not a usable delay: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
