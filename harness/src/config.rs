//! Harness configuration: kernel commands and collection defaults.
//!
//! Loaded from a JSON file. Every field is optional; `None` resolves to the
//! matching `DEFAULT_*` constant.
//!
//! ```json
//! {
//!   "kernels": { "xeus-stata": { "program": "/usr/local/bin/xstata", "args": ["-f"] } },
//!   "ready_timeout_ms": 10000,
//!   "idle_threshold": 2,
//!   "ignored_message_types": ["execute_input"]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::collect::{
    CollectPolicy, DEFAULT_IDLE_THRESHOLD, DEFAULT_OVERALL_TIMEOUT, DEFAULT_PER_MESSAGE_TIMEOUT,
};
use crate::logging::DEFAULT_LOG_FILTER;
use crate::stdio::{KernelCommand, StdioLauncher, DEFAULT_SHUTDOWN_GRACE};

/// Default bound on the readiness handshake.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a harness run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Kernel identifier → launch command.
    #[serde(default)]
    pub kernels: BTreeMap<String, KernelCommand>,
    /// `None` uses `DEFAULT_READY_TIMEOUT`.
    pub ready_timeout_ms: Option<u64>,
    /// `None` uses `DEFAULT_OVERALL_TIMEOUT`.
    pub overall_timeout_ms: Option<u64>,
    /// `None` uses `DEFAULT_PER_MESSAGE_TIMEOUT`.
    pub per_message_timeout_ms: Option<u64>,
    /// `None` uses `DEFAULT_IDLE_THRESHOLD`.
    pub idle_threshold: Option<u32>,
    /// `None` uses `DEFAULT_SHUTDOWN_GRACE`.
    pub shutdown_grace_ms: Option<u64>,
    /// Message types the collection loop skips (and records).
    #[serde(default)]
    pub ignored_message_types: Vec<String>,
    /// Tracing filter used when `RUST_LOG` is unset. `None` uses
    /// `DEFAULT_LOG_FILTER`.
    pub log_filter: Option<String>,
}

/// Error loading a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {detail}")]
    Io { path: String, detail: String },
    #[error("invalid config: {detail}")]
    Parse { detail: String },
}

impl HarnessConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Parse from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON or unknown fields.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            detail: e.to_string(),
        })
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout_ms
            .map_or(DEFAULT_READY_TIMEOUT, Duration::from_millis)
    }

    /// Collection policy built from the configured defaults.
    #[must_use]
    pub fn collect_policy(&self) -> CollectPolicy {
        CollectPolicy {
            overall_timeout: self
                .overall_timeout_ms
                .map_or(DEFAULT_OVERALL_TIMEOUT, Duration::from_millis),
            per_message_timeout: self
                .per_message_timeout_ms
                .map_or(DEFAULT_PER_MESSAGE_TIMEOUT, Duration::from_millis),
            idle_threshold: self.idle_threshold.unwrap_or(DEFAULT_IDLE_THRESHOLD),
            correlate_parent: false,
            ignored_message_types: self.ignored_message_types.clone(),
        }
    }

    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Stdio launcher for the configured kernels.
    #[must_use]
    pub fn launcher(&self) -> StdioLauncher {
        StdioLauncher::from_commands(
            self.kernels.clone(),
            self.shutdown_grace_ms
                .map_or(DEFAULT_SHUTDOWN_GRACE, Duration::from_millis),
        )
    }
}
