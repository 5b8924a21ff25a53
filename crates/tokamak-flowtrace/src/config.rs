//! TOML-compatible configuration for the flowtrace core.
//!
//! `module_path` is the one required key. The rest
//! are ambient knobs (flush cadence, poll cadence, transport rendezvous,
//! back-pressure bound) that would otherwise be implementation constants;
//! they are named here instead of buried as magic numbers.
//!
//! ```toml
//! module_path = "./hello"
//! flush_interval_secs = 1
//! prioritisation_poll_interval_ms = 200
//! ipc_socket_path = "/tmp/tokamak-flowtrace.sock"
//! max_buffered_batches = 64
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowtraceConfig {
    /// Exact guest-reported path of the module to instrument. Empty means
    /// "inactive": no callback is acted upon and no error is raised.
    pub module_path: String,
    /// Cadence, in seconds, of the periodic `EdgeBatcher` flush.
    pub flush_interval_secs: u64,
    /// Cadence, in milliseconds, of `PrioritisationReceiver`'s inbound poll.
    pub prioritisation_poll_interval_ms: u64,
    /// Unix domain socket path used as the duplex rendezvous with the viewer.
    pub ipc_socket_path: PathBuf,
    /// Bound on buffered-but-unsent edge batches before the oldest is dropped.
    pub max_buffered_batches: usize,
}

impl Default for FlowtraceConfig {
    fn default() -> Self {
        Self {
            module_path: String::new(),
            flush_interval_secs: 1,
            prioritisation_poll_interval_ms: 200,
            ipc_socket_path: PathBuf::from("/tmp/tokamak-flowtrace.sock"),
            max_buffered_batches: 64,
        }
    }
}

impl FlowtraceConfig {
    /// Parse from a TOML document's contents, rejecting an invalid config
    /// rather than silently loading one.
    pub fn from_toml_str(contents: &str) -> Result<Self, crate::error::FlowtraceError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| crate::error::FlowtraceError::Config(e.to_string()))?;
        config
            .validate()
            .map_err(crate::error::FlowtraceError::Config)?;
        Ok(config)
    }

    /// Load and validate a config from a TOML file on disk.
    pub fn from_toml_file(path: &Path) -> Result<Self, crate::error::FlowtraceError> {
        let contents = std::fs::read_to_string(path).map_err(crate::error::FlowtraceError::Io)?;
        Self::from_toml_str(&contents)
    }

    /// Whether the core should act on any host callbacks at all.
    ///
    /// An absent or empty `module_path` is not an initialization
    /// error — it leaves the plugin permanently inactive.
    pub fn is_active(&self) -> bool {
        !self.module_path.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.is_active() {
            return Ok(());
        }
        if self.flush_interval_secs == 0 {
            return Err("flush_interval_secs must be > 0".to_string());
        }
        if self.prioritisation_poll_interval_ms == 0 {
            return Err("prioritisation_poll_interval_ms must be > 0".to_string());
        }
        if self.max_buffered_batches == 0 {
            return Err("max_buffered_batches must be > 0".to_string());
        }
        Ok(())
    }
}
