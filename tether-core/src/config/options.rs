//! Settings for [`ConfigManager`](super::ConfigManager).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How configuration files are created, rendered and polled.
///
/// Missing fields take their default when deserialized, so an options block
/// embedded in another file only needs the fields it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOptions {
    /// Period of the background poll started by `ConfigManager::spawn_polling`.
    pub poll_interval_ms: u64,

    /// Render JSON with two-space indentation.
    pub pretty: bool,

    /// Create missing files and parent directories on load.
    pub create_missing: bool,
}

impl ConfigOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse options from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            pretty: true,
            create_missing: true,
        }
    }
}
