use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Driver settings, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Time between card polls
    pub poll_interval_ms: u64,
    /// How many times to try opening a reader before giving up
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
    /// Reader name or index; the first reader when unset
    pub reader: Option<String>,
    /// Read history entries kept in memory
    pub history_limit: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            connect_attempts: 3,
            retry_delay_ms: 1000,
            reader: None,
            history_limit: 100,
        }
    }
}

impl DriverConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: DriverConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.connect_attempts == 0 {
            bail!("connect_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
