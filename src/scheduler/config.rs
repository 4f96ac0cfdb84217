use crate::error::SchedulerError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name reported in events and logs.
    pub name: String,
    /// Ticks of the driving loop per second.
    pub updates_per_second: u32,
    /// Ring buffer size of the event bus.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "scheduler".to_string(),
            updates_per_second: 60,
            event_capacity: 1024,
        }
    }
}

impl SchedulerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_updates_per_second(mut self, updates_per_second: u32) -> Self {
        self.updates_per_second = updates_per_second;
        self
    }

    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.updates_per_second == 0 {
            return Err(SchedulerError::InvalidConfig(
                "updates_per_second must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(SchedulerError::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Time between two ticks, never below one millisecond.
    pub fn tick_period(&self) -> Duration {
        let per_second = self.updates_per_second.max(1);
        (Duration::from_secs(1) / per_second).max(Duration::from_millis(1))
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SchedulerConfig =
            toml::from_str(content).context("Failed to parse scheduler configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize scheduler configuration")
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write configuration file {}", path.display()))
    }
}
