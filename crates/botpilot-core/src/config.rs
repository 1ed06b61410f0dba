//! Configuration file loading.
//!
//! `~/.botpilot/config.toml` by default; every field has a default so a
//! missing file or a partial file is fine.
//!
//! ```toml
//! [scheduler]
//! stop_timeout_secs = 10
//! interrupt_interval_ms = 1000
//! default_task_timeout_mins = 10
//! max_output_chars = 500
//!
//! [logging]
//! filter = "botpilot=debug,warn"
//! format = "compact"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::{LogConfig, LogFormat};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

/// Task manager tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long a task gets to pause before the process is killed.
    pub stop_timeout_secs: u64,
    /// How often the bot interrupt is re-issued while waiting for a pause.
    pub interrupt_interval_ms: u64,
    /// Wall-clock limit for tasks that don't set their own; 0 disables it.
    pub default_task_timeout_mins: u64,
    /// Captured output longer than this is shortened in task outcomes.
    pub max_output_chars: usize,
    /// Buffer size of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 10,
            interrupt_interval_ms: 1000,
            default_task_timeout_mins: 10,
            max_output_chars: 500,
            event_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stop_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.stop_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.interrupt_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.interrupt_interval_ms must be greater than zero".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.event_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Never zero, even for a config that skipped validation.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs.max(1))
    }

    /// Never zero, even for a config that skipped validation.
    pub fn interrupt_interval(&self) -> Duration {
        Duration::from_millis(self.interrupt_interval_ms.max(1))
    }

    pub fn default_task_timeout(&self) -> Option<Duration> {
        (self.default_task_timeout_mins > 0).then(|| minutes(self.default_task_timeout_mins))
    }
}

/// `mins` minutes, saturating instead of overflowing.
pub fn minutes(mins: u64) -> Duration {
    Duration::from_secs(mins.saturating_mul(60))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter directive (e.g., "debug", "botpilot=debug,warn")
    pub filter: Option<String>,
    pub format: Option<LogFormat>,
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".botpilot").join("config.toml")
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = path.unwrap_or_else(Self::default_path);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&config_path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()
    }

    /// Logging settings, with the environment taking precedence over the file.
    pub fn log_config(&self) -> LogConfig {
        LogConfig::layered(self.logging.filter.as_deref(), self.logging.format)
    }
}
