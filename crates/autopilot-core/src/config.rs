use crate::error::{PipelineError, Result};
use crate::io;
use crate::paths;
use crate::policy::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ExecutionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deadline for a single action invocation.
    #[serde(default = "default_action_timeout")]
    pub action_timeout_seconds: u64,
    /// Attempts to persist a finalized log before giving up.
    #[serde(default = "default_finalize_attempts")]
    pub finalize_attempts: u32,
}

fn default_action_timeout() -> u64 {
    30
}

fn default_finalize_attempts() -> u32 {
    3
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            action_timeout_seconds: default_action_timeout(),
            finalize_attempts: default_finalize_attempts(),
        }
    }
}

impl ExecutionConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause between queued commands.
    #[serde(default = "default_queue_delay")]
    pub inter_command_delay_seconds: u64,
}

fn default_queue_delay() -> u64 {
    2
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inter_command_delay_seconds: default_queue_delay(),
        }
    }
}

impl QueueConfig {
    pub fn inter_command_delay(&self) -> Duration {
        Duration::from_secs(self.inter_command_delay_seconds)
    }
}

// ---------------------------------------------------------------------------
// HistoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Capacity of the recent-commands ring buffer.
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Retry policy applied to ad-hoc commands (automations carry their own).
    #[serde(default)]
    pub command_retry: RetryPolicy,
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PipelineError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load the config, falling back to defaults when not initialized.
    pub fn load_or_default(root: &Path) -> Self {
        Self::load(root).unwrap_or_default()
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.execution.action_timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "execution.action_timeout_seconds must be at least 1".into(),
            });
        }
        if self.execution.action_timeout_seconds > 3600 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "execution.action_timeout_seconds={} (>3600 is unusual)",
                    self.execution.action_timeout_seconds
                ),
            });
        }
        if self.execution.finalize_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "execution.finalize_attempts must be at least 1".into(),
            });
        }
        if self.queue.inter_command_delay_seconds > 600 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "queue.inter_command_delay_seconds={} (>600 is unusual)",
                    self.queue.inter_command_delay_seconds
                ),
            });
        }
        if self.history.capacity == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "history.capacity must be at least 1".into(),
            });
        }
        if let Err(e) = self.command_retry.validate() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("command_retry: {e}"),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.execution.action_timeout_seconds, 30);
        assert_eq!(parsed.queue.inter_command_delay_seconds, 2);
        assert_eq!(parsed.history.capacity, 50);
    }

    #[test]
    fn empty_file_deserializes_to_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.execution.finalize_attempts, 3);
        assert_eq!(cfg.command_retry, RetryPolicy::default());
    }

    #[test]
    fn load_without_init_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized));
        // load_or_default shrugs it off
        let cfg = Config::load_or_default(dir.path());
        assert_eq!(cfg.execution.action_timeout_seconds, 30);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.execution.action_timeout_seconds = 90;
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.execution.action_timeout_seconds, 90);
    }

    #[test]
    fn validate_flags_zero_timeout() {
        let mut cfg = Config::default();
        cfg.execution.action_timeout_seconds = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("action_timeout")));
    }

    #[test]
    fn validate_flags_bad_retry_policy() {
        let mut cfg = Config::default();
        cfg.command_retry.max_retries = 99;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("command_retry")));
    }

    #[test]
    fn validate_clean_config_is_quiet() {
        assert!(Config::default().validate().is_empty());
    }
}
