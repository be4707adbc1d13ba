//! Configuration loading and typed config structures for the tally store.
//!
//! The canonical configuration lives in `tally-config.yaml` next to the
//! engine binary's working directory. Every field has a default, so an
//! empty or missing file yields a working setup.

use std::path::Path;
use std::time::Duration;

use chrono::{FixedOffset, TimeDelta};
use serde::Deserialize;
use tally_ledger::PointRules;

/// Environment variable overriding `storage.data_dir`.
pub const DATA_DIR_ENV: &str = "TALLY_DATA_DIR";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `tally-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TallyConfig {
    /// Where documents are stored.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Point rules.
    #[serde(default)]
    pub points: PointsConfig,

    /// Cache lifetimes.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Autosave cadence.
    #[serde(default)]
    pub autosave: AutosaveConfig,

    /// Scheduled broadcast gates.
    #[serde(default)]
    pub gates: GatesConfig,

    /// Calendar settings for "today".
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TallyConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `TALLY_DATA_DIR` overrides `storage.data_dir` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.storage.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calendar.offset()?;
        for gate in &self.gates.schedules {
            if gate.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: "gate name must not be empty".to_owned(),
                });
            }
            if gate.interval_days == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("gate {} must have interval_days >= 1", gate.name),
                });
            }
        }
        Ok(())
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `global.json` and `users.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl StorageConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = dir;
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Point rule settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PointsConfig {
    /// Points per ten messages.
    #[serde(default = "default_per_ten_messages")]
    pub per_ten_messages: u64,

    /// Points per command.
    #[serde(default = "default_command_bonus")]
    pub command_bonus: u64,
}

impl PointsConfig {
    /// Convert into the ledger's rule set.
    pub const fn rules(&self) -> PointRules {
        PointRules {
            per_ten_messages: self.per_ten_messages,
            command_bonus: self.command_bonus,
        }
    }
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            per_ten_messages: default_per_ten_messages(),
            command_bonus: default_command_bonus(),
        }
    }
}

/// Cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Seconds a computed ranking stays valid.
    #[serde(default = "default_ranking_ttl_secs")]
    pub ranking_ttl_secs: u32,

    /// Seconds each active-user count stays valid.
    #[serde(default = "default_active_count_ttl_secs")]
    pub active_count_ttl_secs: u32,
}

impl CacheConfig {
    /// Ranking TTL as a time delta.
    pub fn ranking_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.ranking_ttl_secs))
    }

    /// Active-count TTL as a time delta.
    pub fn active_count_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.active_count_ttl_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ranking_ttl_secs: default_ranking_ttl_secs(),
            active_count_ttl_secs: default_active_count_ttl_secs(),
        }
    }
}

/// Autosave cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AutosaveConfig {
    /// Seconds between flush attempts.
    #[serde(default = "default_autosave_interval_secs")]
    pub interval_secs: u64,
}

impl AutosaveConfig {
    /// Flush period, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_autosave_interval_secs(),
        }
    }
}

/// Scheduled broadcast gates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatesConfig {
    /// Seconds between gate polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Retry behavior after a failed broadcast.
    #[serde(default)]
    pub retry: RetryConfig,

    /// The gates themselves.
    #[serde(default)]
    pub schedules: Vec<GateConfig>,
}

impl GatesConfig {
    /// Poll period, never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            retry: RetryConfig::default(),
            schedules: Vec::new(),
        }
    }
}

/// One named recurring broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GateConfig {
    /// Unique gate name; also the key of its persisted timestamp.
    pub name: String,

    /// Whole days between firings.
    #[serde(default = "default_interval_days")]
    pub interval_days: u32,

    /// Target channel handed to the broadcaster.
    pub channel: String,

    /// Text handed to the broadcaster.
    pub message: String,
}

/// Backoff settings for failed broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Delay after the first failure, in seconds. Doubles per failure.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u32,

    /// Upper bound on the delay, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u32,

    /// Consecutive failures after which an alert is raised.
    #[serde(default = "default_alert_after_failures")]
    pub alert_after_failures: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            alert_after_failures: default_alert_after_failures(),
        }
    }
}

/// Calendar settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CalendarConfig {
    /// Offset from UTC, in minutes, used to decide what "today" means.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl CalendarConfig {
    /// The configured offset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the offset is not within one day
    /// of UTC.
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::Invalid {
                reason: format!(
                    "utc_offset_minutes {} is out of range",
                    self.utc_offset_minutes
                ),
            })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// =============================================================================
// Defaults
// =============================================================================

fn default_data_dir() -> String {
    "data".to_owned()
}

const fn default_per_ten_messages() -> u64 {
    1
}

const fn default_command_bonus() -> u64 {
    2
}

const fn default_ranking_ttl_secs() -> u32 {
    60
}

const fn default_active_count_ttl_secs() -> u32 {
    300
}

const fn default_autosave_interval_secs() -> u64 {
    30
}

const fn default_poll_interval_secs() -> u64 {
    60
}

const fn default_interval_days() -> u32 {
    7
}

const fn default_base_backoff_secs() -> u32 {
    30
}

const fn default_max_backoff_secs() -> u32 {
    3600
}

const fn default_alert_after_failures() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TallyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.points.rules(), PointRules::default());
        assert_eq!(config.autosave.interval(), Duration::from_secs(30));
        assert!(config.gates.schedules.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
storage:
  data_dir: "/var/lib/tally"

points:
  per_ten_messages: 3
  command_bonus: 5

cache:
  ranking_ttl_secs: 10
  active_count_ttl_secs: 20

autosave:
  interval_secs: 15

gates:
  poll_interval_secs: 30
  retry:
    base_backoff_secs: 5
    max_backoff_secs: 600
    alert_after_failures: 3
  schedules:
    - name: weekly_digest
      interval_days: 7
      channel: "@haybot_news"
      message: "Weekly leaderboard is out"

calendar:
  utc_offset_minutes: 240

logging:
  level: "debug"
  json: true
"#;

        let config = TallyConfig::parse(yaml).unwrap();
        assert_eq!(config.points.per_ten_messages, 3);
        assert_eq!(config.points.command_bonus, 5);
        assert_eq!(config.cache.ranking_ttl(), TimeDelta::seconds(10));
        assert_eq!(config.autosave.interval_secs, 15);
        assert_eq!(config.gates.retry.alert_after_failures, 3);
        assert_eq!(config.gates.schedules.len(), 1);
        assert_eq!(config.gates.schedules[0].channel, "@haybot_news");
        assert_eq!(
            config.calendar.offset().unwrap(),
            FixedOffset::east_opt(4 * 3600).unwrap()
        );
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = TallyConfig::parse("points:\n  command_bonus: 9\n").unwrap();
        assert_eq!(config.points.command_bonus, 9);
        assert_eq!(config.points.per_ten_messages, 1);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(TallyConfig::parse("").is_ok());
    }

    #[test]
    fn zero_interval_gate_is_rejected() {
        let yaml = r#"
gates:
  schedules:
    - name: broken
      interval_days: 0
      channel: "c"
      message: "m"
"#;
        assert!(matches!(
            TallyConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let calendar = CalendarConfig {
            utc_offset_minutes: 24 * 60,
        };
        assert!(calendar.offset().is_err());
    }

    #[test]
    fn zero_autosave_interval_is_clamped() {
        let autosave = AutosaveConfig { interval_secs: 0 };
        assert_eq!(autosave.interval(), Duration::from_secs(1));
    }
}
