//! Configuration for the Learning Coach Agent.

use crate::core::aggregate::MAX_HEATMAP_DAYS;
use crate::core::gate::ConfusedRouting;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the directory used under the platform config/data dirs.
pub const APP_DIR_NAME: &str = "learning-coach-agent";

/// Main configuration for the coach agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Period of the sampling loop
    #[serde(with = "duration_serde")]
    pub sampling_interval: Duration,

    /// Minimum time between two interventions
    #[serde(with = "duration_serde")]
    pub intervention_cooldown: Duration,

    /// Width of the charting buckets
    #[serde(with = "duration_serde")]
    pub bucket_width: Duration,

    /// Number of days covered by the activity heatmap
    pub heatmap_window_days: u32,

    /// IANA time zone used for calendar-day grouping
    pub timezone: String,

    /// Emotion classifier endpoint
    pub classifier: ClassifierSettings,

    /// Which prompt a "Confused" learning state raises
    pub confused_routing: ConfusedRouting,

    /// Raise a rest prompt when the classifier reports the user asleep
    pub sleep_detection: bool,

    /// Path for storing the observation log and pipeline stats
    pub data_path: PathBuf,

    /// Whether capture is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);

        Self {
            sampling_interval: Duration::from_secs(1),
            intervention_cooldown: Duration::from_secs(120),
            bucket_width: Duration::from_secs(300), // 5 minutes
            heatmap_window_days: 180,
            timezone: "UTC".to_string(),
            classifier: ClassifierSettings::default(),
            confused_routing: ConfusedRouting::default(),
            sleep_detection: false,
            data_path: data_dir,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// The fixed time zone for day boundaries.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidValue(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Check values that would otherwise break the pipeline at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sampling_interval must be at least 1 second".to_string(),
            ));
        }
        if self.bucket_width.is_zero() {
            return Err(ConfigError::InvalidValue(
                "bucket_width must be at least 1 second".to_string(),
            ));
        }
        if self.heatmap_window_days == 0 || self.heatmap_window_days > MAX_HEATMAP_DAYS {
            return Err(ConfigError::InvalidValue(format!(
                "heatmap_window_days must be between 1 and {MAX_HEATMAP_DAYS}"
            )));
        }
        self.tz()?;
        Ok(())
    }
}

/// Where and how to reach the emotion classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Full URL of the analyze endpoint
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/analyze".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling_interval, Duration::from_secs(1));
        assert_eq!(config.intervention_cooldown, Duration::from_secs(120));
        assert_eq!(config.bucket_width, Duration::from_secs(300));
        assert_eq!(config.heatmap_window_days, 180);
        assert_eq!(config.confused_routing, ConfusedRouting::Sleep);
        assert!(!config.sleep_detection);
        assert!(!config.paused);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"timezone": "Asia/Kolkata", "paused": true}"#).unwrap();
        assert!(config.paused);
        assert_eq!(config.tz().unwrap(), chrono_tz::Asia::Kolkata);
        assert_eq!(config.heatmap_window_days, 180);
        assert_eq!(config.classifier.timeout_secs, 10);
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let config = Config {
            timezone: "Mars/Olympus".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_heatmap_window_bounds() {
        let too_long = Config {
            heatmap_window_days: MAX_HEATMAP_DAYS + 1,
            ..Config::default()
        };
        assert!(matches!(too_long.validate(), Err(ConfigError::InvalidValue(_))));

        let longest = Config {
            heatmap_window_days: MAX_HEATMAP_DAYS,
            ..Config::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            paused: true,
            confused_routing: ConfusedRouting::Quiz,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.paused);
        assert_eq!(loaded.confused_routing, ConfusedRouting::Quiz);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.sampling_interval, Duration::from_secs(1));
    }
}
