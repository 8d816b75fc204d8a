//! Configuration for the editor agent.

use crate::core::risk::{FeatureWeights, DEFAULT_CONSECUTIVE_WINDOWS, DEFAULT_SCORE_THRESHOLD};
use crate::core::{DEFAULT_BASELINE_WINDOWS, DEFAULT_IDLE_MS};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "synheart-editor-agent";

/// Longest accepted timer period (one day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Main configuration for the editor agent.
///
/// Every field has a default, so a partial (or empty) file is valid. Keys may
/// be written in snake_case or camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Duration of each feature window
    #[serde(with = "duration_serde", alias = "windowSeconds", alias = "windowDuration")]
    pub window_duration: Duration,

    /// Windows absorbed into the baseline before scoring starts
    #[serde(alias = "baselineWindows")]
    pub baseline_windows: usize,

    /// Score at or above which a window counts as elevated
    #[serde(alias = "scoreThreshold")]
    pub score_threshold: f64,

    /// Elevated windows in a row needed to fire
    #[serde(alias = "consecutiveWindows")]
    pub consecutive_windows: u32,

    /// Quiet time after which the user is considered idle
    #[serde(alias = "idleMs")]
    pub idle_ms: u64,

    /// Cadence of the idle check (in seconds)
    #[serde(alias = "idleCheckIntervalSecs")]
    pub idle_check_interval_secs: u64,

    /// Per-feature score weights
    pub weights: FeatureWeights,

    /// Whether window rows are appended to the CSV log
    #[serde(alias = "enableLogging")]
    pub enable_logging: bool,

    /// IANA time zone used to key days
    pub timezone: String,

    /// Path for exports and the CSV log
    #[serde(alias = "exportPath")]
    pub export_path: PathBuf,

    /// Path for day records, the baseline and transparency stats
    #[serde(alias = "dataPath")]
    pub data_path: PathBuf,

    /// Whether collection is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            window_duration: Duration::from_secs(60),
            baseline_windows: DEFAULT_BASELINE_WINDOWS,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            consecutive_windows: DEFAULT_CONSECUTIVE_WINDOWS,
            idle_ms: DEFAULT_IDLE_MS,
            idle_check_interval_secs: 5,
            weights: FeatureWeights::default(),
            enable_logging: true,
            timezone: "UTC".to_string(),
            export_path: data_dir.join("exports"),
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

    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Parse)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(self.days_path())?;
        Ok(())
    }

    /// The configured time zone, or UTC when the name is not recognized.
    pub fn tz(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone = %self.timezone, "Unknown time zone, using UTC");
                Tz::UTC
            }
        }
    }

    /// Window length, capped at [`MAX_INTERVAL_SECS`].
    pub fn window_chrono(&self) -> chrono::Duration {
        let secs = self.window_duration.as_secs().clamp(1, MAX_INTERVAL_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    /// Idle check cadence, between one second and [`MAX_INTERVAL_SECS`].
    pub fn idle_check_interval(&self) -> chrono::Duration {
        let secs = self.idle_check_interval_secs.clamp(1, MAX_INTERVAL_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    /// Directory of per-day JSON records.
    pub fn days_path(&self) -> PathBuf {
        self.data_path.join("days")
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.data_path.join("baseline.json")
    }

    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency_stats.json")
    }

    pub fn csv_log_path(&self) -> PathBuf {
        self.export_path.join("windows.csv")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
}

/// Serde support for Duration (whole seconds).
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
        Ok(Duration::from_secs(secs.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FeatureKey;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window_duration, Duration::from_secs(60));
        assert_eq!(config.baseline_windows, 10);
        assert_eq!(config.score_threshold, 3.0);
        assert_eq!(config.consecutive_windows, 2);
        assert_eq!(config.idle_ms, 60_000);
        assert!(config.enable_logging);
        assert!(!config.paused);
        assert_eq!(config.tz(), Tz::UTC);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_json(
            r#"{
                "windowSeconds": 30,
                "baselineWindows": 4,
                "weights": { "pauseRatio": 0.5 },
                "timezone": "Europe/Berlin"
            }"#,
        )
        .unwrap();

        assert_eq!(config.window_duration, Duration::from_secs(30));
        assert_eq!(config.baseline_windows, 4);
        assert_eq!(config.consecutive_windows, 2);
        assert_eq!(config.weights.get(FeatureKey::PauseRatio), 0.5);
        assert_eq!(config.weights.get(FeatureKey::KeysPerMin), 1.0);
        assert_eq!(config.tz(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let config = Config {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Config::default()
        };
        assert_eq!(config.tz(), Tz::UTC);
    }

    #[test]
    fn test_oversized_intervals_are_capped() {
        let config = Config {
            window_duration: Duration::from_secs(u64::MAX),
            idle_check_interval_secs: u64::MAX,
            ..Config::default()
        };
        assert_eq!(config.window_chrono(), chrono::Duration::seconds(86_400));
        assert_eq!(config.idle_check_interval(), chrono::Duration::seconds(86_400));

        let zero = Config {
            idle_check_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(zero.idle_check_interval(), chrono::Duration::seconds(1));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("editor-config-{}", uuid::Uuid::new_v4()))
            .join("config.json");

        let config = Config {
            score_threshold: 2.5,
            paused: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        assert!(Config::from_json("{ not json").is_err());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
