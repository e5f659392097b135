use crate::error::{PipelineError, Result};
use crate::structs::TempThresholds;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "weather.json";
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";
pub const API_KEY_PLACEHOLDER: &str = "your_api_key_here";

/// Application settings, read from a JSON file. Every field has a default so a
/// partial (or absent) file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Provider unit system; "metric" yields Celsius and m/s
    pub units: String,
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub cities_file: PathBuf,
    pub data_file: PathBuf,
    pub report_file: PathBuf,
    pub thresholds: TempThresholds,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            timeout_secs: 10,
            units: "metric".to_string(),
            request_delay_ms: 100,
            max_retries: 3,
            cities_file: PathBuf::from("cities.txt"),
            data_file: PathBuf::from("weather_data.csv"),
            report_file: PathBuf::from("weather_report.txt"),
            thresholds: TempThresholds::default(),
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// The configured key, unless it is blank or still the setup placeholder.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() && key != API_KEY_PLACEHOLDER => Ok(key),
            _ => Err(PipelineError::MissingApiKey),
        }
    }
}

/// Loads the config file, falling back to defaults when it does not exist.
///
/// `OPENWEATHER_API_KEY` in the environment takes precedence over the file's key.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = if path.exists() {
        debug!("Reading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        serde_json::from_str::<AppConfig>(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?
    } else {
        debug!("No config at {}, using defaults", path.display());
        AppConfig::default()
    };

    if let Ok(key) = std::env::var(API_KEY_ENV)
        && !key.trim().is_empty()
    {
        config.api_key = Some(key);
    }

    config.thresholds.validate()?;
    Ok(config)
}

/// Writes a config file with every default spelled out and a placeholder key.
pub fn write_default_config(path: &Path) -> Result<()> {
    let config = AppConfig {
        api_key: Some(API_KEY_PLACEHOLDER.to_string()),
        ..AppConfig::default()
    };
    let content = serde_json::to_string_pretty(&config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "timeout_secs": 3, "thresholds": { "very_hot": 40 } }"#)
                .unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.thresholds.very_hot, 40.0);
        assert_eq!(config.thresholds.hot, 30.0);
        assert_eq!(config.units, "metric");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn placeholder_key_counts_as_missing() {
        let mut config = AppConfig::default();
        assert!(matches!(config.require_api_key(), Err(PipelineError::MissingApiKey)));

        config.api_key = Some(API_KEY_PLACEHOLDER.to_string());
        assert!(config.require_api_key().is_err());

        config.api_key = Some("abc123".to_string());
        assert_eq!(config.require_api_key().unwrap(), "abc123");
    }

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.json");
        write_default_config(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let config: AppConfig = serde_json::from_str(&content).unwrap();
        assert_eq!(config.api_key.as_deref(), Some(API_KEY_PLACEHOLDER));
        assert_eq!(config.thresholds, TempThresholds::default());
    }

    #[test]
    fn invalid_thresholds_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.json");
        fs::write(&path, r#"{ "thresholds": { "cool": 50 } }"#).unwrap();
        assert!(matches!(load_config(&path), Err(PipelineError::Config(_))));
    }
}
