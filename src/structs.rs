use crate::error::{PipelineError, Result};
use log::{Log, Metadata, Record as LogRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Simple logger implementation
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &LogRecord) {
        println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// One city's weather snapshot as fetched from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, 0-100
    pub humidity: u32,
    pub description: String,
    /// Metres per second
    pub wind_speed: f64,
    pub country: String,
    pub timestamp: String,
}

/// Lower bounds of the temperature buckets, in degrees Celsius.
///
/// A temperature belongs to the first bucket whose bound it strictly exceeds,
/// checked from `very_hot` down to `cool`; anything else is cold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempThresholds {
    pub very_hot: f64,
    pub hot: f64,
    pub warm: f64,
    pub moderate: f64,
    pub cool: f64,
}

impl Default for TempThresholds {
    fn default() -> Self {
        Self {
            very_hot: 35.0,
            hot: 30.0,
            warm: 25.0,
            moderate: 15.0,
            cool: 10.0,
        }
    }
}

impl TempThresholds {
    /// Bounds paired with the bucket they open, in cascade order.
    pub fn cascade(&self) -> [(TemperatureRange, f64); 5] {
        [
            (TemperatureRange::VeryHot, self.very_hot),
            (TemperatureRange::Hot, self.hot),
            (TemperatureRange::Warm, self.warm),
            (TemperatureRange::Moderate, self.moderate),
            (TemperatureRange::Cool, self.cool),
        ]
    }

    /// Rejects non-finite bounds and bounds that are not strictly descending.
    pub fn validate(&self) -> Result<()> {
        let cascade = self.cascade();
        if let Some((range, _)) = cascade.iter().find(|(_, bound)| !bound.is_finite()) {
            return Err(PipelineError::Config(format!(
                "threshold for {} is not a finite number",
                range.as_str()
            )));
        }
        for pair in cascade.windows(2) {
            let ((upper, upper_bound), (lower, lower_bound)) = (pair[0], pair[1]);
            if upper_bound <= lower_bound {
                return Err(PipelineError::Config(format!(
                    "threshold for {} ({}) must be greater than {} ({})",
                    upper.as_str(),
                    upper_bound,
                    lower.as_str(),
                    lower_bound
                )));
            }
        }
        Ok(())
    }
}

/// On-disk formats for a record set
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DataFormat {
    Csv,
    Json,
    Parquet,
}

impl DataFormat {
    /// Guesses the format from a file extension, falling back to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => DataFormat::Json,
            Some("parquet") => DataFormat::Parquet,
            _ => DataFormat::Csv,
        }
    }
}

/// Condition categories. Declaration order is the classification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCategory {
    Clear,
    Rain,
    Clouds,
    Snow,
    Other,
}

impl WeatherCategory {
    pub const ALL: [WeatherCategory; 5] = [
        WeatherCategory::Clear,
        WeatherCategory::Rain,
        WeatherCategory::Clouds,
        WeatherCategory::Snow,
        WeatherCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCategory::Clear => "clear",
            WeatherCategory::Rain => "rain",
            WeatherCategory::Clouds => "clouds",
            WeatherCategory::Snow => "snow",
            WeatherCategory::Other => "other",
        }
    }
}

/// Temperature buckets, hottest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureRange {
    VeryHot,
    Hot,
    Warm,
    Moderate,
    Cool,
    Cold,
}

impl TemperatureRange {
    pub const ALL: [TemperatureRange; 6] = [
        TemperatureRange::VeryHot,
        TemperatureRange::Hot,
        TemperatureRange::Warm,
        TemperatureRange::Moderate,
        TemperatureRange::Cool,
        TemperatureRange::Cold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureRange::VeryHot => "very_hot",
            TemperatureRange::Hot => "hot",
            TemperatureRange::Warm => "warm",
            TemperatureRange::Moderate => "moderate",
            TemperatureRange::Cool => "cool",
            TemperatureRange::Cold => "cold",
        }
    }
}

/// Extremes, mean and median of one numeric field, with the cities that hold the extremes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats<T> {
    pub highest: T,
    pub lowest: T,
    pub average: f64,
    pub median: f64,
    pub highest_city: String,
    pub lowest_city: String,
}

/// Every aggregate view computed over one record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub temperature_stats: Option<MetricStats<f64>>,
    pub humidity_stats: Option<MetricStats<u32>>,
    pub wind_stats: Option<MetricStats<f64>>,
    pub weather_categories: BTreeMap<WeatherCategory, Vec<String>>,
    pub weather_distribution: Vec<(String, usize)>,
    pub temperature_ranges: BTreeMap<TemperatureRange, Vec<String>>,
    pub total_records: usize,
}
