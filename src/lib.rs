pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod report;
pub mod structs;
pub mod transform;

// Re-export public API
pub use config::{AppConfig, load_config, write_default_config};
pub use error::{PipelineError, Result};
pub use extract::{FetchPolicy, OpenWeatherClient, WeatherSource, fetch_all, parse_response};
pub use load::{load_records, read_cities_file, save_records};
pub use report::{render_report, save_report};
pub use structs::{
    AnalysisResult, DataFormat, MetricStats, SimpleLogger, TempThresholds, TemperatureRange,
    WeatherCategory, WeatherRecord,
};
pub use transform::{
    categorize_weather, comprehensive_analysis, humidity_stats, temperature_ranges,
    temperature_stats, weather_distribution, wind_stats,
};
