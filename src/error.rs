use arrow_schema::ArrowError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet Error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow Error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("City '{0}' not found")]
    CityNotFound(String),
    #[error("Unexpected status {status} for {city}")]
    Status { city: String, status: u16 },
    #[error("Record {row}: missing field `{field}`")]
    MissingField { row: usize, field: &'static str },
    #[error("Record {row}: malformed value `{value}` for field `{field}`")]
    MalformedValue {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("API key is not set (config file or OPENWEATHER_API_KEY)")]
    MissingApiKey,
    #[error("No cities found in {0}")]
    NoCities(String),
    #[error("No weather data to process")]
    NoData,
    #[error("Config Error: {0}")]
    Config(String),
    #[error("Data Error: {0}")]
    Data(String),
}

impl PipelineError {
    /// Whether a fetch that failed with this error is worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Http(_) => true,
            PipelineError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> PipelineError {
        PipelineError::Status {
            city: "Lima".to_string(),
            status,
        }
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(404).is_transient());
        assert!(!PipelineError::CityNotFound("Atlantis".to_string()).is_transient());
    }
}
