use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::structs::WeatherRecord;
use crate::transform::round1;
use chrono::Local;
use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::thread;
use std::time::Duration;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Anything that can produce one city's current weather.
pub trait WeatherSource {
    fn fetch_city(&self, city: &str) -> Result<WeatherRecord>;
}

/// Doubling stops after this many retries so the wait cannot overflow.
const MAX_BACKOFF_DOUBLINGS: u32 = 6;

/// Pacing and retry rules for a batch fetch.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Pause between consecutive cities, and the base wait before a retry
    pub delay: Duration,
    /// Extra attempts after a transient failure
    pub max_retries: u32,
}

impl FetchPolicy {
    /// Wait before retry number `attempt` (1-based): `delay`, then twice that,
    /// then four times, and so on.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
        self.delay.saturating_mul(1 << doublings)
    }
}

impl From<&AppConfig> for FetchPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            delay: config.request_delay(),
            max_retries: config.max_retries,
        }
    }
}

/// Current-weather client for the OpenWeatherMap HTTP API.
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
    units: String,
}

impl OpenWeatherClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let client = Client::builder()
            .user_agent(concat!("weathervane/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            units: config.units.clone(),
        })
    }
}

impl WeatherSource for OpenWeatherClient {
    fn fetch_city(&self, city: &str) -> Result<WeatherRecord> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
            ])
            .send()?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text()?;
                parse_response(city, &body)
            }
            StatusCode::NOT_FOUND => Err(PipelineError::CityNotFound(city.to_string())),
            status => Err(PipelineError::Status {
                city: city.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    main: ApiMain,
    #[serde(default)]
    weather: Vec<ApiCondition>,
    wind: ApiWind,
    #[serde(default)]
    sys: ApiSys,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ApiWind {
    speed: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSys {
    #[serde(default)]
    country: String,
}

/// Turns a provider response body into a record for `city`.
///
/// Temperature and wind are rounded to one decimal, the description is title-cased
/// and the record is stamped with the local time of parsing.
pub fn parse_response(city: &str, body: &str) -> Result<WeatherRecord> {
    let response: ApiResponse = serde_json::from_str(body)?;
    let condition = response
        .weather
        .first()
        .ok_or(PipelineError::MissingField {
            row: 0,
            field: "weather",
        })?;

    Ok(WeatherRecord {
        city: city.to_string(),
        temperature: round1(response.main.temp),
        humidity: response.main.humidity,
        description: title_case(&condition.description),
        wind_speed: round1(response.wind.speed),
        country: response.sys.country,
        timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
    })
}

/// Upper-cases the first letter of every word and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = true;
        }
    }
    out
}

/// Fetches every city in order, one request at a time.
///
/// Cities that cannot be resolved are logged and left out, so the result only
/// holds clean records. Transient failures are retried up to `policy.max_retries`
/// times with a growing pause (see [`FetchPolicy::backoff`]). Unknown cities are
/// never retried.
pub fn fetch_all<S: WeatherSource>(
    source: &S,
    cities: &[String],
    policy: &FetchPolicy,
) -> Vec<WeatherRecord> {
    let total = cities.len();
    info!("Fetching weather data for {} cities...", total);

    let mut records = Vec::with_capacity(total);
    for (i, city) in cities.iter().enumerate() {
        let city = city.trim();
        if city.is_empty() {
            continue;
        }
        info!("Processing {}/{}: {}", i + 1, total, city);

        match fetch_with_retry(source, city, policy) {
            Ok(record) => records.push(record),
            Err(PipelineError::CityNotFound(name)) => warn!("City '{}' not found.", name),
            Err(e) => warn!("Skipping {}: {}", city, e),
        }

        if i + 1 < total && !policy.delay.is_zero() {
            thread::sleep(policy.delay);
        }
    }

    info!("Successfully fetched data for {} cities.", records.len());
    records
}

fn fetch_with_retry<S: WeatherSource>(
    source: &S,
    city: &str,
    policy: &FetchPolicy,
) -> Result<WeatherRecord> {
    let mut attempt = 0;
    loop {
        match source.fetch_city(city) {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let wait = policy.backoff(attempt);
                debug!(
                    "Retry {}/{} for {} in {:?}: {}",
                    attempt, policy.max_retries, city, wait, e
                );
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
            }
            result => return result,
        }
    }
}
