use crate::error::{PipelineError, Result};
use crate::structs::{
    AnalysisResult, MetricStats, TempThresholds, TemperatureRange, WeatherCategory, WeatherRecord,
};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Keyword sets tested against lower-cased descriptions, in priority order.
/// `Other` has no keywords and catches everything left over.
const CATEGORY_RULES: &[(WeatherCategory, &[&str])] = &[
    (WeatherCategory::Clear, &["clear", "sunny"]),
    (WeatherCategory::Rain, &["rain", "drizzle", "shower"]),
    (WeatherCategory::Clouds, &["cloud", "overcast"]),
    (WeatherCategory::Snow, &["snow", "blizzard"]),
];

/// Runs every analysis over the record set.
///
/// The numeric statistics and the groupings are independent reductions over the same
/// immutable slice, so the two halves run on the rayon pool. The result is the same as
/// calling each operation in turn.
///
/// # Arguments
///
/// * `records` - Record set to analyze; may be empty
/// * `thresholds` - Bounds used for the temperature buckets
///
/// # Returns
///
/// Returns an `AnalysisResult` with every sub-result filled in. For an empty record set
/// every statistic is `None`, every mapping is empty and `total_records` is 0.
///
/// # Errors
///
/// Returns `PipelineError::MissingField` or `PipelineError::MalformedValue` if any record
/// fails the checks of one of the individual operations.
pub fn comprehensive_analysis(
    records: &[WeatherRecord],
    thresholds: &TempThresholds,
) -> Result<AnalysisResult> {
    debug!("Analyzing {} records", records.len());

    let (stats, groups) = rayon::join(
        || -> Result<_> {
            Ok((
                temperature_stats(records)?,
                humidity_stats(records)?,
                wind_stats(records)?,
            ))
        },
        || -> Result<_> {
            Ok((
                categorize_weather(records)?,
                weather_distribution(records)?,
                temperature_ranges(records, thresholds)?,
            ))
        },
    );
    let (temperature_stats, humidity_stats, wind_stats) = stats?;
    let (weather_categories, weather_distribution, temperature_ranges) = groups?;

    Ok(AnalysisResult {
        temperature_stats,
        humidity_stats,
        wind_stats,
        weather_categories,
        weather_distribution,
        temperature_ranges,
        total_records: records.len(),
    })
}

/// Temperature extremes, mean and median. `None` for an empty record set.
pub fn temperature_stats(records: &[WeatherRecord]) -> Result<Option<MetricStats<f64>>> {
    let mut values = Vec::with_capacity(records.len());
    for (row, r) in records.iter().enumerate() {
        values.push((require_city(r, row)?, finite(r.temperature, row, "temperature")?));
    }
    Ok(metric_stats(&values))
}

/// Humidity extremes, mean and median. `None` for an empty record set.
pub fn humidity_stats(records: &[WeatherRecord]) -> Result<Option<MetricStats<u32>>> {
    let mut values = Vec::with_capacity(records.len());
    for (row, r) in records.iter().enumerate() {
        let city = require_city(r, row)?;
        if r.humidity > 100 {
            return Err(PipelineError::MalformedValue {
                row,
                field: "humidity",
                value: r.humidity.to_string(),
            });
        }
        values.push((city, r.humidity));
    }
    Ok(metric_stats(&values))
}

/// Wind speed extremes, mean and median. `None` for an empty record set.
pub fn wind_stats(records: &[WeatherRecord]) -> Result<Option<MetricStats<f64>>> {
    let mut values = Vec::with_capacity(records.len());
    for (row, r) in records.iter().enumerate() {
        let city = require_city(r, row)?;
        let speed = finite(r.wind_speed, row, "wind_speed")?;
        if speed < 0.0 {
            return Err(PipelineError::MalformedValue {
                row,
                field: "wind_speed",
                value: speed.to_string(),
            });
        }
        values.push((city, speed));
    }
    Ok(metric_stats(&values))
}

/// Groups cities by the first category whose keywords appear in their description.
///
/// Matching is a case-insensitive substring test over `CATEGORY_RULES` in order, so
/// "Cloudy With Rain" lands in `Rain`. Every category is present for non-empty input,
/// and cities keep their input order inside each list.
pub fn categorize_weather(
    records: &[WeatherRecord],
) -> Result<BTreeMap<WeatherCategory, Vec<String>>> {
    let mut categories = BTreeMap::new();
    if records.is_empty() {
        return Ok(categories);
    }
    for category in WeatherCategory::ALL {
        categories.insert(category, Vec::new());
    }

    for (row, record) in records.iter().enumerate() {
        let city = require_city(record, row)?;
        let description = require_description(record, row)?;
        categories
            .entry(classify_description(description))
            .or_default()
            .push(city.to_string());
    }
    Ok(categories)
}

/// Category for a single free-text description.
pub fn classify_description(description: &str) -> WeatherCategory {
    let lowered = description.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(*k)))
        .map(|(category, _)| *category)
        .unwrap_or(WeatherCategory::Other)
}

/// Counts each exact description string.
///
/// Entries are ordered by descending count; equal counts keep the order in which the
/// description was first seen.
pub fn weather_distribution(records: &[WeatherRecord]) -> Result<Vec<(String, usize)>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for (row, record) in records.iter().enumerate() {
        let description = require_description(record, row)?;
        match index.get(description) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(description, counts.len());
                counts.push((description.to_string(), 1));
            }
        }
    }

    // stable sort keeps first-seen order among ties
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(counts)
}

/// Buckets cities by temperature using the threshold cascade.
///
/// # Arguments
///
/// * `records` - Record set to bucket
/// * `thresholds` - Lower bounds of each bucket; a value equal to a bound falls to the
///   next bucket down
///
/// # Returns
///
/// Returns every bucket (possibly empty) for non-empty input, or an empty map for an
/// empty record set.
pub fn temperature_ranges(
    records: &[WeatherRecord],
    thresholds: &TempThresholds,
) -> Result<BTreeMap<TemperatureRange, Vec<String>>> {
    let mut ranges = BTreeMap::new();
    if records.is_empty() {
        return Ok(ranges);
    }
    for range in TemperatureRange::ALL {
        ranges.insert(range, Vec::new());
    }

    for (row, record) in records.iter().enumerate() {
        let city = require_city(record, row)?;
        let temp = finite(record.temperature, row, "temperature")?;
        ranges
            .entry(classify_temperature(temp, thresholds))
            .or_default()
            .push(city.to_string());
    }
    Ok(ranges)
}

/// Bucket for a single temperature.
pub fn classify_temperature(temp: f64, thresholds: &TempThresholds) -> TemperatureRange {
    thresholds
        .cascade()
        .into_iter()
        .find(|(_, bound)| temp > *bound)
        .map(|(range, _)| range)
        .unwrap_or(TemperatureRange::Cold)
}

/// Rounds half away from zero to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Index of the first maximum. Later equal values never replace an earlier one.
pub fn first_max_index<T: PartialOrd>(values: &[T]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, value) in values.iter().enumerate() {
        match best {
            Some(b) if *value > values[b] => best = Some(i),
            None => best = Some(i),
            _ => {}
        }
    }
    best
}

/// Index of the first minimum. Later equal values never replace an earlier one.
pub fn first_min_index<T: PartialOrd>(values: &[T]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, value) in values.iter().enumerate() {
        match best {
            Some(b) if *value < values[b] => best = Some(i),
            None => best = Some(i),
            _ => {}
        }
    }
    best
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Statistical median, averaging the two middle values for even lengths.
/// `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let len = sorted.len();
    if len.is_multiple_of(2) {
        Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0)
    } else {
        Some(sorted[len / 2])
    }
}

fn metric_stats<T>(values: &[(&str, T)]) -> Option<MetricStats<T>>
where
    T: Copy + PartialOrd + Into<f64>,
{
    let raw: Vec<T> = values.iter().map(|(_, v)| *v).collect();
    let floats: Vec<f64> = raw.iter().map(|&v| v.into()).collect();

    let hi = first_max_index(&raw)?;
    let lo = first_min_index(&raw)?;

    Some(MetricStats {
        highest: raw[hi],
        lowest: raw[lo],
        average: round1(mean(&floats)?),
        median: round1(median(&floats)?),
        highest_city: values[hi].0.to_string(),
        lowest_city: values[lo].0.to_string(),
    })
}

fn require_city(record: &WeatherRecord, row: usize) -> Result<&str> {
    require_text(&record.city, row, "city")
}

fn require_description(record: &WeatherRecord, row: usize) -> Result<&str> {
    require_text(&record.description, row, "description")
}

fn require_text<'a>(value: &'a str, row: usize, field: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::MissingField { row, field });
    }
    Ok(value)
}

fn finite(value: f64, row: usize, field: &'static str) -> Result<f64> {
    if !value.is_finite() {
        return Err(PipelineError::MalformedValue {
            row,
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        city: &str,
        temperature: f64,
        humidity: u32,
        description: &str,
        wind: f64,
    ) -> WeatherRecord {
        WeatherRecord {
            city: city.to_string(),
            temperature,
            humidity,
            description: description.to_string(),
            wind_speed: wind,
            country: "XX".to_string(),
            timestamp: "2024-06-01 12:00:00".to_string(),
        }
    }

    fn sample() -> Vec<WeatherRecord> {
        vec![
            record("Cairo", 36.2, 20, "Clear Sky", 4.1),
            record("London", 14.0, 81, "Light Rain", 6.3),
            record("Oslo", -2.5, 90, "Snow", 2.0),
            record("Tokyo", 27.0, 65, "Overcast Clouds", 3.4),
            record("Lima", 19.5, 77, "Mist", 1.2),
        ]
    }

    #[test]
    fn temperature_stats_basic() {
        let stats = temperature_stats(&sample()).unwrap().unwrap();
        assert_eq!(stats.highest, 36.2);
        assert_eq!(stats.highest_city, "Cairo");
        assert_eq!(stats.lowest, -2.5);
        assert_eq!(stats.lowest_city, "Oslo");
        assert_eq!(stats.average, 18.8);
        assert_eq!(stats.median, 19.5);
    }

    #[test]
    fn ties_pick_first_record() {
        let records = vec![
            record("A", 30.0, 50, "Clear", 5.0),
            record("B", 30.0, 50, "Clear", 5.0),
        ];
        let temp = temperature_stats(&records).unwrap().unwrap();
        assert_eq!(temp.highest_city, "A");
        assert_eq!(temp.lowest_city, "A");

        let humidity = humidity_stats(&records).unwrap().unwrap();
        assert_eq!(humidity.highest_city, "A");
        let wind = wind_stats(&records).unwrap().unwrap();
        assert_eq!(wind.lowest_city, "A");
    }

    #[test]
    fn median_of_even_length_averages_middle_pair() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn rounding_goes_half_away_from_zero() {
        assert_eq!(round1(0.25), 0.3);
        assert_eq!(round1(-0.25), -0.3);
        assert_eq!(round1(12.34), 12.3);
    }

    #[test]
    fn humidity_stats_average_is_rounded() {
        let records = vec![
            record("A", 1.0, 10, "Clear", 1.0),
            record("B", 1.0, 11, "Clear", 1.0),
            record("C", 1.0, 11, "Clear", 1.0),
        ];
        let stats = humidity_stats(&records).unwrap().unwrap();
        assert_eq!(stats.highest, 11);
        assert_eq!(stats.highest_city, "B");
        assert_eq!(stats.lowest, 10);
        assert_eq!(stats.average, 10.7);
        assert_eq!(stats.median, 11.0);
    }

    #[test]
    fn empty_input_yields_empty_results() {
        assert!(temperature_stats(&[]).unwrap().is_none());
        assert!(humidity_stats(&[]).unwrap().is_none());
        assert!(wind_stats(&[]).unwrap().is_none());
        assert!(categorize_weather(&[]).unwrap().is_empty());
        assert!(weather_distribution(&[]).unwrap().is_empty());
        assert!(temperature_ranges(&[], &TempThresholds::default()).unwrap().is_empty());

        let analysis = comprehensive_analysis(&[], &TempThresholds::default()).unwrap();
        assert_eq!(analysis.total_records, 0);
    }

    #[test]
    fn rain_wins_over_clouds() {
        assert_eq!(classify_description("cloudy with rain"), WeatherCategory::Rain);
        assert_eq!(classify_description("Sunny Intervals, Showers"), WeatherCategory::Clear);
        assert_eq!(classify_description("Broken Clouds"), WeatherCategory::Clouds);
        assert_eq!(classify_description("Heavy BLIZZARD"), WeatherCategory::Snow);
        assert_eq!(classify_description("Haze"), WeatherCategory::Other);
    }

    #[test]
    fn every_city_lands_in_exactly_one_category() {
        let records = sample();
        let categories = categorize_weather(&records).unwrap();
        assert_eq!(categories.len(), WeatherCategory::ALL.len());

        let mut seen: Vec<&String> = categories.values().flatten().collect();
        seen.sort();
        let mut expected: Vec<&String> = records.iter().map(|r| &r.city).collect();
        expected.sort();
        assert_eq!(seen, expected);

        assert_eq!(categories[&WeatherCategory::Other], vec!["Lima".to_string()]);
    }

    #[test]
    fn distribution_orders_by_count_then_first_seen() {
        let records = vec![
            record("A", 1.0, 1, "Clear Sky", 1.0),
            record("B", 1.0, 1, "Rain", 1.0),
            record("C", 1.0, 1, "Cloudy", 1.0),
            record("D", 1.0, 1, "Rain", 1.0),
            record("E", 1.0, 1, "Clear Sky", 1.0),
            record("F", 1.0, 1, "Rain", 1.0),
            record("G", 1.0, 1, "Clear Sky", 1.0),
        ];
        let distribution = weather_distribution(&records).unwrap();
        assert_eq!(
            distribution,
            vec![
                ("Clear Sky".to_string(), 3),
                ("Rain".to_string(), 3),
                ("Cloudy".to_string(), 1),
            ]
        );
    }

    #[test]
    fn distribution_keeps_case_distinct() {
        let records = vec![
            record("A", 1.0, 1, "rain", 1.0),
            record("B", 1.0, 1, "Rain", 1.0),
        ];
        assert_eq!(weather_distribution(&records).unwrap().len(), 2);
    }

    #[test]
    fn range_boundaries_belong_to_lower_bucket() {
        let thresholds = TempThresholds::default();
        assert_eq!(classify_temperature(35.0, &thresholds), TemperatureRange::Hot);
        assert_eq!(classify_temperature(35.1, &thresholds), TemperatureRange::VeryHot);
        assert_eq!(classify_temperature(10.0, &thresholds), TemperatureRange::Cold);
        assert_eq!(classify_temperature(-40.0, &thresholds), TemperatureRange::Cold);
    }

    #[test]
    fn ranges_follow_injected_thresholds() {
        let thresholds = TempThresholds {
            very_hot: 4.0,
            hot: 3.0,
            warm: 2.0,
            moderate: 1.0,
            cool: 0.0,
        };
        let records = vec![
            record("A", 5.0, 1, "Clear", 1.0),
            record("B", 2.5, 1, "Clear", 1.0),
            record("C", 0.0, 1, "Clear", 1.0),
        ];
        let ranges = temperature_ranges(&records, &thresholds).unwrap();
        assert_eq!(ranges[&TemperatureRange::VeryHot], vec!["A".to_string()]);
        assert_eq!(ranges[&TemperatureRange::Warm], vec!["B".to_string()]);
        assert_eq!(ranges[&TemperatureRange::Cold], vec!["C".to_string()]);
        assert!(ranges[&TemperatureRange::Hot].is_empty());
    }

    #[test]
    fn non_finite_temperature_is_rejected() {
        let records = vec![record("A", f64::NAN, 1, "Clear", 1.0)];
        assert!(matches!(
            temperature_stats(&records),
            Err(PipelineError::MalformedValue { row: 0, field: "temperature", .. })
        ));
        assert!(comprehensive_analysis(&records, &TempThresholds::default()).is_err());
    }

    #[test]
    fn out_of_range_humidity_and_negative_wind_are_rejected() {
        let records = vec![record("A", 1.0, 101, "Clear", 1.0)];
        assert!(matches!(
            humidity_stats(&records),
            Err(PipelineError::MalformedValue { field: "humidity", .. })
        ));

        let records = vec![record("A", 1.0, 50, "Clear", -1.0)];
        assert!(matches!(
            wind_stats(&records),
            Err(PipelineError::MalformedValue { field: "wind_speed", .. })
        ));
    }

    #[test]
    fn blank_city_or_description_is_missing() {
        let records = vec![
            record("A", 1.0, 1, "Clear", 1.0),
            record("  ", 1.0, 1, "Clear", 1.0),
        ];
        assert!(matches!(
            temperature_stats(&records),
            Err(PipelineError::MissingField { row: 1, field: "city" })
        ));

        let records = vec![record("A", 1.0, 1, "", 1.0)];
        assert!(matches!(
            weather_distribution(&records),
            Err(PipelineError::MissingField { row: 0, field: "description" })
        ));
    }

    #[test]
    fn analysis_is_repeatable() {
        let records = sample();
        let thresholds = TempThresholds::default();
        let first = comprehensive_analysis(&records, &thresholds).unwrap();
        let second = comprehensive_analysis(&records, &thresholds).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total_records, 5);
    }

    #[test]
    fn average_and_median_sit_between_extremes() {
        let records = sample();
        let stats = temperature_stats(&records).unwrap().unwrap();
        assert!(stats.highest >= stats.average && stats.average >= stats.lowest);
        assert!(stats.highest >= stats.median && stats.median >= stats.lowest);
    }
}
