use crate::error::{PipelineError, Result};
use crate::structs::{DataFormat, WeatherRecord};
use arrow_array::{Array, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use csv::{ReaderBuilder, Writer};
use log::{debug, info};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use std::collections::HashMap;
use std::{fs, fs::File, path::Path, sync::Arc};

const CITY: &str = "city";
const TEMPERATURE: &str = "temperature";
const HUMIDITY: &str = "humidity";
const DESCRIPTION: &str = "description";
const WIND_SPEED: &str = "wind_speed";
const COUNTRY: &str = "country";
const TIMESTAMP: &str = "timestamp";

const MAX_HUMIDITY: u32 = 100;

const COLUMNS: [&str; 7] = [
    CITY,
    TEMPERATURE,
    HUMIDITY,
    DESCRIPTION,
    WIND_SPEED,
    COUNTRY,
    TIMESTAMP,
];

/// Raw column name to cell text for one stored row.
type Fields = HashMap<String, String>;

/// Writes a record set in the given format.
///
/// # Errors
/// Returns `PipelineError::NoData` for an empty record set, or the underlying
/// I/O or encoder error if the file cannot be written.
pub fn save_records(
    records: &[WeatherRecord],
    output_path: &Path,
    format: DataFormat,
) -> Result<()> {
    if records.is_empty() {
        return Err(PipelineError::NoData);
    }
    match format {
        DataFormat::Csv => write_csv(records, output_path)?,
        DataFormat::Json => write_json(records, output_path)?,
        DataFormat::Parquet => write_parquet(records, output_path)?,
    }
    info!("Data saved to {}", output_path.display());
    Ok(())
}

/// Reads a record set back, validating every row.
///
/// # Errors
/// Returns an I/O error if the file is missing, `MissingField` if a row lacks a
/// required value (a blank or null cell counts as missing) and `MalformedValue`
/// if a numeric cell does not parse, is not finite, or holds humidity above 100.
pub fn load_records(input_path: &Path, format: DataFormat) -> Result<Vec<WeatherRecord>> {
    let records = match format {
        DataFormat::Csv => read_csv(input_path)?,
        DataFormat::Json => read_json(input_path)?,
        DataFormat::Parquet => read_parquet(input_path)?,
    };
    info!(
        "Loaded {} records from {}",
        records.len(),
        input_path.display()
    );
    Ok(records)
}

/// Reads city names, one per line. Blank lines are skipped and names are trimmed.
pub fn read_cities_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let cities: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    info!("Loaded {} cities from {}", cities.len(), path.display());
    Ok(cities)
}

/// Writes records to a CSV file with a header row.
///
/// Floats use their shortest round-trip representation so a later load returns
/// exactly the same values.
pub fn write_csv(records: &[WeatherRecord], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(COLUMNS)?;

    for record in records {
        writer.write_record(&[
            record.city.clone(),
            record.temperature.to_string(),
            record.humidity.to_string(),
            record.description.clone(),
            record.wind_speed.to_string(),
            record.country.clone(),
            record.timestamp.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes records to a pretty-formatted JSON array.
pub fn write_json(records: &[WeatherRecord], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

/// Writes records to a columnar Parquet file using Arrow format.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_parquet(records: &[WeatherRecord], output_path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(CITY, DataType::Utf8, false),
        Field::new(TEMPERATURE, DataType::Float64, false),
        Field::new(HUMIDITY, DataType::UInt32, false),
        Field::new(DESCRIPTION, DataType::Utf8, false),
        Field::new(WIND_SPEED, DataType::Float64, false),
        Field::new(COUNTRY, DataType::Utf8, false),
        Field::new(TIMESTAMP, DataType::Utf8, false),
    ]));

    let cities = StringArray::from_iter_values(records.iter().map(|r| r.city.as_str()));
    let temperatures: Float64Array = records.iter().map(|r| r.temperature).collect();
    let humidities: UInt32Array = records.iter().map(|r| r.humidity).collect();
    let descriptions =
        StringArray::from_iter_values(records.iter().map(|r| r.description.as_str()));
    let wind_speeds: Float64Array = records.iter().map(|r| r.wind_speed).collect();
    let countries = StringArray::from_iter_values(records.iter().map(|r| r.country.as_str()));
    let timestamps = StringArray::from_iter_values(records.iter().map(|r| r.timestamp.as_str()));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(cities),
            Arc::new(temperatures),
            Arc::new(humidities),
            Arc::new(descriptions),
            Arc::new(wind_speeds),
            Arc::new(countries),
            Arc::new(timestamps),
        ],
    )?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

fn read_csv(input_path: &Path) -> Result<Vec<WeatherRecord>> {
    let file = File::open(input_path)?;
    let mut reader = ReaderBuilder::new().from_reader(file);
    let headers = reader.headers()?.clone();
    debug!("CSV columns: {:?}", headers);

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let line = result?;
        let fields: Fields = headers
            .iter()
            .zip(line.iter())
            .map(|(name, value)| (name.trim().to_string(), value.to_string()))
            .collect();
        records.push(record_from_fields(&fields, row)?);
    }
    Ok(records)
}

fn read_json(input_path: &Path) -> Result<Vec<WeatherRecord>> {
    let file = File::open(input_path)?;
    let rows: Vec<serde_json::Map<String, Value>> = serde_json::from_reader(file)?;

    let mut records = Vec::with_capacity(rows.len());
    for (row, object) in rows.into_iter().enumerate() {
        let fields: Fields = object
            .into_iter()
            .filter_map(|(name, value)| json_cell(value).map(|text| (name, text)))
            .collect();
        records.push(record_from_fields(&fields, row)?);
    }
    Ok(records)
}

fn json_cell(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn read_parquet(input_path: &Path) -> Result<Vec<WeatherRecord>> {
    debug!("Reading Parquet file: {}", input_path.display());
    let file = File::open(input_path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;

    let mut records = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;
        let offset = records.len();
        let city_col = get_column_str(&batch, CITY, offset)?;
        let temp_col = get_column_f64(&batch, TEMPERATURE, offset)?;
        let humidity_col = get_column_u32(&batch, HUMIDITY, offset)?;
        let description_col = get_column_str(&batch, DESCRIPTION, offset)?;
        let wind_col = get_column_f64(&batch, WIND_SPEED, offset)?;
        let country_col = optional_column_str(&batch, COUNTRY)?;
        let timestamp_col = optional_column_str(&batch, TIMESTAMP)?;

        for i in 0..batch.num_rows() {
            let row = offset + i;
            records.push(WeatherRecord {
                city: text_cell(city_col, i, CITY, row)?,
                temperature: f64_cell(temp_col, i, TEMPERATURE, row)?,
                humidity: humidity_cell(humidity_col, i, row)?,
                description: text_cell(description_col, i, DESCRIPTION, row)?,
                wind_speed: f64_cell(wind_col, i, WIND_SPEED, row)?,
                country: optional_text_cell(country_col, i),
                timestamp: optional_text_cell(timestamp_col, i),
            });
        }
    }
    Ok(records)
}

fn get_column_f64<'a>(
    batch: &'a RecordBatch,
    name: &'static str,
    row: usize,
) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .ok_or(PipelineError::MissingField { row, field: name })?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| PipelineError::Data(format!("Column {} is not Float64", name)))
}

fn get_column_u32<'a>(
    batch: &'a RecordBatch,
    name: &'static str,
    row: usize,
) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or(PipelineError::MissingField { row, field: name })?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| PipelineError::Data(format!("Column {} is not UInt32", name)))
}

fn get_column_str<'a>(
    batch: &'a RecordBatch,
    name: &'static str,
    row: usize,
) -> Result<&'a StringArray> {
    optional_column_str(batch, name)?.ok_or(PipelineError::MissingField { row, field: name })
}

fn optional_column_str<'a>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<Option<&'a StringArray>> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(column) => column
            .as_any()
            .downcast_ref::<StringArray>()
            .map(Some)
            .ok_or_else(|| PipelineError::Data(format!("Column {} is not Utf8/String", name))),
    }
}

fn text_cell(column: &StringArray, i: usize, field: &'static str, row: usize) -> Result<String> {
    if column.is_null(i) || column.value(i).trim().is_empty() {
        return Err(PipelineError::MissingField { row, field });
    }
    Ok(column.value(i).to_string())
}

fn f64_cell(column: &Float64Array, i: usize, field: &'static str, row: usize) -> Result<f64> {
    if column.is_null(i) {
        return Err(PipelineError::MissingField { row, field });
    }
    checked_f64(column.value(i), field, row)
}

fn humidity_cell(column: &UInt32Array, i: usize, row: usize) -> Result<u32> {
    if column.is_null(i) {
        return Err(PipelineError::MissingField {
            row,
            field: HUMIDITY,
        });
    }
    checked_humidity(column.value(i), row)
}

fn optional_text_cell(column: Option<&StringArray>, i: usize) -> String {
    match column {
        Some(column) if !column.is_null(i) => column.value(i).to_string(),
        _ => String::new(),
    }
}

/// Builds a validated record from the raw cells of one stored row.
///
/// City, description and every numeric field are required. Country and timestamp
/// default to empty text when absent.
fn record_from_fields(fields: &Fields, row: usize) -> Result<WeatherRecord> {
    Ok(WeatherRecord {
        city: required_text(fields, CITY, row)?,
        temperature: required_f64(fields, TEMPERATURE, row)?,
        humidity: required_humidity(fields, row)?,
        description: required_text(fields, DESCRIPTION, row)?,
        wind_speed: required_f64(fields, WIND_SPEED, row)?,
        country: fields.get(COUNTRY).cloned().unwrap_or_default(),
        timestamp: fields.get(TIMESTAMP).cloned().unwrap_or_default(),
    })
}

fn required_text(fields: &Fields, field: &'static str, row: usize) -> Result<String> {
    match fields.get(field) {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(PipelineError::MissingField { row, field }),
    }
}

fn required_f64(fields: &Fields, field: &'static str, row: usize) -> Result<f64> {
    let text = required_text(fields, field, row)?;
    match text.trim().parse::<f64>() {
        Ok(value) => checked_f64(value, field, row),
        Err(_) => Err(PipelineError::MalformedValue {
            row,
            field,
            value: text,
        }),
    }
}

fn required_humidity(fields: &Fields, row: usize) -> Result<u32> {
    let text = required_text(fields, HUMIDITY, row)?;
    let trimmed = text.trim();
    let parsed = trimmed.parse::<u32>().ok().or_else(|| {
        // tabular tools sometimes write whole numbers as "65.0"
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u32::MAX as f64)
            .map(|v| v as u32)
    });
    match parsed {
        Some(value) => checked_humidity(value, row),
        None => Err(PipelineError::MalformedValue {
            row,
            field: HUMIDITY,
            value: text,
        }),
    }
}

/// Row checks shared by every storage format.
fn checked_f64(value: f64, field: &'static str, row: usize) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PipelineError::MalformedValue {
            row,
            field,
            value: value.to_string(),
        })
    }
}

fn checked_humidity(value: u32, row: usize) -> Result<u32> {
    if value <= MAX_HUMIDITY {
        Ok(value)
    } else {
        Err(PipelineError::MalformedValue {
            row,
            field: HUMIDITY,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_row() -> Vec<(&'static str, &'static str)> {
        vec![
            (CITY, "Paris"),
            (TEMPERATURE, "21.4"),
            (HUMIDITY, "55"),
            (DESCRIPTION, "Few Clouds"),
            (WIND_SPEED, "3.1"),
            (COUNTRY, "FR"),
            (TIMESTAMP, "2024-06-01 12:00:00"),
        ]
    }

    #[test]
    fn builds_record_from_cells() {
        let record = record_from_fields(&fields(&full_row()), 0).unwrap();
        assert_eq!(record.city, "Paris");
        assert_eq!(record.temperature, 21.4);
        assert_eq!(record.humidity, 55);
        assert_eq!(record.wind_speed, 3.1);
        assert_eq!(record.country, "FR");
    }

    #[test]
    fn missing_numeric_cell_fails() {
        let mut row = full_row();
        row.retain(|(k, _)| *k != WIND_SPEED);
        assert!(matches!(
            record_from_fields(&fields(&row), 4),
            Err(PipelineError::MissingField { row: 4, field: WIND_SPEED })
        ));

        let mut row = full_row();
        row[1] = (TEMPERATURE, "");
        assert!(matches!(
            record_from_fields(&fields(&row), 0),
            Err(PipelineError::MissingField { field: TEMPERATURE, .. })
        ));
    }

    #[test]
    fn unparsable_numbers_are_malformed() {
        let mut row = full_row();
        row[1] = (TEMPERATURE, "warm");
        assert!(matches!(
            record_from_fields(&fields(&row), 0),
            Err(PipelineError::MalformedValue { field: TEMPERATURE, .. })
        ));

        let mut row = full_row();
        row[1] = (TEMPERATURE, "NaN");
        assert!(record_from_fields(&fields(&row), 0).is_err());

        let mut row = full_row();
        row[2] = (HUMIDITY, "140");
        assert!(matches!(
            record_from_fields(&fields(&row), 0),
            Err(PipelineError::MalformedValue { field: HUMIDITY, .. })
        ));
    }

    #[test]
    fn whole_float_humidity_is_accepted() {
        let mut row = full_row();
        row[2] = (HUMIDITY, "65.0");
        assert_eq!(record_from_fields(&fields(&row), 0).unwrap().humidity, 65);
    }

    #[test]
    fn optional_columns_default_to_empty() {
        let mut row = full_row();
        row.retain(|(k, _)| *k != COUNTRY && *k != TIMESTAMP);
        let record = record_from_fields(&fields(&row), 0).unwrap();
        assert!(record.country.is_empty());
        assert!(record.timestamp.is_empty());
    }

    #[test]
    fn parquet_cells_get_the_same_checks() {
        let cities = StringArray::from(vec![Some("Lima"), None, Some("  ")]);
        assert_eq!(text_cell(&cities, 0, CITY, 7).unwrap(), "Lima");
        assert!(matches!(
            text_cell(&cities, 1, CITY, 8),
            Err(PipelineError::MissingField { row: 8, field: CITY })
        ));
        assert!(text_cell(&cities, 2, CITY, 9).is_err());

        let temps = Float64Array::from(vec![Some(19.5), None, Some(f64::INFINITY)]);
        assert_eq!(f64_cell(&temps, 0, TEMPERATURE, 0).unwrap(), 19.5);
        assert!(matches!(
            f64_cell(&temps, 1, TEMPERATURE, 1),
            Err(PipelineError::MissingField { row: 1, field: TEMPERATURE })
        ));
        assert!(matches!(
            f64_cell(&temps, 2, TEMPERATURE, 2),
            Err(PipelineError::MalformedValue { field: TEMPERATURE, .. })
        ));

        let humidities = UInt32Array::from(vec![Some(100), Some(101)]);
        assert_eq!(humidity_cell(&humidities, 0, 0).unwrap(), 100);
        assert!(matches!(
            humidity_cell(&humidities, 1, 1),
            Err(PipelineError::MalformedValue { field: HUMIDITY, .. })
        ));

        let countries = StringArray::from(vec![None, Some("PE")]);
        assert_eq!(optional_text_cell(Some(&countries), 0), "");
        assert_eq!(optional_text_cell(Some(&countries), 1), "PE");
        assert_eq!(optional_text_cell(None, 0), "");
    }

    #[test]
    fn json_cells_render_as_text() {
        assert_eq!(json_cell(serde_json::json!(12.5)), Some("12.5".to_string()));
        assert_eq!(json_cell(serde_json::json!("Rain")), Some("Rain".to_string()));
        assert_eq!(json_cell(Value::Null), None);
    }
}
