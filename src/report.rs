use crate::error::Result;
use crate::structs::{
    AnalysisResult, MetricStats, TempThresholds, TemperatureRange, WeatherCategory, WeatherRecord,
};
use log::info;
use std::fmt::Display;
use std::fs;
use std::path::Path;

const RULE_WIDTH: usize = 60;
const SECTION_RULE_WIDTH: usize = 30;
const TABLE_HEADERS: [&str; 5] = ["City", "Temperature", "Humidity", "Description", "Wind Speed"];

/// Renders the text report for one analysis.
///
/// # Arguments
/// * `analysis` - Result of `comprehensive_analysis`
/// * `thresholds` - Bounds the temperature ranges were computed with, used for the labels
/// * `raw_data` - When given, a grid table of every record is appended
/// * `generated_at` - Timestamp printed in the header
///
/// Sections whose data is empty are left out.
pub fn render_report(
    analysis: &AnalysisResult,
    thresholds: &TempThresholds,
    raw_data: Option<&[WeatherRecord]>,
    generated_at: &str,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    let rule = "=".repeat(RULE_WIDTH);

    lines.push(rule.clone());
    lines.push("WEATHER ANALYSIS REPORT".to_string());
    lines.push(rule.clone());
    lines.push(format!("Generated on: {}", generated_at));
    lines.push(format!("Total cities analyzed: {}", analysis.total_records));
    lines.push(String::new());

    if let Some(temp) = &analysis.temperature_stats {
        section(&mut lines, "TEMPERATURE ANALYSIS");
        lines.push(format!(
            "Highest Temperature: {}°C - {}",
            temp.highest, temp.highest_city
        ));
        lines.push(format!(
            "Lowest Temperature: {}°C - {}",
            temp.lowest, temp.lowest_city
        ));
        lines.push(format!("Average Temperature: {}°C", temp.average));
        lines.push(format!("Median Temperature: {}°C", temp.median));
        lines.push(String::new());
    }

    if !analysis.weather_categories.is_empty() {
        section(&mut lines, "WEATHER CONDITIONS");
        for (category, cities) in &analysis.weather_categories {
            if !cities.is_empty() {
                let heading = format!("{}: {}", category_label(*category), cities.len());
                bullet_list(&mut lines, &heading, cities);
            }
        }
    }

    if !analysis.temperature_ranges.is_empty() {
        section(&mut lines, "TEMPERATURE RANGES");
        for (range, cities) in &analysis.temperature_ranges {
            if !cities.is_empty() {
                let label = range_label(*range, thresholds);
                let heading = format!("{}: {} cities", label, cities.len());
                bullet_list(&mut lines, &heading, cities);
            }
        }
    }

    if !analysis.weather_distribution.is_empty() {
        section(&mut lines, "WEATHER DISTRIBUTION");
        for (description, count) in &analysis.weather_distribution {
            lines.push(format!("  {}: {}", description, count));
        }
        lines.push(String::new());
    }

    if analysis.humidity_stats.is_some() || analysis.wind_stats.is_some() {
        section(&mut lines, "ADDITIONAL METRICS");
        if let Some(humidity) = &analysis.humidity_stats {
            metric_block(&mut lines, "Humidity:", humidity, "%");
        }
        if let Some(wind) = &analysis.wind_stats {
            metric_block(&mut lines, "Wind Speed:", wind, " m/s");
        }
    }

    if let Some(records) = raw_data.filter(|r| !r.is_empty()) {
        section(&mut lines, "DETAILED WEATHER DATA");
        lines.push(grid_table(records));
        lines.push(String::new());
    }

    lines.push(rule.clone());
    lines.push("End of Report".to_string());
    lines.push(rule);

    lines.join("\n")
}

/// Writes the rendered report to disk.
pub fn save_report(content: &str, path: &Path) -> Result<()> {
    fs::write(path, content)?;
    info!("Report saved to {}", path.display());
    Ok(())
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(title.to_string());
    lines.push("-".repeat(SECTION_RULE_WIDTH));
}

fn bullet_list(lines: &mut Vec<String>, heading: &str, cities: &[String]) {
    lines.push(heading.to_string());
    for city in cities {
        lines.push(format!("  • {}", city));
    }
    lines.push(String::new());
}

fn metric_block<T: Display>(
    lines: &mut Vec<String>,
    title: &str,
    stats: &MetricStats<T>,
    unit: &str,
) {
    lines.push(title.to_string());
    lines.push(format!("  Highest: {}{} - {}", stats.highest, unit, stats.highest_city));
    lines.push(format!("  Lowest: {}{} - {}", stats.lowest, unit, stats.lowest_city));
    lines.push(format!("  Average: {}{}", stats.average, unit));
    lines.push(format!("  Median: {}{}", stats.median, unit));
    lines.push(String::new());
}

fn category_label(category: WeatherCategory) -> &'static str {
    match category {
        WeatherCategory::Clear => "Clear Weather Cities",
        WeatherCategory::Rain => "Rain in Cities",
        WeatherCategory::Clouds => "Cloudy Cities",
        WeatherCategory::Snow => "Snow in Cities",
        WeatherCategory::Other => "Other Conditions",
    }
}

fn range_label(range: TemperatureRange, t: &TempThresholds) -> String {
    match range {
        TemperatureRange::VeryHot => format!("Very Hot (>{}°C)", t.very_hot),
        TemperatureRange::Hot => format!("Hot ({}-{}°C)", t.hot, t.very_hot),
        TemperatureRange::Warm => format!("Warm ({}-{}°C)", t.warm, t.hot),
        TemperatureRange::Moderate => format!("Moderate ({}-{}°C)", t.moderate, t.warm),
        TemperatureRange::Cool => format!("Cool ({}-{}°C)", t.cool, t.moderate),
        TemperatureRange::Cold => format!("Cold (<={}°C)", t.cool),
    }
}

/// Grid-style table with `+---+` borders around every row.
fn grid_table(records: &[WeatherRecord]) -> String {
    let rows: Vec<[String; 5]> = records
        .iter()
        .map(|r| {
            [
                r.city.clone(),
                format!("{}°C", r.temperature),
                format!("{}%", r.humidity),
                r.description.clone(),
                format!("{} m/s", r.wind_speed),
            ]
        })
        .collect();

    let mut widths = TABLE_HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = |fill: char| {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&fill.to_string().repeat(width + 2));
            line.push('+');
        }
        line
    };
    let render_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (cell, width) in cells.iter().zip(&widths) {
            let pad = width - cell.chars().count();
            line.push_str(&format!(" {}{} |", cell, " ".repeat(pad)));
        }
        line
    };

    let headers: Vec<String> = TABLE_HEADERS.iter().map(|h| h.to_string()).collect();
    let mut out = vec![border('-'), render_row(&headers[..]), border('=')];
    for row in &rows {
        out.push(render_row(&row[..]));
        out.push(border('-'));
    }
    out.join("\n")
}
