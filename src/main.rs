use chrono::Local;
use clap::{Parser, Subcommand};
use lib::{
    AppConfig, DataFormat, FetchPolicy, OpenWeatherClient, PipelineError, SimpleLogger,
    comprehensive_analysis, config, fetch_all, load_config, load_records, read_cities_file,
    render_report, save_records, save_report, write_default_config,
};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

const SAMPLE_CITIES: &[&str] = &[
    "London", "New York", "Tokyo", "Paris", "Sydney", "Cairo", "Moscow", "Mumbai",
    "Rio de Janeiro", "Reykjavik",
];

#[derive(Parser, Debug)]
#[command(author, version, about = "Weather analysis & report generation", long_about = None)]
struct Args {
    /// JSON config file (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level for output
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch weather data for cities and save to file
    Fetch(FetchArgs),
    /// Analyze weather data and generate report
    Analyze(AnalyzeArgs),
    /// Fetch, then analyze and report
    Run {
        #[command(flatten)]
        fetch: FetchArgs,
        /// Output report file
        #[arg(short, long)]
        report_file: Option<PathBuf>,
        /// Include detailed data table in report
        #[arg(short = 't', long, default_value_t = false)]
        show_table: bool,
    },
    /// Write a starter config and cities file
    Setup,
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    /// Path to cities file, one city per line
    #[arg(short = 'f', long)]
    cities_file: Option<PathBuf>,

    /// Output data file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (inferred from the file extension if not given)
    #[arg(long)]
    format: Option<DataFormat>,
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    /// Input data file
    #[arg(short, long)]
    data_file: Option<PathBuf>,

    /// Output report file
    #[arg(short, long)]
    report_file: Option<PathBuf>,

    /// Include detailed data table in report
    #[arg(short = 't', long, default_value_t = false)]
    show_table: bool,

    /// Input format (inferred from the file extension if not given)
    #[arg(long)]
    format: Option<DataFormat>,
}

fn main() -> Result<(), PipelineError> {
    let total_start = Instant::now();
    log::set_logger(&LOGGER).map_err(|e| PipelineError::Config(e.to_string()))?;

    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    let load = || -> Result<AppConfig, PipelineError> {
        let config = load_config(&args.config)?;
        debug!(
            "Data file: {} | Report file: {} | Thresholds: {:?}",
            config.data_file.display(),
            config.report_file.display(),
            config.thresholds
        );
        Ok(config)
    };

    match args.command {
        Command::Setup => setup(&args.config)?,
        Command::Fetch(fetch_args) => {
            fetch(&load()?, &fetch_args)?;
        }
        Command::Analyze(analyze_args) => analyze(&load()?, &analyze_args)?,
        Command::Run {
            fetch: fetch_args,
            report_file,
            show_table,
        } => {
            let config = load()?;
            println!("Starting complete weather analysis workflow...");
            let (data_file, format) = fetch(&config, &fetch_args)?;
            analyze(
                &config,
                &AnalyzeArgs {
                    data_file: Some(data_file),
                    report_file,
                    show_table,
                    format: Some(format),
                },
            )?;
            println!("Complete workflow finished successfully!");
        }
    }

    debug!("Total runtime: {:.2?}", total_start.elapsed());
    Ok(())
}

/// Fetches every configured city and saves the result. Returns where and how it was saved.
fn fetch(config: &AppConfig, args: &FetchArgs) -> Result<(PathBuf, DataFormat), PipelineError> {
    let client = OpenWeatherClient::new(config)?;

    let cities_file = args.cities_file.as_ref().unwrap_or(&config.cities_file);
    let output = args.output.clone().unwrap_or_else(|| config.data_file.clone());
    let format = args.format.unwrap_or_else(|| DataFormat::from_path(&output));

    let cities = read_cities_file(cities_file)?;
    if cities.is_empty() {
        return Err(PipelineError::NoCities(cities_file.display().to_string()));
    }

    println!("Starting weather data collection for {} cities...", cities.len());
    let fetch_start = Instant::now();
    let records = fetch_all(&client, &cities, &FetchPolicy::from(config));
    debug!("Fetch took {:.2?}", fetch_start.elapsed());

    if records.is_empty() {
        return Err(PipelineError::NoData);
    }

    save_records(&records, &output, format)?;
    println!(
        "Successfully saved weather data for {} cities to {}",
        records.len(),
        output.display()
    );
    Ok((output, format))
}

fn analyze(config: &AppConfig, args: &AnalyzeArgs) -> Result<(), PipelineError> {
    let data_file = args.data_file.as_ref().unwrap_or(&config.data_file);
    let report_file = args.report_file.as_ref().unwrap_or(&config.report_file);
    let format = args.format.unwrap_or_else(|| DataFormat::from_path(data_file));

    let records = load_records(data_file, format)?;
    if records.is_empty() {
        return Err(PipelineError::NoData);
    }

    println!("Analyzing weather data for {} cities...", records.len());
    let analysis = comprehensive_analysis(&records, &config.thresholds)?;

    let generated_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let raw_data = args.show_table.then_some(records.as_slice());
    let report = render_report(&analysis, &config.thresholds, raw_data, &generated_at);

    save_report(&report, report_file)?;
    println!("{}", report);
    println!("Analysis complete! Report saved to {}", report_file.display());
    Ok(())
}

fn setup(config_path: &Path) -> Result<(), PipelineError> {
    println!("Setting up weather analysis tool...");

    if config_path.exists() {
        println!("Config {} already exists, leaving it alone.", config_path.display());
    } else {
        write_default_config(config_path)?;
        println!(
            "Created {}. Add your OpenWeatherMap API key (or set {}).",
            config_path.display(),
            config::API_KEY_ENV
        );
    }

    let cities_file = load_config(config_path)
        .map(|c| c.cities_file)
        .unwrap_or_else(|_| AppConfig::default().cities_file);
    if cities_file.exists() {
        println!("Cities file {} already exists.", cities_file.display());
    } else {
        fs::write(&cities_file, SAMPLE_CITIES.join("\n") + "\n")?;
        println!("Created {} with sample cities.", cities_file.display());
    }

    println!("\nSetup Instructions:");
    println!("1. Get a free API key from: https://openweathermap.org/api");
    println!("2. Put it in {} as \"api_key\"", config_path.display());
    println!("3. Edit {} to add your desired cities (one per line)", cities_file.display());
    println!("4. Run: {} run", env!("CARGO_PKG_NAME"));
    Ok(())
}
