//! CLI entry point.
//!
//! With no arguments it reads `locations.csv` and writes
//! `daily_weather_info.csv` and `precipitation.xlsx` to the working directory.

use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use weather_pivot::Pipeline;
use weather_pivot::config::{self, Config, FailurePolicy, Paths, RunSettings};
use weather_pivot::fetch::BasicClient;
use weather_pivot::infra::darksky::DarkSkyClient;
use weather_pivot::infra::google::GoogleGeocoder;

#[derive(Parser)]
#[command(name = "weather_pivot")]
#[command(about = "Fetch daily weather for a list of locations and pivot one metric into a report", long_about = None)]
struct Cli {
    /// Location file: header, then `locationId,postalCode,startDateEpoch,endDateEpoch`
    #[arg(long, default_value = config::DEFAULT_INPUT)]
    input: PathBuf,

    /// Flat per-day CSV to write
    #[arg(long, default_value = config::DEFAULT_FLAT_OUTPUT)]
    flat_output: PathBuf,

    /// Spreadsheet report to write
    #[arg(long, default_value = config::DEFAULT_REPORT_OUTPUT)]
    report_output: PathBuf,

    /// Daily metric to pivot into the report
    #[arg(long, default_value = config::DEFAULT_METRIC)]
    metric: String,

    /// Maximum number of weather requests in flight
    #[arg(short, long, default_value_t = 8)]
    concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Retries for a failed weather request
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// What to do when a service call fails
    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    on_error: FailurePolicy,
}

impl Cli {
    fn into_parts(self) -> (RunSettings, Paths) {
        let settings = RunSettings {
            metric: self.metric,
            concurrency: self.concurrency,
            request_timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            on_error: self.on_error,
        };
        let paths = Paths {
            input: self.input,
            flat_output: self.flat_output,
            report_output: self.report_output,
        };
        (settings, paths)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Flags and credentials are checked before anything is created on disk.
    let (settings, paths) = Cli::parse().into_parts();
    let config = Config::from_env(settings, paths)?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/weather_pivot.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("weather_pivot.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let Config {
        credentials,
        endpoints,
        settings,
        paths,
    } = config;
    let timeout = settings.request_timeout;

    let geocoder = GoogleGeocoder::new(
        BasicClient::with_timeout(timeout).context("Failed to build geocoding client")?,
        endpoints.geocoding,
        credentials.geocoding,
    );
    let weather = DarkSkyClient::new(
        BasicClient::with_timeout(timeout).context("Failed to build weather client")?,
        endpoints.weather,
        credentials.weather,
    );

    let pipeline = Pipeline::new(Arc::new(geocoder), Arc::new(weather), settings);
    let report = pipeline.run(&paths).await?;

    info!(
        rows = report.dataset.len(),
        flat_output = %paths.flat_output.display(),
        report_output = %paths.report_output.display(),
        "Reports written"
    );
    Ok(())
}
