//! Run configuration, built once at process start.
//!
//! Nothing below `main` reads the environment: credentials and endpoints are
//! resolved here and handed to the clients by reference.

use crate::error::PipelineError;
use clap::ValueEnum;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

pub const GOOGLE_MAPS_API_KEY: &str = "GOOGLE_MAPS_API_KEY";
pub const FORECAST_IO_API_KEY: &str = "FORECAST_IO_API_KEY";
pub const GEOCODING_API_URL: &str = "GEOCODING_API_URL";
pub const WEATHER_API_URL: &str = "WEATHER_API_URL";

pub const DEFAULT_GEOCODING_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_WEATHER_URL: &str = "https://api.darksky.net/forecast";

pub const DEFAULT_INPUT: &str = "locations.csv";
pub const DEFAULT_FLAT_OUTPUT: &str = "daily_weather_info.csv";
pub const DEFAULT_REPORT_OUTPUT: &str = "precipitation.xlsx";
pub const DEFAULT_METRIC: &str = "precipProbability";

/// What to do when a service call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Abort the whole run on the first failure. No output is written.
    #[default]
    Abort,
    /// Log the failure, drop the affected location or day, keep going.
    Skip,
}

/// API keys for the two external services.
#[derive(Debug)]
pub struct Credentials {
    pub geocoding: SecretString,
    pub weather: SecretString,
}

impl Credentials {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves both keys through `lookup`. An unset or empty value is a
    /// configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
                .ok_or(PipelineError::Config(name))
        };

        Ok(Self {
            geocoding: required(GOOGLE_MAPS_API_KEY)?,
            weather: required(FORECAST_IO_API_KEY)?,
        })
    }
}

/// Base URLs of the external services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub geocoding: String,
    pub weather: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            geocoding: DEFAULT_GEOCODING_URL.to_string(),
            weather: DEFAULT_WEATHER_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Overrides either base URL through `lookup`. Unset or blank values keep
    /// the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let set = |name: &str| {
            lookup(name)
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
        };
        Self {
            geocoding: set(GEOCODING_API_URL).unwrap_or(defaults.geocoding),
            weather: set(WEATHER_API_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.weather),
        }
    }
}

/// Knobs for the fetch and reshape stages.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub metric: String,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub retries: u32,
    pub on_error: FailurePolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            metric: DEFAULT_METRIC.to_string(),
            concurrency: 8,
            request_timeout: Duration::from_secs(30),
            retries: 0,
            on_error: FailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub input: PathBuf,
    pub flat_output: PathBuf,
    pub report_output: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            flat_output: PathBuf::from(DEFAULT_FLAT_OUTPUT),
            report_output: PathBuf::from(DEFAULT_REPORT_OUTPUT),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub settings: RunSettings,
    pub paths: Paths,
}

impl Config {
    /// Reads credentials and endpoint overrides from the process environment.
    pub fn from_env(settings: RunSettings, paths: Paths) -> Result<Self, PipelineError> {
        Ok(Self {
            credentials: Credentials::from_env()?,
            endpoints: Endpoints::from_lookup(|name| std::env::var(name).ok()),
            settings,
            paths,
        })
    }
}
