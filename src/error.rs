//! Error types shared by the pipeline stages.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the geocoding service.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed")]
    Request(#[from] reqwest::Error),

    #[error("geocoding service returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("geocoding service reported '{status}': {}", .message.as_deref().unwrap_or("no details"))]
    Api {
        status: String,
        message: Option<String>,
    },

    #[error("invalid geocoding url: {0}")]
    InvalidUrl(String),

    #[error("failed to decode geocoding response")]
    Decode(#[from] serde_json::Error),
}

/// Failure talking to the daily-weather service.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed")]
    Request(#[from] reqwest::Error),

    #[error("weather service returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid weather url: {0}")]
    InvalidUrl(String),

    #[error("failed to decode weather response")]
    Decode(#[from] serde_json::Error),

    #[error("weather response has no daily summary")]
    MissingDaily,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{path}:{line}: {reason}")]
    InputFormat {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("failed to read location file '{0}'")]
    InputRead(PathBuf, #[source] csv::Error),

    #[error("environment variable {0} must be set")]
    Config(&'static str),

    #[error("geocoding failed for postal code '{postal_code}'")]
    GeocodeService {
        postal_code: String,
        #[source]
        source: GeocodeError,
    },

    #[error("weather fetch failed for location '{location_id}' at {timestamp}")]
    WeatherService {
        location_id: String,
        timestamp: i64,
        #[source]
        source: WeatherError,
    },

    #[error("failed to write '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PipelineError {
    pub(crate) fn write(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PipelineError::Write {
            path: path.into(),
            source: Box::new(source),
        }
    }
}
