//! Historical weather for a list of locations, pivoted into a location × day report.
//!
//! Locations are read from a CSV, geocoded by postal code, and fetched one
//! request per day from a historical weather API. The combined observations
//! are written flat to CSV and pivoted on one metric into a spreadsheet.

pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod location;
pub mod output;
pub mod pipeline;
pub mod pivot;
pub mod series;
pub mod services;

pub use error::{GeocodeError, PipelineError, WeatherError};
pub use pipeline::{Pipeline, Report};
