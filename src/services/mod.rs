//! Traits for the two external services the pipeline depends on.
//!
//! Concrete clients live under [`crate::infra`]; tests supply in-memory
//! implementations.

pub mod geocoding_api;
pub mod weather_api;

pub use geocoding_api::{Coordinates, GeocodingApi};
pub use weather_api::{DailySummary, WeatherApi};
