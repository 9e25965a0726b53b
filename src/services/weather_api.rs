use crate::error::WeatherError;
use crate::services::geocoding_api::Coordinates;
use serde_json::{Map, Value};

/// The single daily summary record returned for one location and day.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailySummary {
    /// Metric name to value, exactly as the service sent it.
    pub metrics: Map<String, Value>,
    /// Offset of the location's local time from UTC, in seconds.
    pub utc_offset_seconds: Option<i32>,
}

/// Historical daily weather lookup.
#[async_trait::async_trait]
pub trait WeatherApi: Send + Sync {
    async fn daily_summary(
        &self,
        coordinates: Coordinates,
        timestamp: i64,
    ) -> Result<DailySummary, WeatherError>;
}
