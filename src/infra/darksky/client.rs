use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::WeatherError;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::services::geocoding_api::Coordinates;
use crate::services::weather_api::{DailySummary, WeatherApi};

/// Response blocks the pipeline never reads.
const EXCLUDE: &str = "currently,minutely,hourly,alerts,flags";

#[derive(Deserialize)]
struct ForecastResponse {
    /// Hours east of UTC.
    #[serde(default)]
    offset: Option<f64>,
    #[serde(default)]
    daily: Option<DailyBlock>,
}

#[derive(Deserialize)]
struct DailyBlock {
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

/// Dark Sky "time machine" client. The key is a path segment, so it is
/// spliced into the URL here rather than through an auth wrapper.
pub struct DarkSkyClient<C> {
    base_url: String,
    api_key: SecretString,
    http: C,
}

impl<C: HttpClient> DarkSkyClient<C> {
    pub fn new(http: C, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            http,
        }
    }

    fn request_url(&self, coordinates: Coordinates, timestamp: i64) -> Result<Url, WeatherError> {
        let raw = format!(
            "{}/{}/{},{}",
            self.base_url.trim_end_matches('/'),
            self.api_key.expose_secret(),
            coordinates,
            timestamp
        );
        let mut url = Url::parse(&raw).map_err(|e| WeatherError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("exclude", EXCLUDE);
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> WeatherApi for DarkSkyClient<C> {
    #[tracing::instrument(skip(self), fields(lat = coordinates.lat, lng = coordinates.lng))]
    async fn daily_summary(
        &self,
        coordinates: Coordinates,
        timestamp: i64,
    ) -> Result<DailySummary, WeatherError> {
        let fetched = fetch_bytes(&self.http, self.request_url(coordinates, timestamp)?)
            .await
            .map_err(|e| WeatherError::Request(e.without_url()))?;

        if !fetched.status.is_success() {
            return Err(WeatherError::Status {
                status: fetched.status,
                body: fetched.body_text(),
            });
        }

        let response: ForecastResponse = serde_json::from_slice(&fetched.body)?;
        let metrics = response
            .daily
            .and_then(|d| d.data.into_iter().next())
            .ok_or(WeatherError::MissingDaily)?;

        Ok(DailySummary {
            metrics,
            utc_offset_seconds: response.offset.map(|h| (h * 3600.0).round() as i32),
        })
    }
}
