use async_trait::async_trait;
use reqwest::Url;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

use crate::error::GeocodeError;
use crate::fetch::auth::UrlParam;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::services::geocoding_api::{Coordinates, GeocodingApi};

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: Coordinates,
}

/// Google Maps geocoding client. The key travels as the `key` query parameter.
pub struct GoogleGeocoder<C> {
    base_url: String,
    http: UrlParam<C>,
}

impl<C: HttpClient> GoogleGeocoder<C> {
    pub fn new(http: C, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            http: UrlParam::new(http, "key", api_key),
        }
    }

    fn request_url(&self, postal_code: &str) -> Result<Url, GeocodeError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| GeocodeError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("address", postal_code);
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> GeocodingApi for GoogleGeocoder<C> {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, postal_code: &str) -> Result<Option<Coordinates>, GeocodeError> {
        // The key rides in the query string; keep it out of error messages.
        let fetched = fetch_bytes(&self.http, self.request_url(postal_code)?)
            .await
            .map_err(|e| GeocodeError::Request(e.without_url()))?;

        if !fetched.status.is_success() {
            return Err(GeocodeError::Status {
                status: fetched.status,
                body: fetched.body_text(),
            });
        }

        let response: GeocodeResponse = serde_json::from_slice(&fetched.body)?;
        debug!(status = %response.status, results = response.results.len(), "Geocoding response");

        match response.status.as_str() {
            "OK" => Ok(response
                .results
                .into_iter()
                .next()
                .map(|r| r.geometry.location)),
            "ZERO_RESULTS" => Ok(None),
            _ => Err(GeocodeError::Api {
                status: response.status,
                message: response.error_message,
            }),
        }
    }
}
