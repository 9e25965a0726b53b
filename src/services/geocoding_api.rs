use crate::error::GeocodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Resolves postal codes to coordinates.
#[async_trait::async_trait]
pub trait GeocodingApi: Send + Sync {
    /// Returns `Ok(None)` when the service has no match for `postal_code`.
    async fn resolve(&self, postal_code: &str) -> Result<Option<Coordinates>, GeocodeError>;
}
