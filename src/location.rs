//! Location input: parsing `locations.csv` and attaching coordinates.

use crate::error::PipelineError;
use crate::services::geocoding_api::Coordinates;
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;
use tracing::{debug, info};

/// One input row: a location and the inclusive range of days to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRecord {
    pub id: String,
    pub postal_code: String,
    /// Unix seconds.
    pub start_date: i64,
    /// Unix seconds, inclusive.
    pub end_date: i64,
}

impl LocationRecord {
    /// Attaches the geocoding result, producing a new record.
    pub fn resolve(self, coordinates: Option<Coordinates>) -> ResolvedLocation {
        ResolvedLocation {
            record: self,
            coordinates,
        }
    }
}

/// A [`LocationRecord`] after geocoding. `coordinates` is `None` when the
/// geocoder had no match; such a location is never sent to the weather service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub record: LocationRecord,
    pub coordinates: Option<Coordinates>,
}

impl ResolvedLocation {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Reads the location file: a header row, then
/// `locationId,postalCode,startDateEpoch,endDateEpoch` per line.
///
/// Row order is preserved. Extra trailing fields are ignored.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_locations(path: &Path) -> Result<Vec<LocationRecord>, PipelineError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::InputRead(path.to_path_buf(), e))?;

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(|e| PipelineError::InputRead(path.to_path_buf(), e))?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        let record = parse_row(&row).map_err(|reason| PipelineError::InputFormat {
            path: path.to_path_buf(),
            line,
            reason,
        })?;
        debug!(location_id = %record.id, line, "Loaded location");
        records.push(record);
    }

    info!(locations = records.len(), "Location file loaded");
    Ok(records)
}

fn parse_row(row: &StringRecord) -> Result<LocationRecord, String> {
    if row.len() < 4 {
        return Err(format!("expected 4 fields, found {}", row.len()));
    }

    let epoch = |idx: usize, name: &str| {
        row[idx]
            .parse::<i64>()
            .map_err(|_| format!("{name} '{}' is not an integer timestamp", &row[idx]))
    };
    let start_date = epoch(2, "startDate")?;
    let end_date = epoch(3, "endDate")?;

    for ts in [start_date, end_date] {
        if DateTime::<Utc>::from_timestamp(ts, 0).is_none() {
            return Err(format!("timestamp {ts} is out of range"));
        }
    }

    if start_date > end_date {
        return Err(format!(
            "startDate {start_date} is after endDate {end_date}"
        ));
    }

    Ok(LocationRecord {
        id: row[0].to_string(),
        postal_code: row[1].to_string(),
        start_date,
        end_date,
    })
}
