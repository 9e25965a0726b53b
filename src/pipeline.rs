//! Orchestration: load → geocode → fetch series → reshape → write.

use crate::config::{FailurePolicy, Paths, RunSettings};
use crate::error::PipelineError;
use crate::location::{LocationRecord, ResolvedLocation, load_locations};
use crate::output::{write_flat_csv, write_matrix_xlsx};
use crate::pivot::{FlatDataset, Matrix, reshape};
use crate::series::SeriesBuilder;
use crate::services::geocoding_api::GeocodingApi;
use crate::services::weather_api::WeatherApi;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a run produces before it is written out.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub dataset: FlatDataset,
    pub matrix: Matrix,
}

pub struct Pipeline<G, W> {
    geocoder: Arc<G>,
    series: SeriesBuilder<W>,
    settings: RunSettings,
}

impl<G, W> Pipeline<G, W>
where
    G: GeocodingApi,
    W: WeatherApi + 'static,
{
    pub fn new(geocoder: Arc<G>, weather: Arc<W>, settings: RunSettings) -> Self {
        Self {
            series: SeriesBuilder::new(weather, &settings),
            geocoder,
            settings,
        }
    }

    /// Resolves every record, in input order. A postal code without a match
    /// yields a location without coordinates.
    pub async fn geocode(
        &self,
        records: Vec<LocationRecord>,
    ) -> Result<Vec<ResolvedLocation>, PipelineError> {
        let mut resolved = Vec::with_capacity(records.len());
        for record in records {
            let coordinates = match self.geocoder.resolve(&record.postal_code).await {
                Ok(Some(coordinates)) => Some(coordinates),
                Ok(None) => {
                    warn!(
                        location_id = %record.id,
                        postal_code = %record.postal_code,
                        "No geocoding match"
                    );
                    None
                }
                Err(source) => {
                    let err = PipelineError::GeocodeService {
                        postal_code: record.postal_code.clone(),
                        source,
                    };
                    match self.settings.on_error {
                        FailurePolicy::Abort => return Err(err),
                        FailurePolicy::Skip => {
                            warn!(location_id = %record.id, error = %err, "Skipping location");
                            None
                        }
                    }
                }
            };
            resolved.push(record.resolve(coordinates));
        }
        Ok(resolved)
    }

    /// Runs every stage but the writers.
    #[tracing::instrument(skip_all, fields(locations = records.len(), metric = %self.settings.metric))]
    pub async fn execute(&self, records: Vec<LocationRecord>) -> Result<Report, PipelineError> {
        let original_order: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        let resolved = self.geocode(records).await?;
        let series = self.series.build_all(&resolved).await?;

        let dataset = FlatDataset::concat(series);
        let matrix = reshape(&dataset, &self.settings.metric, &original_order);

        info!(
            rows = dataset.len(),
            matrix_rows = matrix.row_keys().len(),
            matrix_columns = matrix.column_keys().len(),
            "Pipeline complete"
        );
        Ok(Report { dataset, matrix })
    }

    /// Loads `paths.input`, runs the pipeline and writes both outputs.
    /// Nothing is written unless every earlier stage succeeded. The flat CSV
    /// is staged beside its destination and only moved into place once the
    /// workbook has been saved.
    pub async fn run(&self, paths: &Paths) -> Result<Report, PipelineError> {
        let records = load_locations(&paths.input)?;
        let report = self.execute(records).await?;

        let staged = staging_path(&paths.flat_output);
        let written = write_flat_csv(&report.dataset, &staged)
            .and_then(|()| write_matrix_xlsx(&report.matrix, &paths.report_output))
            .and_then(|()| {
                fs::rename(&staged, &paths.flat_output)
                    .map_err(|e| PipelineError::write(&paths.flat_output, e))
            });
        if let Err(err) = written {
            if let Err(e) = fs::remove_file(&staged) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %staged.display(), error = %e, "Could not remove staged CSV");
                }
            }
            return Err(err);
        }

        Ok(report)
    }
}

/// `daily_weather_info.csv` → `.daily_weather_info.csv.partial`, same directory.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}
