//! Report writers: the flat per-day CSV and the pivoted spreadsheet.
//!
//! Both outputs render a missing value as the literal text `NaN`.

use chrono::NaiveDate;
use csv::WriterBuilder;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Format, Workbook, XlsxError};
use serde_json::Value;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pivot::{FlatDataset, Matrix};

/// Marker written wherever a value is missing.
pub const MISSING: &str = "NaN";

pub const LOCATION_COLUMN: &str = "locationId";
pub const DAY_COLUMN: &str = "day";

const SHEET_NAME: &str = "Sheet1";
const PERCENT_FORMAT: &str = "0%";

fn day_label(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn render(value: Option<&Value>) -> Cow<'_, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(MISSING),
        Some(Value::String(s)) => Cow::Borrowed(s),
        Some(Value::Number(n)) => Cow::Owned(n.to_string()),
        Some(Value::Bool(b)) => Cow::Owned(b.to_string()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

/// Writes one row per observation: `locationId`, `day`, then the union of
/// metric names in alphabetical order. No index column. A metric named like
/// one of the two leading columns is dropped rather than written twice.
#[tracing::instrument(skip_all, fields(path = %path.display(), rows = dataset.len()))]
pub fn write_flat_csv(dataset: &FlatDataset, path: &Path) -> Result<(), PipelineError> {
    let columns: Vec<&str> = dataset
        .metric_columns()
        .into_iter()
        .filter(|c| *c != LOCATION_COLUMN && *c != DAY_COLUMN)
        .collect();
    debug!(columns = columns.len(), "Writing flat CSV");

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| PipelineError::write(path, e))?;

    let header = [LOCATION_COLUMN, DAY_COLUMN]
        .into_iter()
        .chain(columns.iter().copied());
    writer
        .write_record(header)
        .map_err(|e| PipelineError::write(path, e))?;

    for row in dataset.rows() {
        let day = day_label(row.day);
        let record = [Cow::Borrowed(row.location_id.as_str()), Cow::Owned(day)]
            .into_iter()
            .chain(columns.iter().map(|c| render(row.metrics.get(*c))));
        writer
            .write_record(record.map(|f| f.into_owned()))
            .map_err(|e| PipelineError::write(path, e))?;
    }

    writer.flush().map_err(|e| PipelineError::write(path, e))?;
    info!("Flat CSV written");
    Ok(())
}

/// Writes the matrix to a single-sheet workbook. Column A holds location ids,
/// row 1 the day labels, and every day column is formatted as a percentage.
#[tracing::instrument(skip_all, fields(path = %path.display(), metric = matrix.metric()))]
pub fn write_matrix_xlsx(matrix: &Matrix, path: &Path) -> Result<(), PipelineError> {
    let mut workbook = build_workbook(matrix).map_err(|e| PipelineError::write(path, e))?;
    workbook
        .save(path)
        .map_err(|e| PipelineError::write(path, e))?;

    info!(
        rows = matrix.row_keys().len(),
        columns = matrix.column_keys().len(),
        "Spreadsheet written"
    );
    Ok(())
}

fn build_workbook(matrix: &Matrix) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();

    // Pinned so identical inputs give identical files.
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    let header = Format::new().set_bold();
    let percent = Format::new().set_num_format(PERCENT_FORMAT);

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    sheet.write_string_with_format(0, 0, LOCATION_COLUMN, &header)?;

    for (c, day) in matrix.column_keys().iter().enumerate() {
        let col = sheet_column(c);
        sheet.write_string_with_format(0, col, day_label(*day), &header)?;
        sheet.set_column_format(col, &percent)?;
    }

    for (r, location_id) in matrix.row_keys().iter().enumerate() {
        let row = (r + 1) as u32;
        sheet.write_string_with_format(row, 0, location_id, &header)?;

        for (c, value) in matrix.row_values(r).into_iter().enumerate() {
            let col = sheet_column(c);
            match value {
                Some(v) => sheet.write_number_with_format(row, col, v, &percent)?,
                None => sheet.write_string(row, col, MISSING)?,
            };
        }
    }

    Ok(workbook)
}

/// Sheet column of day `c`; out-of-range values are left for the writer to reject.
fn sheet_column(c: usize) -> u16 {
    u16::try_from(c + 1).unwrap_or(u16::MAX)
}
