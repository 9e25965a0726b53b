//! Concatenation of per-location series and the location × day pivot.

use crate::series::DailyObservation;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// All observations of a run: input location order, then chronological.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatDataset {
    rows: Vec<DailyObservation>,
}

impl FlatDataset {
    pub fn concat(series: impl IntoIterator<Item = Vec<DailyObservation>>) -> Self {
        Self {
            rows: series.into_iter().flatten().collect(),
        }
    }

    pub fn rows(&self) -> &[DailyObservation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of metric names over all rows, alphabetical.
    pub fn metric_columns(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flat_map(|r| r.metrics.keys().map(String::as_str))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// A sparse location × day table of one metric.
///
/// Rows follow the caller's location order; columns are ascending days.
/// Absent cells are missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    metric: String,
    rows: Vec<String>,
    columns: Vec<NaiveDate>,
    cells: HashMap<(usize, usize), f64>,
}

impl Matrix {
    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn row_keys(&self) -> &[String] {
        &self.rows
    }

    pub fn column_keys(&self) -> &[NaiveDate] {
        &self.columns
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<f64> {
        self.cells.get(&(row, column)).copied()
    }

    /// Looks a cell up by its keys.
    pub fn get(&self, location_id: &str, day: NaiveDate) -> Option<f64> {
        let row = self.rows.iter().position(|r| r == location_id)?;
        let column = self.columns.binary_search(&day).ok()?;
        self.cell(row, column)
    }

    /// One row, with `None` for each missing cell.
    pub fn row_values(&self, row: usize) -> Vec<Option<f64>> {
        (0..self.columns.len()).map(|c| self.cell(row, c)).collect()
    }
}

/// Pivots `dataset` into a location × day matrix of `metric`.
///
/// Cells holding several numeric values (a location id repeated in the
/// input) take their mean; non-numeric values count as missing. Every day
/// seen in the dataset becomes a column, even if no location has a numeric
/// value for it. Rows are `original_order`, deduplicated, so a location with
/// no observations still gets an all-missing row and ids absent from
/// `original_order` are dropped.
pub fn reshape(dataset: &FlatDataset, metric: &str, original_order: &[String]) -> Matrix {
    let mut rows: Vec<String> = Vec::with_capacity(original_order.len());
    let mut row_index: HashMap<&str, usize> = HashMap::new();
    for id in original_order {
        if !row_index.contains_key(id.as_str()) {
            row_index.insert(id, rows.len());
            rows.push(id.clone());
        }
    }

    let columns: Vec<NaiveDate> = dataset
        .rows()
        .iter()
        .map(|r| r.day)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let column_index: HashMap<NaiveDate, usize> =
        columns.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut sums: HashMap<(usize, usize), (f64, usize)> = HashMap::new();
    for obs in dataset.rows() {
        let (Some(&row), Some(value)) = (row_index.get(obs.location_id.as_str()), obs.numeric(metric))
        else {
            continue;
        };
        let entry = sums.entry((row, column_index[&obs.day])).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    let cells = sums
        .into_iter()
        .map(|(key, (sum, n))| (key, sum / n as f64))
        .collect();

    Matrix {
        metric: metric.to_string(),
        rows,
        columns,
        cells,
    }
}
