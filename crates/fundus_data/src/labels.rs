//! Label CSV loading and indexed access.

use crate::types::{DatasetResult, FundusDataError, Grade, LabelRecord};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

#[derive(Deserialize)]
struct LabelRow {
    image_id: String,
    label: i64,
}

/// The label table backing a dataset: one record per CSV row, in row order.
///
/// Loading is strict. Every failure mode (unreadable file, malformed CSV,
/// missing column, out-of-range label, blank image id) aborts construction;
/// a dataset never comes up with silently dropped rows.
#[derive(Debug, Clone)]
pub struct LabelStore {
    records: Vec<LabelRecord>,
}

impl LabelStore {
    /// Load labels from a CSV with `image_id` and `label` columns. Extra
    /// columns are ignored. A header with zero data rows loads as an empty
    /// store.
    pub fn load(csv_path: impl AsRef<Path>) -> DatasetResult<Self> {
        let csv_path = csv_path.as_ref();
        let file = File::open(csv_path).map_err(|e| FundusDataError::Io {
            path: csv_path.to_path_buf(),
            source: e,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(file);

        let mut records = Vec::new();
        for (row_idx, row) in reader.deserialize::<LabelRow>().enumerate() {
            let row = row.map_err(|e| FundusDataError::Csv {
                path: csv_path.to_path_buf(),
                source: e,
            })?;
            // Row numbers in error messages are 1-based over data rows.
            records.push(parse_row(row, row_idx + 1, csv_path)?);
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, index: usize) -> DatasetResult<&LabelRecord> {
        self.records.get(index).ok_or(FundusDataError::IndexOutOfRange {
            index,
            len: self.records.len(),
        })
    }

    pub fn records(&self) -> &[LabelRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LabelRecord> {
        self.records
    }

    /// Grades in index order.
    pub fn grades(&self) -> impl Iterator<Item = Grade> + '_ {
        self.records.iter().map(|r| r.grade)
    }
}

fn parse_row(row: LabelRow, row_idx: usize, path: &Path) -> DatasetResult<LabelRecord> {
    if row.image_id.trim().is_empty() {
        return Err(FundusDataError::Validation {
            path: path.to_path_buf(),
            msg: format!("row {row_idx}: empty image_id"),
        });
    }
    let grade = u8::try_from(row.label)
        .ok()
        .and_then(|v| Grade::try_from(v).ok())
        .ok_or_else(|| FundusDataError::Validation {
            path: path.to_path_buf(),
            msg: format!(
                "row {row_idx}: label {} outside the DR grade range 0-4",
                row.label
            ),
        })?;
    Ok(LabelRecord {
        image_id: row.image_id,
        grade,
    })
}
