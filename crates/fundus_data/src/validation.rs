//! Label-quality scanning and threshold gates.
//!
//! [`LabelStore::load`](crate::labels::LabelStore::load) is strict and
//! fails on the first bad row. The scan here is the permissive
//! counterpart for tooling: every row is tallied, nothing short of an
//! unreadable file fails the scan, and thresholds decide afterwards
//! whether the tallies are acceptable.

use std::fs::File;
use std::path::Path;

use crate::types::{
    DatasetResult, DatasetSummary, FundusDataError, Grade, ValidationOutcome, ValidationReport,
    ValidationThresholds,
};

/// Scan a labels CSV and tally row quality against the image directory.
pub fn summarize_labels(
    csv_path: impl AsRef<Path>,
    image_dir: impl AsRef<Path>,
) -> DatasetResult<DatasetSummary> {
    let csv_path = csv_path.as_ref();
    let image_dir = image_dir.as_ref();

    let file = File::open(csv_path).map_err(|source| FundusDataError::Io {
        path: csv_path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| FundusDataError::Csv {
            path: csv_path.to_path_buf(),
            source,
        })?
        .clone();
    let id_col = headers.iter().position(|h| h == "image_id");
    let label_col = headers.iter().position(|h| h == "label");
    let (Some(id_col), Some(label_col)) = (id_col, label_col) else {
        return Err(FundusDataError::Validation {
            path: csv_path.to_path_buf(),
            msg: "missing image_id or label column".to_string(),
        });
    };

    let mut summary = DatasetSummary::default();
    for record in reader.records() {
        summary.total_rows += 1;
        let Ok(record) = record else {
            summary.invalid_label += 1;
            continue;
        };
        let image_id = record.get(id_col).unwrap_or("").trim();
        let label = record.get(label_col).unwrap_or("").trim();
        if image_id.is_empty() {
            summary.blank_id += 1;
            continue;
        }
        let grade = label
            .parse::<u8>()
            .ok()
            .and_then(|v| Grade::try_from(v).ok());
        let Some(grade) = grade else {
            summary.invalid_label += 1;
            continue;
        };
        if !image_dir.join(image_id).is_file() {
            summary.missing_file += 1;
            continue;
        }
        summary.usable += 1;
        *summary.per_grade.entry(grade).or_insert(0) += 1;
    }
    Ok(summary)
}

/// Grade a summary against thresholds. Unset thresholds never fail; any
/// nonzero problem tally still warns so it shows up in tool output.
pub fn apply_thresholds(
    summary: &DatasetSummary,
    thresholds: &ValidationThresholds,
) -> ValidationReport {
    let mut outcome = ValidationOutcome::Pass;
    let mut reasons = Vec::new();
    let total = summary.total_rows.max(1);

    if summary.usable == 0 && summary.total_rows > 0 {
        outcome = ValidationOutcome::Fail;
        reasons.push("no usable rows".to_string());
    }

    check_tally(
        "missing image files",
        summary.missing_file,
        total,
        thresholds.max_missing,
        thresholds.max_missing_ratio,
        &mut outcome,
        &mut reasons,
    );
    check_tally(
        "invalid rows",
        summary.invalid_label + summary.blank_id,
        total,
        thresholds.max_invalid,
        thresholds.max_invalid_ratio,
        &mut outcome,
        &mut reasons,
    );

    if let Some(max_ratio) = thresholds.max_imbalance_ratio {
        let ratio = summary.imbalance_ratio();
        if ratio > max_ratio {
            outcome = ValidationOutcome::Fail;
            reasons.push(format!(
                "grade imbalance ratio {ratio:.1} exceeds {max_ratio:.1}"
            ));
        }
    }

    ValidationReport {
        outcome,
        reasons,
        summary: summary.clone(),
    }
}

fn check_tally(
    kind: &str,
    count: usize,
    total: usize,
    max_count: Option<usize>,
    max_ratio: Option<f32>,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) {
    if count == 0 {
        return;
    }
    let ratio = count as f32 / total as f32;
    if max_count.is_some_and(|m| count > m) || max_ratio.is_some_and(|m| ratio > m) {
        *outcome = ValidationOutcome::Fail;
        reasons.push(format!("{count} {kind} ({:.1}% of rows)", ratio * 100.0));
    } else {
        if *outcome == ValidationOutcome::Pass {
            *outcome = ValidationOutcome::Warn;
        }
        reasons.push(format!("{count} {kind}"));
    }
}

/// Scan and grade in one call.
pub fn validate_labels(
    csv_path: impl AsRef<Path>,
    image_dir: impl AsRef<Path>,
    thresholds: &ValidationThresholds,
) -> DatasetResult<ValidationReport> {
    let summary = summarize_labels(csv_path, image_dir)?;
    Ok(apply_thresholds(&summary, thresholds))
}
