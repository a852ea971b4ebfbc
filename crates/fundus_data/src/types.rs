//! Core types, error definitions, and data structures for fundus_data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, FundusDataError>;

#[derive(Debug, Error)]
pub enum FundusDataError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv parse error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("label validation failed at {path}: {msg}")]
    Validation { path: PathBuf, msg: String },
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("image file missing for {image_id}: {path}")]
    MissingImageFile { image_id: String, path: PathBuf },
    #[error("image decode error at {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{0}")]
    Other(String),
}

/// Diabetic retinopathy severity on the international 0-4 grading scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Grade {
    NoDr = 0,
    Mild = 1,
    Moderate = 2,
    Severe = 3,
    Proliferative = 4,
}

impl Grade {
    pub const COUNT: usize = 5;
    pub const ALL: [Grade; Grade::COUNT] = [
        Grade::NoDr,
        Grade::Mild,
        Grade::Moderate,
        Grade::Severe,
        Grade::Proliferative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::NoDr => "No DR",
            Grade::Mild => "Mild",
            Grade::Moderate => "Moderate",
            Grade::Severe => "Severe",
            Grade::Proliferative => "Proliferative",
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Grade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Grade::NoDr),
            1 => Ok(Grade::Mild),
            2 => Ok(Grade::Moderate),
            3 => Ok(Grade::Severe),
            4 => Ok(Grade::Proliferative),
            other => Err(format!("label {other} outside the DR grade range 0-4")),
        }
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> u8 {
        grade as u8
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled fundus image. Collection order is CSV row order; it defines
/// dataset index order and the alignment of per-sample weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub image_id: String,
    pub grade: Grade,
}

/// Output of the transform stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedImage {
    /// Image in CHW layout, normalized to [0, 1].
    pub pixels: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

/// One dataset entry: transformed image plus its grade as a class index.
#[derive(Debug, Clone)]
pub struct DatasetSample {
    /// Image in CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
    /// DR grade as an integer class index (0-4).
    pub label: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Stretch to fill the target dimensions.
    Force,
    /// Preserve aspect ratio; pad to target with zeros.
    Letterbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetMode {
    /// Randomized augmentation; class weights computed at construction.
    Training,
    /// Deterministic resize only; no class weights.
    Evaluation,
}

impl DatasetMode {
    pub fn is_training(&self) -> bool {
        matches!(self, DatasetMode::Training)
    }
}

/// Per-row quality tallies from a permissive labels scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_rows: usize,
    /// Rows with a valid grade and an image file on disk.
    pub usable: usize,
    pub per_grade: BTreeMap<Grade, usize>,
    pub missing_file: usize,
    pub invalid_label: usize,
    pub blank_id: usize,
}

impl DatasetSummary {
    pub fn problem_rows(&self) -> usize {
        self.missing_file + self.invalid_label + self.blank_id
    }

    /// Largest-to-smallest present-grade count ratio; 1.0 with fewer than
    /// two grades present.
    pub fn imbalance_ratio(&self) -> f32 {
        let mut min = usize::MAX;
        let mut max = 0usize;
        for &count in self.per_grade.values() {
            min = min.min(count);
            max = max.max(count);
        }
        if self.per_grade.len() < 2 || min == 0 {
            1.0
        } else {
            max as f32 / min as f32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Pass => "pass",
            ValidationOutcome::Warn => "warn",
            ValidationOutcome::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationThresholds {
    pub max_missing: Option<usize>,
    pub max_invalid: Option<usize>,
    pub max_missing_ratio: Option<f32>,
    pub max_invalid_ratio: Option<f32>,
    pub max_imbalance_ratio: Option<f32>,
}

impl ValidationThresholds {
    pub fn from_env() -> Self {
        fn parse_usize(key: &str) -> Option<usize> {
            std::env::var(key).ok()?.parse().ok()
        }
        fn parse_ratio(key: &str) -> Option<f32> {
            std::env::var(key).ok()?.parse().ok()
        }
        ValidationThresholds {
            max_missing: parse_usize("FUNDUS_DATA_MAX_MISSING"),
            max_invalid: parse_usize("FUNDUS_DATA_MAX_INVALID"),
            max_missing_ratio: parse_ratio("FUNDUS_DATA_MAX_MISSING_RATIO"),
            max_invalid_ratio: parse_ratio("FUNDUS_DATA_MAX_INVALID_RATIO"),
            max_imbalance_ratio: parse_ratio("FUNDUS_DATA_MAX_IMBALANCE_RATIO"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub reasons: Vec<String>,
    pub summary: DatasetSummary,
}
