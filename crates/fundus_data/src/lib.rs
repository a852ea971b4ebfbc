//! Dataset loading, class weighting, and Burn-compatible batching for
//! diabetic-retinopathy fundus image training.
//!
//! The pieces, bottom to top:
//! - [`labels`]: strict CSV label loading in row order.
//! - [`loader`]: image files resolved against a directory and decoded to RGB.
//! - [`weights`]: inverse-frequency class weights and the per-sample vector.
//! - [`aug`]: the randomized training and deterministic evaluation transforms.
//! - [`dataset`]: the composed dataset with indexed sample access.
//! - [`splits`]: train/validation splitting over label records.
//! - [`validation`]: permissive label scans and threshold gates.
//! - [`batch`] (feature `burn-runtime`): tensor batch iteration.

pub mod aug;
pub mod dataset;
pub mod labels;
pub mod loader;
pub mod splits;
pub mod types;
pub mod validation;
pub mod weights;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use aug::{
    AugmentConfig, EvalTransform, TrainAugment, TransformPipeline, TransformPipelineBuilder,
};
pub use dataset::{create_datasets, create_datasets_with_config, FundusDataset};
pub use labels::LabelStore;
pub use loader::ImageLoader;
pub use splits::{count_grades, split_records, split_records_stratified};
pub use types::*;
pub use validation::{apply_thresholds, summarize_labels, validate_labels};
pub use weights::ClassWeights;

#[cfg(feature = "burn-runtime")]
pub use batch::{epoch_iters, BatchIter, BurnBatch};
