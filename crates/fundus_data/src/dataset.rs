//! Fundus photograph dataset: CSV labels joined with on-disk images,
//! class weighting for imbalance, and a mode-selected transform stage.

use std::path::{Path, PathBuf};

use crate::aug::{AugmentConfig, TransformPipeline};
use crate::labels::LabelStore;
use crate::loader::ImageLoader;
use crate::types::{DatasetMode, DatasetResult, DatasetSample, LabelRecord};
use crate::weights::ClassWeights;

/// One diabetic-retinopathy dataset split.
///
/// Construction reads and validates the whole label CSV up front; images
/// are opened lazily, one per [`get`](Self::get). Training-mode datasets
/// carry inverse-frequency class weights and a per-sample weight vector
/// aligned with CSV row order; evaluation-mode datasets carry neither.
#[derive(Debug)]
pub struct FundusDataset {
    mode: DatasetMode,
    labels: LabelStore,
    loader: ImageLoader,
    pipeline: TransformPipeline,
    class_weights: Option<ClassWeights>,
    sample_weights: Vec<f64>,
}

impl FundusDataset {
    /// Open a dataset with the default transform configuration.
    pub fn new(
        labels_csv: impl AsRef<Path>,
        image_dir: impl Into<PathBuf>,
        mode: DatasetMode,
    ) -> DatasetResult<Self> {
        Self::with_config(labels_csv, image_dir, mode, AugmentConfig::default())
    }

    /// Open a dataset, building the transform stage for `mode` from `cfg`.
    pub fn with_config(
        labels_csv: impl AsRef<Path>,
        image_dir: impl Into<PathBuf>,
        mode: DatasetMode,
        cfg: AugmentConfig,
    ) -> DatasetResult<Self> {
        let pipeline = TransformPipeline::for_mode(mode, cfg);
        Self::with_pipeline(labels_csv, image_dir, mode, pipeline)
    }

    /// Open a dataset with a caller-supplied transform stage. The pipeline
    /// variant does not have to match `mode`; weighting follows `mode`.
    pub fn with_pipeline(
        labels_csv: impl AsRef<Path>,
        image_dir: impl Into<PathBuf>,
        mode: DatasetMode,
        pipeline: TransformPipeline,
    ) -> DatasetResult<Self> {
        let labels = LabelStore::load(labels_csv)?;
        let loader = ImageLoader::new(image_dir);

        let (class_weights, sample_weights) = match mode {
            DatasetMode::Training => {
                let table = ClassWeights::compute(labels.grades());
                let sample_weights = table.sample_weights(labels.grades());
                (Some(table), sample_weights)
            }
            DatasetMode::Evaluation => (None, Vec::new()),
        };

        Ok(Self {
            mode,
            labels,
            loader,
            pipeline,
            class_weights,
            sample_weights,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode.is_training()
    }

    pub fn labels(&self) -> &LabelStore {
        &self.labels
    }

    pub fn image_dir(&self) -> &Path {
        self.loader.dir()
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    /// The label record at `index`, in CSV row order.
    pub fn record(&self, index: usize) -> DatasetResult<&LabelRecord> {
        self.labels.record(index)
    }

    /// Per-class inverse-frequency weights. `None` in evaluation mode.
    pub fn class_weights(&self) -> Option<&ClassWeights> {
        self.class_weights.as_ref()
    }

    /// Per-sample weights aligned with CSV row order. Empty in
    /// evaluation mode.
    pub fn sample_weights(&self) -> &[f64] {
        &self.sample_weights
    }

    /// Load, decode, and transform the sample at `index`.
    ///
    /// Pure with respect to the dataset: no caching, no per-call state.
    /// A missing or undecodable image file is an error every time it is
    /// requested.
    pub fn get(&self, index: usize) -> DatasetResult<DatasetSample> {
        let record = self.labels.record(index)?;
        let img = self.loader.load(&record.image_id)?;
        let transformed = self.pipeline.apply(img, index);
        Ok(DatasetSample {
            image_chw: transformed.pixels,
            width: transformed.width,
            height: transformed.height,
            label: record.grade.as_u8() as i64,
        })
    }
}

/// Build the conventional (training, evaluation) dataset pair with
/// default transforms.
pub fn create_datasets(
    train_csv: impl AsRef<Path>,
    val_csv: impl AsRef<Path>,
    train_image_dir: impl Into<PathBuf>,
    val_image_dir: impl Into<PathBuf>,
) -> DatasetResult<(FundusDataset, FundusDataset)> {
    create_datasets_with_config(
        train_csv,
        val_csv,
        train_image_dir,
        val_image_dir,
        AugmentConfig::default(),
    )
}

/// Build the (training, evaluation) dataset pair sharing one transform
/// configuration. The training split gets the randomized pipeline, the
/// validation split the deterministic resize.
pub fn create_datasets_with_config(
    train_csv: impl AsRef<Path>,
    val_csv: impl AsRef<Path>,
    train_image_dir: impl Into<PathBuf>,
    val_image_dir: impl Into<PathBuf>,
    cfg: AugmentConfig,
) -> DatasetResult<(FundusDataset, FundusDataset)> {
    let train = FundusDataset::with_config(
        train_csv,
        train_image_dir,
        DatasetMode::Training,
        cfg.clone(),
    )?;
    let val = FundusDataset::with_config(val_csv, val_image_dir, DatasetMode::Evaluation, cfg)?;
    Ok((train, val))
}
