//! Batch iteration over a dataset for the Burn runtime.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::dataset::FundusDataset;
use crate::types::{DatasetResult, FundusDataError};

pub(crate) const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;

/// One training batch: images as `[batch, 3, H, W]` floats in [0, 1],
/// labels as `[batch]` class indices.
#[derive(Debug)]
pub struct BurnBatch<B: burn::tensor::backend::Backend> {
    pub images: burn::tensor::Tensor<B, 4>,
    pub labels: burn::tensor::Tensor<B, 1, burn::tensor::Int>,
}

/// Draws samples from a borrowed [`FundusDataset`] in a fixed visit order
/// and assembles them into tensors.
///
/// The visit order is decided at construction: [`sequential`](Self::sequential)
/// for evaluation, [`shuffled`](Self::shuffled) for plain epoch shuffling,
/// [`weighted`](Self::weighted) for imbalance-corrected sampling with
/// replacement. Sample errors fail the batch by default; set
/// `FUNDUS_DATA_PERMISSIVE=1` to skip bad samples with a warning instead.
///
/// Progress lines go to stderr every `FUNDUS_DATA_LOG_EVERY` samples
/// (default 1000, `off`/`0` disables). `FUNDUS_DATA_WARN_ONCE=1` caps
/// repeated warnings; `FUNDUS_DATA_TRACE=<path>` appends per-batch JSONL
/// timing records.
pub struct BatchIter<'d> {
    dataset: &'d FundusDataset,
    order: Vec<usize>,
    cursor: usize,
    drop_last: bool,
    processed_samples: usize,
    processed_batches: usize,
    skipped_errors: usize,
    warn_once: bool,
    warned_skip: bool,
    started: Instant,
    total_load_time: Duration,
    total_assemble_time: Duration,
    last_log: Instant,
    last_logged_samples: usize,
    log_every_samples: Option<usize>,
    permissive_errors: bool,
    images_buf: Vec<f32>,
    labels_buf: Vec<i64>,
    trace_path: Option<PathBuf>,
    trace_file: Option<std::fs::File>,
}

impl<'d> BatchIter<'d> {
    /// Visit every sample once, in CSV row order.
    pub fn sequential(dataset: &'d FundusDataset) -> Self {
        let order = (0..dataset.len()).collect();
        Self::with_order(dataset, order)
    }

    /// Visit every sample once, in a shuffled order.
    pub fn shuffled(dataset: &'d FundusDataset, seed: Option<u64>) -> Self {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        let mut rng = match seed {
            Some(s) => rand::rngs::StdRng::seed_from_u64(s),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        order.shuffle(&mut rng);
        Self::with_order(dataset, order)
    }

    /// Draw `dataset.len()` samples with replacement, each index weighted
    /// by its class weight so rare grades are revisited more often.
    pub fn weighted(dataset: &'d FundusDataset, seed: Option<u64>) -> DatasetResult<Self> {
        let weights = dataset.sample_weights();
        if weights.is_empty() {
            return Err(FundusDataError::Other(
                "weighted iteration needs a training-mode dataset with sample weights".to_string(),
            ));
        }
        let dist = WeightedIndex::new(weights)
            .map_err(|e| FundusDataError::Other(format!("invalid sample weights: {e}")))?;
        let mut rng = match seed {
            Some(s) => rand::rngs::StdRng::seed_from_u64(s),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        let order = (0..dataset.len()).map(|_| dist.sample(&mut rng)).collect();
        Ok(Self::with_order(dataset, order))
    }

    fn with_order(dataset: &'d FundusDataset, order: Vec<usize>) -> Self {
        let log_every_samples = match std::env::var("FUNDUS_DATA_LOG_EVERY") {
            Ok(val) => {
                if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
                    None
                } else {
                    val.parse::<usize>().ok().filter(|v| *v > 0)
                }
            }
            Err(_) => Some(DEFAULT_LOG_EVERY_SAMPLES),
        };
        let permissive_errors = std::env::var("FUNDUS_DATA_PERMISSIVE")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .map(|v| v == "1" || v == "true" || v == "on")
            .unwrap_or(false);
        let warn_once = std::env::var("FUNDUS_DATA_WARN_ONCE")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .map(|v| v == "1" || v == "true" || v == "on")
            .unwrap_or(false);
        let trace_path = std::env::var("FUNDUS_DATA_TRACE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let now = Instant::now();
        Self {
            dataset,
            order,
            cursor: 0,
            drop_last: false,
            processed_samples: 0,
            processed_batches: 0,
            skipped_errors: 0,
            warn_once,
            warned_skip: false,
            started: now,
            total_load_time: Duration::ZERO,
            total_assemble_time: Duration::ZERO,
            last_log: now,
            last_logged_samples: 0,
            log_every_samples,
            permissive_errors,
            images_buf: Vec::new(),
            labels_buf: Vec::new(),
            trace_path,
            trace_file: None,
        }
    }

    /// Discard a trailing partial batch instead of yielding it.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Number of samples this iterator will visit in total.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn next_batch<B: burn::tensor::backend::Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<BurnBatch<B>>> {
        if batch_size == 0 {
            return Err(FundusDataError::Other(
                "batch_size must be nonzero".to_string(),
            ));
        }
        loop {
            if self.cursor >= self.order.len() {
                return Ok(None);
            }
            let end = (self.cursor + batch_size).min(self.order.len());
            let slice = &self.order[self.cursor..end];
            self.cursor = end;

            self.images_buf.clear();
            self.labels_buf.clear();

            let (target_w, target_h) = self.dataset.pipeline().target_size();
            let elems = batch_size * 3 * target_w as usize * target_h as usize;
            self.images_buf.reserve(elems);
            self.labels_buf.reserve(batch_size);

            let t_load = Instant::now();
            let dataset = self.dataset;
            let mut loaded: Vec<_> = slice
                .par_iter()
                .enumerate()
                .map(|(i, &idx)| (i, idx, dataset.get(idx)))
                .collect();
            loaded.sort_by_key(|(i, _, _)| *i);
            let load_elapsed = t_load.elapsed();

            for (_i, idx, res) in loaded {
                let sample = match res {
                    Ok(s) => s,
                    Err(e) => {
                        if self.permissive_errors {
                            if !self.warn_once || !self.warned_skip {
                                eprintln!("Warning: skipping sample {idx}: {e}");
                                self.warned_skip = true;
                            }
                            self.skipped_errors += 1;
                            continue;
                        } else {
                            return Err(e);
                        }
                    }
                };
                self.images_buf.extend_from_slice(&sample.image_chw);
                self.labels_buf.push(sample.label);
            }

            if self.labels_buf.is_empty() {
                // Every sample in this slice was skipped; try the next slice.
                if self.cursor >= self.order.len() {
                    return Ok(None);
                }
                continue;
            }

            let batch_len = self.labels_buf.len();
            if self.drop_last && batch_len < batch_size {
                if self.cursor >= self.order.len() {
                    return Ok(None);
                }
                continue;
            }

            let t_assemble = Instant::now();
            let image_shape = [batch_len, 3, target_h as usize, target_w as usize];
            let images =
                burn::tensor::Tensor::<B, 1>::from_floats(self.images_buf.as_slice(), device)
                    .reshape(image_shape);
            let labels = burn::tensor::Tensor::<B, 1, burn::tensor::Int>::from_data(
                burn::tensor::TensorData::new(self.labels_buf.clone(), [batch_len]),
                device,
            );
            let assemble_elapsed = t_assemble.elapsed();

            self.processed_samples += batch_len;
            self.processed_batches += 1;
            self.total_load_time += load_elapsed;
            self.total_assemble_time += assemble_elapsed;
            self.maybe_trace(
                batch_len,
                target_w as usize,
                target_h as usize,
                load_elapsed,
                assemble_elapsed,
            );
            self.maybe_log_progress();

            return Ok(Some(BurnBatch { images, labels }));
        }
    }

    fn maybe_log_progress(&mut self) {
        let Some(threshold) = self.log_every_samples else {
            return;
        };
        let processed_since = self
            .processed_samples
            .saturating_sub(self.last_logged_samples);
        let elapsed = self.started.elapsed();
        let since_last = self.last_log.elapsed();
        let should_log = processed_since >= threshold || since_last >= Duration::from_secs(30);
        if !should_log {
            return;
        }
        let secs = elapsed.as_secs_f32().max(0.001);
        let rate = self.processed_samples as f32 / secs;
        let avg_load_ms = if self.processed_batches > 0 {
            (self.total_load_time.as_secs_f64() * 1000.0) / self.processed_batches as f64
        } else {
            0.0
        };
        let avg_assemble_ms = if self.processed_batches > 0 {
            (self.total_assemble_time.as_secs_f64() * 1000.0) / self.processed_batches as f64
        } else {
            0.0
        };
        eprintln!(
            "[dataset] batches={} samples={} skipped_errors={} elapsed={:.1}s rate={:.1} img/s avg_load_ms={:.2} avg_assemble_ms={:.2}",
            self.processed_batches,
            self.processed_samples,
            self.skipped_errors,
            secs,
            rate,
            avg_load_ms,
            avg_assemble_ms
        );
        self.last_logged_samples = self.processed_samples;
        self.last_log = Instant::now();
    }

    fn maybe_trace(
        &mut self,
        batch_len: usize,
        width: usize,
        height: usize,
        load_elapsed: Duration,
        assemble_elapsed: Duration,
    ) {
        let Some(path) = &self.trace_path else {
            return;
        };
        if self.trace_file.is_none() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => self.trace_file = Some(f),
                Err(e) => {
                    eprintln!("Failed to open trace file {}: {e}", path.display());
                    self.trace_path = None;
                    return;
                }
            }
        }
        let Some(file) = self.trace_file.as_mut() else {
            return;
        };
        let record = serde_json::json!({
            "batch": self.processed_batches,
            "samples": batch_len,
            "width": width,
            "height": height,
            "skipped_errors_total": self.skipped_errors,
            "load_ms": load_elapsed.as_secs_f64() * 1000.0,
            "assemble_ms": assemble_elapsed.as_secs_f64() * 1000.0,
            "timestamp_ms": std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        });
        if let Err(e) = writeln!(file, "{}", record) {
            eprintln!("Failed to write trace record: {e}");
            self.trace_path = None;
            self.trace_file = None;
        }
    }
}

/// The conventional pair of per-epoch iterators: weighted sampling over
/// the training split, a sequential pass over the validation split.
pub fn epoch_iters<'d>(
    train: &'d FundusDataset,
    val: &'d FundusDataset,
    seed: Option<u64>,
) -> DatasetResult<(BatchIter<'d>, BatchIter<'d>)> {
    let train_iter = BatchIter::weighted(train, seed)?;
    let val_iter = BatchIter::sequential(val);
    Ok((train_iter, val_iter))
}
