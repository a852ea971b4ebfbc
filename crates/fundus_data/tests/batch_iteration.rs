//! Integration tests for tensor batch iteration (burn-runtime feature).
#![cfg(feature = "burn-runtime")]

use burn::tensor::backend::Backend;
use fundus_data::{
    create_datasets_with_config, epoch_iters, AugmentConfig, BatchIter, DatasetMode,
    FundusDataError, FundusDataset,
};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

type TestBackend = burn_ndarray::NdArray<f32>;

fn create_synthetic_dataset(root: &Path, rows: &[(&str, u8)]) -> anyhow::Result<PathBuf> {
    let images_dir = root.join("images");
    fs::create_dir_all(&images_dir)?;

    let mut csv = String::from("image_id,label\n");
    for (i, (image_id, label)) in rows.iter().enumerate() {
        csv.push_str(&format!("{image_id},{label}\n"));
        let mut img = RgbImage::new(8, 8);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([(i * 30) as u8, 128, 200]);
        }
        img.save(images_dir.join(image_id))?;
    }
    let csv_path = root.join("labels.csv");
    fs::write(&csv_path, csv)?;
    Ok(csv_path)
}

fn small_config() -> AugmentConfig {
    AugmentConfig {
        target_size: (8, 8),
        seed: Some(3),
        ..AugmentConfig::default()
    }
}

fn label_values(batch: &fundus_data::BurnBatch<TestBackend>) -> Vec<i64> {
    batch
        .labels
        .clone()
        .into_data()
        .to_vec::<i64>()
        .expect("labels convert to i64")
}

#[test]
fn batches_have_model_facing_shapes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let csv = create_synthetic_dataset(
        tmp.path(),
        &[
            ("a.png", 0),
            ("b.png", 1),
            ("c.png", 2),
            ("d.png", 3),
            ("e.png", 4),
        ],
    )?;
    let dataset = FundusDataset::with_config(
        &csv,
        tmp.path().join("images"),
        DatasetMode::Evaluation,
        small_config(),
    )?;

    let device = <TestBackend as Backend>::Device::default();
    let mut iter = BatchIter::sequential(&dataset);
    assert_eq!(iter.len(), 5);

    let batch = iter
        .next_batch::<TestBackend>(2, &device)?
        .expect("first batch");
    assert_eq!(batch.images.dims(), [2, 3, 8, 8]);
    assert_eq!(batch.labels.dims(), [2]);
    assert_eq!(label_values(&batch), vec![0, 1]);

    let batch = iter
        .next_batch::<TestBackend>(2, &device)?
        .expect("second batch");
    assert_eq!(label_values(&batch), vec![2, 3]);

    let batch = iter
        .next_batch::<TestBackend>(2, &device)?
        .expect("trailing partial batch");
    assert_eq!(batch.images.dims()[0], 1);
    assert_eq!(label_values(&batch), vec![4]);

    assert!(iter.next_batch::<TestBackend>(2, &device)?.is_none());
    Ok(())
}

#[test]
fn shuffled_iteration_still_covers_every_sample_once() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let csv = create_synthetic_dataset(
        tmp.path(),
        &[
            ("a.png", 0),
            ("b.png", 1),
            ("c.png", 2),
            ("d.png", 3),
            ("e.png", 4),
        ],
    )?;
    let dataset = FundusDataset::with_config(
        &csv,
        tmp.path().join("images"),
        DatasetMode::Evaluation,
        small_config(),
    )?;

    let device = <TestBackend as Backend>::Device::default();
    let mut iter = BatchIter::shuffled(&dataset, Some(7));
    let mut seen = Vec::new();
    while let Some(batch) = iter.next_batch::<TestBackend>(2, &device)? {
        seen.extend(label_values(&batch));
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[test]
fn drop_last_discards_the_trailing_partial_batch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let csv = create_synthetic_dataset(
        tmp.path(),
        &[
            ("a.png", 0),
            ("b.png", 1),
            ("c.png", 2),
            ("d.png", 3),
            ("e.png", 4),
        ],
    )?;
    let dataset = FundusDataset::with_config(
        &csv,
        tmp.path().join("images"),
        DatasetMode::Evaluation,
        small_config(),
    )?;

    let device = <TestBackend as Backend>::Device::default();
    let mut iter = BatchIter::sequential(&dataset).drop_last(true);
    let mut total = 0;
    let mut batches = 0;
    while let Some(batch) = iter.next_batch::<TestBackend>(2, &device)? {
        assert_eq!(batch.images.dims()[0], 2, "every yielded batch is full");
        total += batch.images.dims()[0];
        batches += 1;
    }
    assert_eq!(batches, 2);
    assert_eq!(total, 4);
    Ok(())
}

#[test]
fn weighted_iteration_requires_training_weights() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let csv = create_synthetic_dataset(tmp.path(), &[("a.png", 0), ("b.png", 2)])?;

    let eval = FundusDataset::with_config(
        &csv,
        tmp.path().join("images"),
        DatasetMode::Evaluation,
        small_config(),
    )?;
    assert!(matches!(
        BatchIter::weighted(&eval, Some(1)),
        Err(FundusDataError::Other(_))
    ));

    let train = FundusDataset::with_config(
        &csv,
        tmp.path().join("images"),
        DatasetMode::Training,
        small_config(),
    )?;
    let iter = BatchIter::weighted(&train, Some(1))?;
    assert_eq!(iter.len(), train.len(), "one epoch worth of draws");
    Ok(())
}

#[test]
fn weighted_iteration_is_reproducible_per_seed() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let csv = create_synthetic_dataset(
        tmp.path(),
        &[("a.png", 0), ("b.png", 2), ("c.png", 2), ("d.png", 4)],
    )?;
    let dataset = FundusDataset::with_config(
        &csv,
        tmp.path().join("images"),
        DatasetMode::Training,
        small_config(),
    )?;

    let device = <TestBackend as Backend>::Device::default();
    let mut first = Vec::new();
    for _ in 0..2 {
        let mut iter = BatchIter::weighted(&dataset, Some(42))?;
        let mut drawn = Vec::new();
        while let Some(batch) = iter.next_batch::<TestBackend>(2, &device)? {
            drawn.extend(label_values(&batch));
        }
        assert_eq!(drawn.len(), dataset.len());
        if first.is_empty() {
            first = drawn;
        } else {
            assert_eq!(drawn, first);
        }
    }
    Ok(())
}

#[test]
fn epoch_iters_pair_weighted_train_with_sequential_val() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let train_root = tmp.path().join("train");
    let val_root = tmp.path().join("val");
    fs::create_dir_all(&train_root)?;
    fs::create_dir_all(&val_root)?;
    let train_csv = create_synthetic_dataset(
        &train_root,
        &[("t0.png", 0), ("t1.png", 2), ("t2.png", 2), ("t3.png", 4)],
    )?;
    let val_csv = create_synthetic_dataset(&val_root, &[("v0.png", 1), ("v1.png", 3)])?;

    let (train, val) = create_datasets_with_config(
        &train_csv,
        &val_csv,
        train_root.join("images"),
        val_root.join("images"),
        small_config(),
    )?;

    let device = <TestBackend as Backend>::Device::default();
    let (mut train_iter, mut val_iter) = epoch_iters(&train, &val, Some(5))?;
    assert_eq!(train_iter.len(), train.len());
    assert_eq!(val_iter.len(), val.len());

    let val_batch = val_iter
        .next_batch::<TestBackend>(4, &device)?
        .expect("validation batch");
    assert_eq!(label_values(&val_batch), vec![1, 3], "val runs in row order");

    let train_batch = train_iter
        .next_batch::<TestBackend>(4, &device)?
        .expect("training batch");
    assert_eq!(train_batch.images.dims(), [4, 3, 8, 8]);
    Ok(())
}

#[test]
fn missing_image_fails_the_batch_by_default() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let csv = create_synthetic_dataset(tmp.path(), &[("a.png", 0)])?;
    let mut text = fs::read_to_string(&csv)?;
    text.push_str("ghost.png,1\n");
    fs::write(&csv, text)?;

    let dataset = FundusDataset::with_config(
        &csv,
        tmp.path().join("images"),
        DatasetMode::Evaluation,
        small_config(),
    )?;

    let device = <TestBackend as Backend>::Device::default();
    let mut iter = BatchIter::sequential(&dataset);
    let err = iter
        .next_batch::<TestBackend>(2, &device)
        .expect_err("strict mode surfaces the broken sample");
    assert!(
        matches!(err, FundusDataError::MissingImageFile { .. }),
        "got {err}"
    );
    Ok(())
}
