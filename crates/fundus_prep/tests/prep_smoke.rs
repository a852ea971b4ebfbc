//! Smoke tests for the offline dataset tools.

use fundus_data::create_datasets;
use fundus_prep::{run_datagen, run_preprocess, DatagenArgs, PreprocessArgs};
use image::{Rgb, RgbImage};
use std::fs;

#[test]
fn datagen_output_feeds_the_dataset_pair() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let out_dir = tmp.path().join("synth");
    run_datagen(DatagenArgs {
        out_dir: out_dir.clone(),
        per_grade: 4,
        size: 64,
        val_ratio: 0.25,
        seed: Some(11),
    })?;

    let images_dir = out_dir.join("images");
    let (train, val) = create_datasets(
        out_dir.join("train.csv"),
        out_dir.join("val.csv"),
        &images_dir,
        &images_dir,
    )?;
    assert_eq!(train.len(), 15, "3 of 4 per grade in the train split");
    assert_eq!(val.len(), 5, "1 of 4 per grade in the val split");
    assert!(train.is_training());
    assert!(train.class_weights().is_some());

    let sample = train.get(0)?;
    assert_eq!(sample.image_chw.len(), 3 * 224 * 224);
    assert!((0..=4).contains(&sample.label));
    Ok(())
}

#[test]
fn datagen_without_split_writes_one_labels_file() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let out_dir = tmp.path().join("synth");
    run_datagen(DatagenArgs {
        out_dir: out_dir.clone(),
        per_grade: 1,
        size: 32,
        val_ratio: 0.0,
        seed: Some(2),
    })?;

    assert!(out_dir.join("labels.csv").exists());
    assert!(!out_dir.join("train.csv").exists());
    let text = fs::read_to_string(out_dir.join("labels.csv"))?;
    assert!(text.starts_with("image_id,label\n"));
    assert_eq!(text.lines().count(), 6, "header plus one row per grade");
    Ok(())
}

#[test]
fn preprocess_writes_base_and_augmented_copies() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input_dir = tmp.path().join("raw");
    let output_dir = tmp.path().join("out");
    fs::create_dir_all(&input_dir)?;
    for i in 0..3u32 {
        let img = RgbImage::from_pixel(50, 40, Rgb([(i * 60) as u8, 120, 90]));
        img.save(input_dir.join(format!("img{i}.png")))?;
    }
    fs::write(input_dir.join("notes.txt"), "not an image")?;

    run_preprocess(PreprocessArgs {
        input_dir: input_dir.clone(),
        output_dir: output_dir.clone(),
        size: 32,
        no_augment: false,
        augment_copies: 2,
        workers: 2,
        seed: Some(5),
    })?;

    let written = fs::read_dir(&output_dir)?.count();
    assert_eq!(written, 9, "3 base + 6 augmented");

    let base = image::open(output_dir.join("img0.png"))?.to_rgb8();
    assert_eq!(base.dimensions(), (32, 32));
    assert!(output_dir.join("aug_0_img0.png").exists());
    assert!(output_dir.join("aug_1_img0.png").exists());
    Ok(())
}

#[test]
fn no_augment_writes_only_resized_bases() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input_dir = tmp.path().join("raw");
    let output_dir = tmp.path().join("out");
    fs::create_dir_all(&input_dir)?;
    RgbImage::from_pixel(20, 20, Rgb([10, 20, 30])).save(input_dir.join("only.png"))?;

    run_preprocess(PreprocessArgs {
        input_dir,
        output_dir: output_dir.clone(),
        size: 16,
        no_augment: true,
        augment_copies: 3,
        workers: 1,
        seed: None,
    })?;

    assert_eq!(fs::read_dir(&output_dir)?.count(), 1);
    assert!(output_dir.join("only.png").exists());
    Ok(())
}
