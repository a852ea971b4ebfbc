//! Offline image preprocessing: resize a directory of fundus photographs
//! and optionally write augmented copies alongside.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use fundus_data::{AugmentConfig, EvalTransform, ResizeMode, TrainAugment};
use rayon::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "preprocess",
    about = "Resize and augment a directory of fundus images"
)]
pub struct PreprocessArgs {
    /// Directory of input images (jpg/jpeg/png).
    #[arg(long)]
    pub input_dir: PathBuf,
    /// Directory for processed outputs.
    #[arg(long)]
    pub output_dir: PathBuf,
    /// Square output size in pixels.
    #[arg(long, default_value_t = 224)]
    pub size: u32,
    /// Skip augmented copies; only write the resized base image.
    #[arg(long, default_value_t = false)]
    pub no_augment: bool,
    /// Augmented copies to write per input image.
    #[arg(long, default_value_t = 3)]
    pub augment_copies: usize,
    /// Worker threads (0 = rayon default).
    #[arg(long, default_value_t = 0)]
    pub workers: usize,
    /// Seed for deterministic augmentation.
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_preprocess(args: PreprocessArgs) -> Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let mut inputs: Vec<PathBuf> = fs::read_dir(&args.input_dir)
        .with_context(|| format!("reading {}", args.input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_supported_image(path))
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        println!("No images found under {}", args.input_dir.display());
        return Ok(());
    }

    let resize = EvalTransform {
        target_size: (args.size, args.size),
        resize_mode: ResizeMode::Force,
    };
    let augment = (!args.no_augment && args.augment_copies > 0).then(|| {
        TrainAugment::new(AugmentConfig {
            target_size: (args.size, args.size),
            resize_mode: ResizeMode::Force,
            seed: args.seed,
            ..AugmentConfig::default()
        })
    });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers)
        .build()
        .context("building worker pool")?;

    let results: Vec<(PathBuf, Result<usize>)> = pool.install(|| {
        inputs
            .par_iter()
            .enumerate()
            .map(|(i, path)| {
                let written = process_image(path, i, &args, &resize, augment.as_ref());
                (path.clone(), written)
            })
            .collect()
    });

    let mut files_written = 0usize;
    let mut failed = 0usize;
    for (path, result) in &results {
        match result {
            Ok(count) => files_written += count,
            Err(e) => {
                failed += 1;
                eprintln!("Warning: failed to process {}: {e:#}", path.display());
            }
        }
    }
    println!(
        "Processed {}/{} images ({} files written) -> {}",
        results.len() - failed,
        results.len(),
        files_written,
        args.output_dir.display()
    );
    if failed == results.len() {
        anyhow::bail!("every input image failed to process");
    }
    Ok(())
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ext == "jpg" || ext == "jpeg" || ext == "png"
        })
        .unwrap_or(false)
}

fn process_image(
    path: &Path,
    index: usize,
    args: &PreprocessArgs,
    resize: &EvalTransform,
    augment: Option<&TrainAugment>,
) -> Result<usize> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("input file name is not valid UTF-8")?;
    let img = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();

    let base = resize.resize_image(&img);
    base.save(args.output_dir.join(file_name))
        .with_context(|| format!("saving {file_name}"))?;
    let mut written = 1;

    if let Some(augment) = augment {
        for copy in 0..args.augment_copies {
            // Distinct per-copy index keeps seeded outputs distinct.
            let out = augment.augment_image(img.clone(), index * args.augment_copies + copy);
            let out_name = format!("aug_{copy}_{file_name}");
            out.save(args.output_dir.join(&out_name))
                .with_context(|| format!("saving {out_name}"))?;
            written += 1;
        }
    }
    Ok(written)
}
