//! Synthetic fundus dataset generation for pipeline smoke testing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use fundus_data::{
    count_grades, split_records_stratified, validate_labels, Grade, LabelRecord,
    ValidationOutcome, ValidationThresholds,
};
use image::{Rgb, RgbImage};
use rand::{Rng, SeedableRng};

#[derive(Parser, Debug)]
#[command(name = "datagen", about = "Generate a synthetic labelled fundus dataset")]
pub struct DatagenArgs {
    /// Output root for images and label CSVs.
    #[arg(long, default_value = "assets/datasets/fundus_synth")]
    pub out_dir: PathBuf,
    /// Images to generate per DR grade.
    #[arg(long, default_value_t = 10)]
    pub per_grade: usize,
    /// Square image size in pixels.
    #[arg(long, default_value_t = 224)]
    pub size: u32,
    /// Validation ratio (0..1); 0 writes a single labels.csv.
    #[arg(long, default_value_t = 0.2)]
    pub val_ratio: f32,
    /// Seed for the generator (defaults to FUNDUS_SEED or a random draw).
    #[arg(long)]
    pub seed: Option<u64>,
}

/// CLI seed wins, then the FUNDUS_SEED env var, then a random draw.
pub fn resolve_seed(cli: Option<u64>) -> u64 {
    if let Some(seed) = cli {
        return seed;
    }
    if let Ok(raw) = std::env::var("FUNDUS_SEED") {
        if let Ok(seed) = raw.trim().parse() {
            return seed;
        }
    }
    rand::rng().random()
}

pub fn run_datagen(args: DatagenArgs) -> Result<()> {
    let seed = resolve_seed(args.seed);
    let size = args.size.max(32);
    let images_dir = args.out_dir.join("images");
    fs::create_dir_all(&images_dir)
        .with_context(|| format!("creating {}", images_dir.display()))?;

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(Grade::COUNT * args.per_grade);
    for grade in Grade::ALL {
        for i in 0..args.per_grade {
            let image_id = format!("grade{}_{i:03}.png", grade.as_u8());
            let img = synth_fundus(size, grade, &mut rng);
            img.save(images_dir.join(&image_id))
                .with_context(|| format!("saving {image_id}"))?;
            records.push(LabelRecord { image_id, grade });
        }
    }

    let primary_csv = if args.val_ratio > 0.0 {
        let (train, val) = split_records_stratified(records, args.val_ratio, Some(seed));
        let train_csv = args.out_dir.join("train.csv");
        write_labels_csv(&train_csv, &train)?;
        write_labels_csv(&args.out_dir.join("val.csv"), &val)?;
        println!(
            "Wrote {} train rows and {} val rows (seed {seed})",
            train.len(),
            val.len()
        );
        print_grade_counts("train", &train);
        print_grade_counts("val", &val);
        train_csv
    } else {
        let labels_csv = args.out_dir.join("labels.csv");
        write_labels_csv(&labels_csv, &records)?;
        println!("Wrote {} label rows (seed {seed})", records.len());
        print_grade_counts("labels", &records);
        labels_csv
    };

    let thresholds = ValidationThresholds::from_env();
    let report = validate_labels(&primary_csv, &images_dir, &thresholds)?;
    println!("Validation outcome: {}", report.outcome.as_str());
    for reason in &report.reasons {
        println!(" - {reason}");
    }
    if report.outcome == ValidationOutcome::Fail {
        anyhow::bail!("Validation failed; see above.");
    }
    Ok(())
}

fn print_grade_counts(name: &str, records: &[LabelRecord]) {
    for (grade, count) in count_grades(records) {
        println!(" - {name}: {grade} x{count}");
    }
}

pub(crate) fn write_labels_csv(path: &Path, records: &[LabelRecord]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["image_id", "label"])?;
    for record in records {
        let label = record.grade.as_u8().to_string();
        writer.write_record([record.image_id.as_str(), label.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// A dark circular disc on black with `3 * grade` bright blobs standing in
/// for lesions, so grades stay visually distinguishable.
fn synth_fundus(size: u32, grade: Grade, rng: &mut rand::rngs::StdRng) -> RgbImage {
    let mut img = RgbImage::new(size, size);
    let center = size as f32 / 2.0;
    let radius = size as f32 * 0.45;

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        if (dx * dx + dy * dy).sqrt() <= radius {
            *pixel = Rgb([
                rng.random_range(120..=200),
                rng.random_range(60..=110),
                rng.random_range(40..=80),
            ]);
        }
    }

    let spots = grade.as_u8() as usize * 3;
    for _ in 0..spots {
        let angle = rng.random_range(0.0..std::f32::consts::TAU);
        let dist = rng.random_range(0.0..radius * 0.85);
        let cx = center + angle.cos() * dist;
        let cy = center + angle.sin() * dist;
        let spot_r = rng.random_range(1.5..4.0);
        draw_spot(&mut img, cx, cy, spot_r, Rgb([230, 210, 120]));
    }
    img
}

fn draw_spot(img: &mut RgbImage, cx: f32, cy: f32, radius: f32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    let x0 = (cx - radius).floor().max(0.0) as u32;
    let x1 = ((cx + radius).ceil() as u32).min(w.saturating_sub(1));
    let y0 = (cy - radius).floor().max(0.0) as u32;
    let y1 = ((cy + radius).ceil() as u32).min(h.saturating_sub(1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if (dx * dx + dy * dy).sqrt() <= radius {
                img.put_pixel(x, y, color);
            }
        }
    }
}
