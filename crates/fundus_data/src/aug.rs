//! Image augmentation and transformation pipelines.

use crate::types::{DatasetMode, ResizeMode, TransformedImage};
use image::imageops::FilterType;
use rand::{Rng, SeedableRng};
use std::cmp::max;

#[derive(Debug, Clone)]
pub struct AugmentConfig {
    /// Resize all images to this (width, height).
    pub target_size: (u32, u32),
    /// How images reach the target size.
    pub resize_mode: ResizeMode,
    /// Probability of a 90-degree rotation (0/90/180/270 uniformly).
    pub rotate90_prob: f32,
    /// Probability of a horizontal or vertical flip.
    pub flip_prob: f32,
    /// Probability of a light color jitter (brightness/contrast).
    pub color_jitter_prob: f32,
    /// Max jitter scale for brightness/contrast.
    pub color_jitter_strength: f32,
    /// Probability of a scale jitter (zoom with center crop/pad).
    pub scale_jitter_prob: f32,
    /// Min scale factor for scale jitter.
    pub scale_jitter_min: f32,
    /// Max scale factor for scale jitter.
    pub scale_jitter_max: f32,
    /// Probability of adding uniform noise per channel.
    pub noise_prob: f32,
    /// Max absolute noise added (0-1 range).
    pub noise_strength: f32,
    /// Probability of applying a blur.
    pub blur_prob: f32,
    /// Blur sigma (passed to image::imageops::blur).
    pub blur_sigma: f32,
    /// Seed for per-sample-deterministic draws; thread RNG when unset.
    pub seed: Option<u64>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            target_size: (224, 224),
            resize_mode: ResizeMode::Force,
            rotate90_prob: 0.5,
            flip_prob: 0.5,
            color_jitter_prob: 0.5,
            color_jitter_strength: 0.2,
            scale_jitter_prob: 0.5,
            scale_jitter_min: 0.8,
            scale_jitter_max: 1.0,
            noise_prob: 0.2,
            noise_strength: 0.02,
            blur_prob: 0.2,
            blur_sigma: 1.0,
            seed: None,
        }
    }
}

/// Randomized training-time transform: geometric and photometric
/// perturbations followed by the target resize.
#[derive(Debug, Clone)]
pub struct TrainAugment {
    cfg: AugmentConfig,
}

impl TrainAugment {
    pub fn new(cfg: AugmentConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.cfg
    }

    /// Augment and resize without the CHW conversion (the preprocess tool
    /// saves the result back out as an image file).
    pub fn augment_image(&self, img: image::RgbImage, index: usize) -> image::RgbImage {
        // Choose RNG: seeded if provided (per-sample deterministic), else thread-local.
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = self.cfg.seed {
            let mixed = seed ^ index as u64;
            seeded_rng = rand::rngs::StdRng::seed_from_u64(mixed);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };

        let mut img = img;
        maybe_rotate90(&mut img, self.cfg.rotate90_prob, rng);
        maybe_flip(&mut img, self.cfg.flip_prob, rng);
        maybe_jitter(
            &mut img,
            self.cfg.color_jitter_prob,
            self.cfg.color_jitter_strength,
            rng,
        );
        maybe_scale_jitter(
            &mut img,
            self.cfg.scale_jitter_prob,
            self.cfg.scale_jitter_min,
            self.cfg.scale_jitter_max,
            rng,
        );
        maybe_noise(&mut img, self.cfg.noise_prob, self.cfg.noise_strength, rng);
        maybe_blur(&mut img, self.cfg.blur_prob, self.cfg.blur_sigma, rng);
        resize_to(&img, self.cfg.target_size, self.cfg.resize_mode)
    }

    pub fn apply(&self, img: image::RgbImage, index: usize) -> TransformedImage {
        to_chw(self.augment_image(img, index))
    }
}

/// Deterministic evaluation-time transform: resize to target only.
#[derive(Debug, Clone)]
pub struct EvalTransform {
    pub target_size: (u32, u32),
    pub resize_mode: ResizeMode,
}

impl EvalTransform {
    pub fn resize_image(&self, img: &image::RgbImage) -> image::RgbImage {
        resize_to(img, self.target_size, self.resize_mode)
    }

    pub fn apply(&self, img: image::RgbImage) -> TransformedImage {
        to_chw(self.resize_image(&img))
    }
}

/// The transform stage a dataset delegates to. The training variant applies
/// randomized augmentations; the evaluation variant only resizes. Both end
/// in the CHW [0, 1] float conversion.
#[derive(Debug, Clone)]
pub enum TransformPipeline {
    Training(TrainAugment),
    Evaluation(EvalTransform),
}

impl TransformPipeline {
    pub fn for_mode(mode: DatasetMode, cfg: AugmentConfig) -> Self {
        match mode {
            DatasetMode::Training => TransformPipeline::Training(TrainAugment::new(cfg)),
            DatasetMode::Evaluation => TransformPipeline::Evaluation(EvalTransform {
                target_size: cfg.target_size,
                resize_mode: cfg.resize_mode,
            }),
        }
    }

    pub fn is_training(&self) -> bool {
        matches!(self, TransformPipeline::Training(_))
    }

    pub fn target_size(&self) -> (u32, u32) {
        match self {
            TransformPipeline::Training(t) => t.cfg.target_size,
            TransformPipeline::Evaluation(e) => e.target_size,
        }
    }

    /// Transform a decoded image into the model-facing layout. `index`
    /// feeds the per-sample RNG when a seed is configured; the evaluation
    /// variant ignores it.
    pub fn apply(&self, img: image::RgbImage, index: usize) -> TransformedImage {
        match self {
            TransformPipeline::Training(t) => t.apply(img, index),
            TransformPipeline::Evaluation(e) => e.apply(img),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TransformPipeline::Training(t) => {
                let cfg = &t.cfg;
                format!(
                    "training target_size={}x{} resize={:?} rot90_p={:.2} flip_p={:.2} color_jitter_p={:.2} strength={:.2} scale_jitter_p={:.2} range=[{:.2},{:.2}] noise_p={:.2} strength={:.3} blur_p={:.2} sigma={:.2} seed={}",
                    cfg.target_size.0,
                    cfg.target_size.1,
                    cfg.resize_mode,
                    cfg.rotate90_prob,
                    cfg.flip_prob,
                    cfg.color_jitter_prob,
                    cfg.color_jitter_strength,
                    cfg.scale_jitter_prob,
                    cfg.scale_jitter_min,
                    cfg.scale_jitter_max,
                    cfg.noise_prob,
                    cfg.noise_strength,
                    cfg.blur_prob,
                    cfg.blur_sigma,
                    cfg.seed
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "none".to_string())
                )
            }
            TransformPipeline::Evaluation(e) => format!(
                "evaluation target_size={}x{} resize={:?}",
                e.target_size.0, e.target_size.1, e.resize_mode
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformPipelineBuilder {
    cfg: AugmentConfig,
    mode: DatasetMode,
}

impl TransformPipelineBuilder {
    pub fn training() -> Self {
        Self {
            cfg: AugmentConfig::default(),
            mode: DatasetMode::Training,
        }
    }
    pub fn evaluation() -> Self {
        Self {
            cfg: AugmentConfig::default(),
            mode: DatasetMode::Evaluation,
        }
    }
    pub fn target_size(mut self, size: (u32, u32)) -> Self {
        self.cfg.target_size = size;
        self
    }
    pub fn resize_mode(mut self, mode: ResizeMode) -> Self {
        self.cfg.resize_mode = mode;
        self
    }
    pub fn rotate90_prob(mut self, p: f32) -> Self {
        self.cfg.rotate90_prob = p;
        self
    }
    pub fn flip_prob(mut self, p: f32) -> Self {
        self.cfg.flip_prob = p;
        self
    }
    pub fn color_jitter(mut self, prob: f32, strength: f32) -> Self {
        self.cfg.color_jitter_prob = prob;
        self.cfg.color_jitter_strength = strength;
        self
    }
    pub fn scale_jitter(mut self, prob: f32, min: f32, max: f32) -> Self {
        self.cfg.scale_jitter_prob = prob;
        self.cfg.scale_jitter_min = min;
        self.cfg.scale_jitter_max = max;
        self
    }
    pub fn noise(mut self, prob: f32, strength: f32) -> Self {
        self.cfg.noise_prob = prob;
        self.cfg.noise_strength = strength;
        self
    }
    pub fn blur(mut self, prob: f32, sigma: f32) -> Self {
        self.cfg.blur_prob = prob;
        self.cfg.blur_sigma = sigma;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.cfg.seed = seed;
        self
    }
    pub fn build(self) -> TransformPipeline {
        TransformPipeline::for_mode(self.mode, self.cfg)
    }
}

/// Convert to CHW planes, normalized to [0, 1].
pub(crate) fn to_chw(img: image::RgbImage) -> TransformedImage {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut pixels = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        pixels[base] = pixel[0] as f32 / 255.0;
        pixels[plane + base] = pixel[1] as f32 / 255.0;
        pixels[2 * plane + base] = pixel[2] as f32 / 255.0;
    }
    TransformedImage {
        pixels,
        width,
        height,
    }
}

pub(crate) fn resize_to(
    img: &image::RgbImage,
    target: (u32, u32),
    mode: ResizeMode,
) -> image::RgbImage {
    let (w, h) = target;
    match mode {
        ResizeMode::Force => image::imageops::resize(img, w, h, FilterType::Triangle),
        ResizeMode::Letterbox => letterbox_resize(img, w, h),
    }
}

fn letterbox_resize(img: &image::RgbImage, target_w: u32, target_h: u32) -> image::RgbImage {
    let (w, h) = img.dimensions();
    let scale = f32::min(target_w as f32 / w as f32, target_h as f32 / h as f32);
    let new_w = (w as f32 * scale).round() as u32;
    let new_h = (h as f32 * scale).round() as u32;
    let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);

    let pad_w = (target_w - new_w) / 2;
    let pad_h = (target_h - new_h) / 2;

    let mut canvas = image::RgbImage::new(target_w, target_h);
    image::imageops::replace(&mut canvas, &resized, pad_w.into(), pad_h.into());
    canvas
}

pub(crate) fn maybe_rotate90(img: &mut image::RgbImage, prob: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    match rng.random_range(0..4u32) {
        1 => *img = image::imageops::rotate90(img),
        2 => *img = image::imageops::rotate180(img),
        3 => *img = image::imageops::rotate270(img),
        _ => {}
    }
}

pub(crate) fn maybe_flip(img: &mut image::RgbImage, prob: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    if rng.random_range(0.0..1.0) < 0.5 {
        image::imageops::flip_horizontal_in_place(img);
    } else {
        image::imageops::flip_vertical_in_place(img);
    }
}

pub(crate) fn maybe_jitter(
    img: &mut image::RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            let mut v = (v - 0.5) * contrast + 0.5;
            v *= bright;
            pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_noise(
    img: &mut image::RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let noise = rng.random_range(-strength..strength);
            let v = (pixel[c] as f32 / 255.0 + noise).clamp(0.0, 1.0);
            pixel[c] = (v * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_scale_jitter(
    img: &mut image::RgbImage,
    prob: f32,
    min_scale: f32,
    max_scale: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || min_scale <= 0.0 || max_scale <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let scale = if max_scale > min_scale {
        rng.random_range(min_scale..max_scale)
    } else {
        min_scale
    };
    let (w, h) = img.dimensions();
    let new_w = max(1, (w as f32 * scale).round() as u32);
    let new_h = max(1, (h as f32 * scale).round() as u32);

    let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);
    let mut canvas = image::RgbImage::new(w, h);

    if new_w >= w && new_h >= h {
        // crop center
        let x0 = ((new_w - w) / 2) as i64;
        let y0 = ((new_h - h) / 2) as i64;
        image::imageops::replace(&mut canvas, &resized, -x0, -y0);
    } else {
        // pad center
        let x0 = ((w - new_w) / 2) as i64;
        let y0 = ((h - new_h) / 2) as i64;
        image::imageops::replace(&mut canvas, &resized, x0, y0);
    }

    *img = canvas;
}

pub(crate) fn maybe_blur(
    img: &mut image::RgbImage,
    prob: f32,
    sigma: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || sigma <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let blurred = image::imageops::blur(img, sigma);
    *img = blurred;
}
