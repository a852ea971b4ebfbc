//! Fundus image loading and decoding.

use crate::types::{DatasetResult, FundusDataError};
use std::path::{Path, PathBuf};

/// Resolves image ids against a base directory and decodes them to RGB.
///
/// Construction never touches the filesystem; a missing or unreadable
/// directory only surfaces when a load is attempted.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    dir: PathBuf,
}

impl ImageLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The id joins onto the base directory verbatim; the labels CSV owns
    /// the extension convention.
    pub fn image_path(&self, image_id: &str) -> PathBuf {
        self.dir.join(image_id)
    }

    /// Decode an image to 8-bit RGB. `to_rgb8` collapses whatever channel
    /// layout the source file carries (grayscale, RGBA, palette) into the
    /// RGB order the transform stage assumes.
    ///
    /// A missing file and an undecodable file are distinct errors; neither
    /// is retried or substituted with a placeholder.
    pub fn load(&self, image_id: &str) -> DatasetResult<image::RgbImage> {
        let img_path = self.image_path(image_id);
        if !img_path.exists() {
            return Err(FundusDataError::MissingImageFile {
                image_id: image_id.to_string(),
                path: img_path,
            });
        }
        let img = image::open(&img_path)
            .map_err(|e| FundusDataError::ImageDecode {
                path: img_path.clone(),
                source: e,
            })?
            .to_rgb8();
        Ok(img)
    }
}
