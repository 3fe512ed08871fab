use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::debug;

use super::ImageCapture;
use crate::stream::CapturedImage;

/// Serves a JPEG file from disk as the "camera" frame
///
/// The file is re-read on every capture so it can be swapped while running.
/// Dimensions are taken from configuration, not decoded from the file.
pub struct JpegFileCapture {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl JpegFileCapture {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
        }
    }
}

impl ImageCapture for JpegFileCapture {
    fn try_capture(&mut self) -> Result<CapturedImage> {
        let jpeg = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read image {}", self.path.display()))?;

        if jpeg.is_empty() {
            bail!("Image file {} is empty", self.path.display());
        }

        debug!(
            "Captured {} bytes from {} ({}x{})",
            jpeg.len(),
            self.path.display(),
            self.width,
            self.height
        );

        Ok(CapturedImage {
            jpeg,
            width: self.width,
            height: self.height,
        })
    }
}
