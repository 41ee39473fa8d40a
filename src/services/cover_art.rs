//! Cover image resolution
//!
//! Every bundle ships a `cover.jpg`. Sources, in priority order: an
//! explicit image supplied on the command line, the picture embedded in
//! the audio tags, and finally a generated solid-color placeholder. A
//! source that fails to decode logs a warning and falls through to the
//! next one.

use crate::error::{GeneratorError, Result};
use crate::models::bundle::COVER_FILENAME;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Placeholder cover edge length in pixels
const PLACEHOLDER_SIZE: u32 = 512;
/// Placeholder cover fill color
const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([26, 26, 46]);

/// Cover art resolver service
pub struct CoverArtResolver {}

impl CoverArtResolver {
    pub fn new() -> Self {
        Self {}
    }

    /// Write `cover.jpg` into the working directory and return its path
    ///
    /// JPEG output requires RGB, so decoded images are converted before
    /// encoding (JPEG cannot carry an alpha channel).
    pub fn resolve(
        &self,
        explicit: Option<&Path>,
        embedded: Option<&[u8]>,
        working_dir: &Path,
    ) -> Result<PathBuf> {
        let image = self.load_source(explicit, embedded);
        let dest = working_dir.join(COVER_FILENAME);
        image
            .to_rgb8()
            .save_with_format(&dest, ImageFormat::Jpeg)
            .map_err(|e| {
                GeneratorError::PackagingFailed(format!("write {}: {}", dest.display(), e))
            })?;
        Ok(dest)
    }

    fn load_source(&self, explicit: Option<&Path>, embedded: Option<&[u8]>) -> DynamicImage {
        if let Some(path) = explicit {
            match image::open(path) {
                Ok(image) => return image,
                Err(e) => {
                    tracing::warn!(
                        "Could not decode album art {} ({}), trying embedded picture",
                        path.display(),
                        e
                    );
                }
            }
        }

        if let Some(bytes) = embedded {
            match image::load_from_memory(bytes) {
                Ok(image) => return image,
                Err(e) => {
                    tracing::warn!("Could not decode embedded picture ({}), using placeholder", e);
                }
            }
        }

        DynamicImage::ImageRgb8(RgbImage::from_pixel(
            PLACEHOLDER_SIZE,
            PLACEHOLDER_SIZE,
            PLACEHOLDER_COLOR,
        ))
    }
}

impl Default for CoverArtResolver {
    fn default() -> Self {
        Self::new()
    }
}
