//! Audio tag extraction
//!
//! Pulls title, artist and embedded cover art out of the audio file's
//! tags using lofty. Tag reading is best-effort: files lofty cannot
//! parse (raw captures, flv containers) simply yield empty metadata and
//! the bundle name falls back to the file stem.

use lofty::picture::PictureType;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;

/// Tag fields the pipeline consumes
#[derive(Debug, Clone, Default)]
pub struct SongMetadata {
    /// Track title
    pub title: Option<String>,
    /// Artist name(s)
    pub artist: Option<String>,
    /// Raw bytes of the embedded cover picture, if any
    pub embedded_art: Option<Vec<u8>>,
}

/// Metadata extractor service
pub struct MetadataExtractor {}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {}
    }

    /// Extract tags from an audio file, degrading to empty metadata on
    /// any read failure
    pub fn extract(&self, file_path: &Path) -> SongMetadata {
        match self.try_extract(file_path) {
            Ok(metadata) => {
                tracing::debug!(
                    file = %file_path.display(),
                    title = ?metadata.title,
                    artist = ?metadata.artist,
                    has_art = metadata.embedded_art.is_some(),
                    "Extracted metadata"
                );
                metadata
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read tags from {} ({}), using filename fallback",
                    file_path.display(),
                    e
                );
                SongMetadata::default()
            }
        }
    }

    fn try_extract(&self, file_path: &Path) -> lofty::error::Result<SongMetadata> {
        let tagged_file = Probe::open(file_path)?.read()?;
        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

        let metadata = if let Some(tag) = tag {
            let embedded_art = tag
                .pictures()
                .iter()
                .find(|p| p.pic_type() == PictureType::CoverFront)
                .or_else(|| tag.pictures().first())
                .map(|p| p.data().to_vec());

            SongMetadata {
                title: tag.title().map(|s| s.to_string()),
                artist: tag.artist().map(|s| s.to_string()),
                embedded_art,
            }
        } else {
            SongMetadata::default()
        };

        Ok(metadata)
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}
