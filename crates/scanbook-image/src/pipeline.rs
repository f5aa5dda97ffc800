// SPDX-License-Identifier: Apache-2.0
//
// Image pipeline — durable persistence of captured page images and
// production of filter-applied renditions.
//
// Originals and processed files share one flat, app-owned directory with
// collision-resistant names. The pipeline never deletes a file as part of a
// failing operation: deletion is a separate best-effort call so stale files
// are a lesser harm than an aborted user-visible delete.

use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use scanbook_core::config::AppConfig;
use scanbook_core::error::{Result, ScanbookError};
use scanbook_core::types::FilterKind;

use crate::filters::{apply_recipe, recipe_for};

/// Persists captures and derives processed renditions in one storage
/// directory. Construct once with the app-owned directory and pass to the
/// service layer.
pub struct ImagePipeline {
    storage_dir: PathBuf,
    jpeg_quality: u8,
    filter_max_width: u32,
}

impl ImagePipeline {
    pub fn new(storage_dir: impl Into<PathBuf>, config: &AppConfig) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            jpeg_quality: config.jpeg_quality,
            filter_max_width: config.filter_max_width,
        }
    }

    /// The app-owned directory holding originals and processed renditions.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn ensure_storage_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.storage_dir)?;
        Ok(())
    }

    // -- Persistence ----------------------------------------------------------

    /// Copy a transient capture file into durable storage.
    ///
    /// Repeated calls simply produce additional stored copies; there is no
    /// dedup guarantee. The capture's extension is kept so the format stays
    /// self-describing.
    #[instrument(skip(self, capture_path), fields(capture = %capture_path.as_ref().display()))]
    pub fn persist_original(&self, capture_path: impl AsRef<Path>) -> Result<PathBuf> {
        self.ensure_storage_dir()?;

        let capture = capture_path.as_ref();
        let ext = capture
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let destination = self
            .storage_dir
            .join(format!("original_{}.{ext}", Uuid::new_v4()));

        fs::copy(capture, &destination)?;
        info!(stored = %destination.display(), "original persisted");
        Ok(destination)
    }

    /// Produce the filter-applied rendition for a stored page image.
    ///
    /// The identity filter returns the source path unchanged with no copy.
    /// All other filters decode, run their recipe, and persist a new JPEG in
    /// the storage directory. Recording the filter name against the page is
    /// the caller's job.
    #[instrument(skip(self), fields(source = %source.as_ref().display(), filter = %filter))]
    pub fn apply_filter(&self, source: impl AsRef<Path>, filter: FilterKind) -> Result<PathBuf> {
        let source = source.as_ref();
        let recipe = match recipe_for(filter) {
            Some(recipe) => recipe,
            None => {
                debug!("identity filter, returning source unchanged");
                return Ok(source.to_path_buf());
            }
        };

        let decoded = image::open(source).map_err(|err| {
            ScanbookError::Image(format!("failed to decode {}: {err}", source.display()))
        })?;

        let transformed = apply_recipe(decoded, recipe, self.filter_max_width);

        self.ensure_storage_dir()?;
        let destination = self
            .storage_dir
            .join(format!("processed_{}.jpg", Uuid::new_v4()));

        let mut buffer = Vec::new();
        let rgb = transformed.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality);
        rgb.write_with_encoder(encoder)
            .map_err(|err| ScanbookError::Image(format!("JPEG encoding failed: {err}")))?;
        fs::write(&destination, &buffer)?;

        info!(stored = %destination.display(), "filtered rendition persisted");
        Ok(destination)
    }

    // -- Deletion -------------------------------------------------------------

    /// Best-effort removal of a scan artifact.
    ///
    /// Absence and deletion failure are logged and swallowed — removing a
    /// stale file must never abort an otherwise-successful delete flow.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn delete_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => debug!("file deleted"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("file already absent")
            }
            Err(err) => warn!(error = %err, "failed to delete file"),
        }
    }
}
