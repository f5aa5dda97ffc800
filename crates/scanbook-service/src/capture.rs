// SPDX-License-Identifier: Apache-2.0
//
// External collaborator traits for the capture and share boundaries.
//
// The scanning UI and the OS share sheet are not part of this library; they
// plug in behind these traits. Cancellation and zero captures are ordinary
// outcomes for the caller, not failures of the core.

use std::path::{Path, PathBuf};

use scanbook_core::error::Result;

/// A source of raw captured page images (camera + edge detection, file
/// picker, test double, ...).
pub trait CaptureSource {
    /// Run one capture session and return the transient image paths in
    /// capture order. `Ok(None)` means the user cancelled; an empty list
    /// means the session ended with nothing captured. Neither is an error.
    fn capture_pages(&self) -> Result<Option<Vec<PathBuf>>>;
}

/// Consumes an exported artifact (share sheet, save dialog, ...).
pub trait ShareSink {
    /// Offer the file to the sink. Unavailability of the sink is reported
    /// by the caller, never treated as a pipeline failure.
    fn share_file(&self, path: &Path, mime_type: &str) -> Result<()>;
}
