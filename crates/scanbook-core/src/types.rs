// SPDX-License-Identifier: Apache-2.0
//
// Core domain types for Scanbook documents and pages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Result, ScanbookError};

/// Unique identifier for a scanned document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a page within a document.
///
/// Globally unique across the store, not just per-document — pages are
/// looked up without document context in the filter-reapply flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visual filter applied to a captured page image.
///
/// `Original` is the identity filter: the processed rendition is the
/// original file itself, no derived copy is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    Original,
    Color,
    Grayscale,
    Bw,
    Enhance,
}

impl FilterKind {
    /// Stable string form used in the `pages.filterName` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "Original",
            Self::Color => "Color",
            Self::Grayscale => "Grayscale",
            Self::Bw => "BW",
            Self::Enhance => "Enhance",
        }
    }

    /// Parse the database string form. Returns `None` for unknown names.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Original" => Some(Self::Original),
            "Color" => Some(Self::Color),
            "Grayscale" => Some(Self::Grayscale),
            "BW" => Some(Self::Bw),
            "Enhance" => Some(Self::Enhance),
            _ => None,
        }
    }

    /// Whether this filter leaves the source image untouched.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Original)
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scanned page belonging to exactly one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub document_id: DocumentId,
    /// Durable copy of the untouched capture (never the transient capture path).
    pub original_uri: PathBuf,
    /// Filter-applied rendition currently representing the page. Equals
    /// `original_uri` when the filter is `Original`.
    pub processed_uri: PathBuf,
    pub filter: FilterKind,
    /// Degrees; stored but not mutated past initialization.
    pub rotation: i32,
    /// Zero-based rank among sibling pages. Within one document the values
    /// form a contiguous 0..n-1 sequence after every completed write.
    pub order_index: u32,
}

/// Page input for document creation: no id or rank yet — the rank is the
/// position in the input slice.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub original_uri: PathBuf,
    pub processed_uri: PathBuf,
    pub filter: FilterKind,
    pub rotation: i32,
}

/// A titled, ordered collection of scanned pages — the unit of export and
/// deletion. Always has at least one page while it exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sorted by `order_index` ascending.
    pub pages: Vec<Page>,
}

impl Document {
    /// Page ids in display order.
    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.iter().map(|p| p.id).collect()
    }
}

/// Output page geometry for PDF export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSize {
    /// 8.5in x 11in.
    Letter,
    /// 210mm x 297mm.
    A4,
}

impl PageSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match self {
            Self::Letter => (215.9, 279.4),
            Self::A4 => (210.0, 297.0),
        }
    }

    /// Parse a user-supplied page-size name. Unrecognized values are a
    /// configuration error, never a silent default.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Letter" => Ok(Self::Letter),
            "A4" => Ok(Self::A4),
            other => Err(ScanbookError::Configuration(format!(
                "unrecognized page size: {other}"
            ))),
        }
    }
}

/// Export configuration controlling PDF assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub page_size: PageSize,
    /// Padding on all four sides, in millimetres.
    pub margin_mm: u32,
    /// Emit a centred "Page {i} of {n}" caption under each page image.
    pub include_page_numbers: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: PageSize::Letter,
            margin_mm: 20,
            include_page_numbers: true,
        }
    }
}

impl ExportConfig {
    /// Reject configurations that leave no drawable area inside the margins.
    pub fn validate(&self) -> Result<()> {
        let (w_mm, h_mm) = self.page_size.dimensions_mm();
        let margin = self.margin_mm as f32;
        if 2.0 * margin >= w_mm.min(h_mm) {
            return Err(ScanbookError::Configuration(format!(
                "margin {}mm leaves no usable area on a {:?} page",
                self.margin_mm, self.page_size
            )));
        }
        Ok(())
    }
}
