// SPDX-License-Identifier: Apache-2.0
//
// Export planning — turns a document snapshot plus an export configuration
// into a typed sequence of page-rendering units.
//
// The plan replaces the string-templated markup of earlier designs: titles
// and paths travel as data, not as concatenated text, so special characters
// cannot corrupt the output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use scanbook_core::error::Result;
use scanbook_core::types::{Document, ExportConfig, PageSize};

/// One physical output page: the rendition to draw and its optional caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageUnit {
    /// The page's processed rendition at plan time.
    pub image_uri: PathBuf,
    /// Centred caption under the image, e.g. "Page 2 of 3".
    pub caption: Option<String>,
}

/// A fully planned export: everything a render engine needs, in final order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPlan {
    /// Document title, embedded as output metadata.
    pub title: String,
    pub page_size: PageSize,
    /// Padding on all four sides of every page, millimetres.
    pub margin_mm: u32,
    /// One unit per document page, in `order_index` order — never reordered,
    /// never merged.
    pub units: Vec<PageUnit>,
}

/// Build an export plan from a document snapshot and a configuration.
///
/// A pure function of its inputs: no caching, no stored state. The
/// configuration is validated before any unit is produced, so a bad
/// configuration never yields a partial plan.
#[instrument(skip(document, config), fields(document_id = %document.id, pages = document.pages.len()))]
pub fn plan_export(document: &Document, config: &ExportConfig) -> Result<ExportPlan> {
    config.validate()?;

    let total = document.pages.len();
    let units = document
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| PageUnit {
            image_uri: page.processed_uri.clone(),
            caption: config
                .include_page_numbers
                .then(|| format!("Page {} of {}", index + 1, total)),
        })
        .collect();

    debug!(units = total, "export planned");
    Ok(ExportPlan {
        title: document.title.clone(),
        page_size: config.page_size,
        margin_mm: config.margin_mm,
        units,
    })
}
