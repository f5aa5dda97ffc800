// SPDX-License-Identifier: Apache-2.0
//
// PDF render engine — turns an export plan into a paginated PDF using
// `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::{Path, PathBuf};

use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

use scanbook_core::error::{Result, ScanbookError};

use crate::plan::{ExportPlan, PageUnit};

/// Boundary to the PDF rendering engine.
///
/// The planner produces an `ExportPlan`; an engine turns it into an output
/// artifact and returns the artifact's path unchanged. Keeping this behind a
/// trait lets tests and alternative backends stand in for the real renderer.
pub trait RenderEngine {
    fn render(&self, plan: &ExportPlan, output_path: &Path) -> Result<PathBuf>;
}

/// Caption typography: Helvetica at 12pt in a fixed band above the bottom
/// margin.
const CAPTION_FONT_SIZE_PT: f32 = 12.0;
const CAPTION_BAND_PT: f32 = 18.0;

/// printpdf-backed render engine producing one output page per plan unit.
pub struct PdfRenderEngine {
    /// Nominal image resolution used when sizing renditions on the page.
    dpi: f32,
}

impl PdfRenderEngine {
    pub fn new() -> Self {
        Self { dpi: 150.0 }
    }

    /// Render a plan to in-memory PDF bytes.
    #[instrument(skip(self, plan), fields(title = %plan.title, units = plan.units.len()))]
    pub fn render_bytes(&self, plan: &ExportPlan) -> Result<Vec<u8>> {
        let (w_mm, h_mm) = plan.page_size.dimensions_mm();
        let (page_w, page_h) = (Mm(w_mm), Mm(h_mm));

        info!(page_size = ?plan.page_size, margin_mm = plan.margin_mm, "rendering export plan");

        let mut doc = PdfDocument::new(&plan.title);
        let mut pages: Vec<PdfPage> = Vec::new();

        for unit in &plan.units {
            let ops = self.page_ops(&mut doc, unit, page_w, page_h, plan.margin_mm)?;
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

        debug!(bytes = output.len(), "render complete");
        Ok(output)
    }

    /// Operations for one physical page: the rendition scaled to fit inside
    /// the margin box (never upscaled, centred), plus the optional caption.
    fn page_ops(
        &self,
        doc: &mut PdfDocument,
        unit: &PageUnit,
        page_w: Mm,
        page_h: Mm,
        margin_mm: u32,
    ) -> Result<Vec<Op>> {
        let decoded = image::open(&unit.image_uri).map_err(|err| {
            ScanbookError::Render(format!(
                "failed to decode {}: {err}",
                unit.image_uri.display()
            ))
        })?;

        let img_width = decoded.width() as usize;
        let img_height = decoded.height() as usize;

        let rgb_image = decoded.to_rgb8();
        let raw = RawImage {
            pixels: RawImageData::U8(rgb_image.into_raw()),
            width: img_width,
            height: img_height,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let xobject_id = doc.add_image(&raw);

        let page_w_pt = page_w.into_pt().0;
        let page_h_pt = page_h.into_pt().0;
        let margin_pt = Mm(margin_mm as f32).into_pt().0;

        // Reserve a caption band above the bottom margin when numbering is on.
        let caption_band_pt = if unit.caption.is_some() {
            CAPTION_BAND_PT
        } else {
            0.0
        };
        let usable_w_pt = page_w_pt - 2.0 * margin_pt;
        let usable_h_pt = page_h_pt - 2.0 * margin_pt - caption_band_pt;

        let img_w_pt = img_width as f32 / self.dpi * 72.0;
        let img_h_pt = img_height as f32 / self.dpi * 72.0;

        // Scale to fit while preserving aspect ratio; do not upscale.
        let scale_x = usable_w_pt / img_w_pt;
        let scale_y = usable_h_pt / img_h_pt;
        let scale = scale_x.min(scale_y).min(1.0);

        let rendered_w_pt = img_w_pt * scale;
        let rendered_h_pt = img_h_pt * scale;

        let x_offset = margin_pt + (usable_w_pt - rendered_w_pt) / 2.0;
        let y_offset = margin_pt + caption_band_pt + (usable_h_pt - rendered_h_pt) / 2.0;

        let mut ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(x_offset)),
                translate_y: Some(Pt(y_offset)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(self.dpi),
                rotate: None,
            },
        }];

        if let Some(caption) = &unit.caption {
            // Centre horizontally using the average Helvetica glyph width
            // (roughly 0.50 * font size).
            let caption_width_pt = caption.chars().count() as f32 * 0.50 * CAPTION_FONT_SIZE_PT;
            let caption_x = (page_w_pt - caption_width_pt) / 2.0;
            let caption_y = margin_pt + (CAPTION_BAND_PT - CAPTION_FONT_SIZE_PT) / 2.0;

            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point {
                    x: Pt(caption_x),
                    y: Pt(caption_y),
                },
            });
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(CAPTION_FONT_SIZE_PT),
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(caption.clone())],
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::EndTextSection);
        }

        Ok(ops)
    }
}

impl Default for PdfRenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine for PdfRenderEngine {
    fn render(&self, plan: &ExportPlan, output_path: &Path) -> Result<PathBuf> {
        let bytes = self.render_bytes(plan)?;
        std::fs::write(output_path, &bytes)?;
        info!(path = %output_path.display(), "PDF written");
        Ok(output_path.to_path_buf())
    }
}
