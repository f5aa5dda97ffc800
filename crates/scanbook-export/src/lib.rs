// SPDX-License-Identifier: Apache-2.0
//
// scanbook-export — Export planning and PDF rendering for Scanbook.
//
// `plan_export` deterministically assembles a document snapshot plus an
// export configuration into typed page-rendering units; `PdfRenderEngine`
// (behind the `RenderEngine` trait) turns the plan into a paginated PDF.

pub mod pdf;
pub mod plan;

pub use pdf::{PdfRenderEngine, RenderEngine};
pub use plan::{plan_export, ExportPlan, PageUnit};
