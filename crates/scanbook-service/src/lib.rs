// SPDX-License-Identifier: Apache-2.0
//
// scanbook-service — document assembly over the store and the image
// pipeline.
//
// All mutation of documents goes through [`DocumentService`] so the
// cross-row invariants (at least one page, contiguous order) hold no matter
// which frontend drives it. Frontends plug in at the [`capture`] traits.

pub mod assembler;
pub mod capture;
pub mod data_dir;

pub use assembler::{default_title, load_config, persist_config, CapturedPage, DocumentService};
pub use capture::{CaptureSource, ShareSink};
