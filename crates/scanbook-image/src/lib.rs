// SPDX-License-Identifier: Apache-2.0
//
// scanbook-image — Image pipeline for Scanbook.
//
// Persists immutable originals of captured pages, derives filter-applied
// renditions (per-filter recipes over the `image` crate), and handles
// best-effort cleanup of orphaned files.

pub mod filters;
pub mod pipeline;

pub use filters::{recipe_for, FilterRecipe};
pub use pipeline::ImagePipeline;
