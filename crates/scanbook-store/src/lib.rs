// SPDX-License-Identifier: Apache-2.0
//
// scanbook-store — SQLite persistence for Scanbook documents and pages.
//
// Owns the relational schema, transactional creation and cascading deletes,
// and indexed ordered retrieval. Cross-row invariants (last-page protection,
// order renormalization) live one layer up in scanbook-service.

pub mod store;

pub use store::DocumentStore;
