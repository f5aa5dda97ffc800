// SPDX-License-Identifier: Apache-2.0
//
// Scanbook — Core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::ScanbookError;
pub use types::*;
