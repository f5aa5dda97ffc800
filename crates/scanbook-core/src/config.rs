// SPDX-License-Identifier: Apache-2.0
//
// Application configuration.

use serde::{Deserialize, Serialize};

use crate::types::{ExportConfig, FilterKind};

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Filter preselected for new scan sessions.
    pub default_filter: FilterKind,
    /// Export settings used when the caller does not supply any.
    pub default_export: ExportConfig,
    /// JPEG quality (1-100) for processed renditions.
    pub jpeg_quality: u8,
    /// Processed images are downscaled to fit this width in pixels.
    pub filter_max_width: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_filter: FilterKind::Original,
            default_export: ExportConfig::default(),
            jpeg_quality: 90,
            filter_max_width: 2000,
        }
    }
}
