// SPDX-License-Identifier: Apache-2.0
//
// Data directory resolution for the default service layout.
//
// One root directory holds the database and the image storage subtree.
// `SCANBOOK_DATA_DIR` overrides the platform location outright, which is
// how tests and portable installs redirect the whole tree.

use std::path::PathBuf;

use scanbook_core::error::Result;

const APP_DIR: &str = "scanbook";
const DATA_DIR_ENV: &str = "SCANBOOK_DATA_DIR";

/// Resolve and create the application data directory.
///
/// Resolution order: `SCANBOOK_DATA_DIR`, then `XDG_DATA_HOME/scanbook`,
/// then `~/.local/share/scanbook`, then the system temp dir. Creation
/// failure propagates; a service cannot run without its data root.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(DATA_DIR_ENV) {
        Some(explicit) => PathBuf::from(explicit),
        None => platform_base().join(APP_DIR),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn platform_base() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}
