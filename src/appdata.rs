use std::path::{Path, PathBuf};

use crate::error::{LaunchError, Result};
use crate::fsutil;
use crate::models::{AppType, Vendor};

/// Roaming application-data root (`%APPDATA%` on Windows).
pub fn appdata_root() -> Result<PathBuf> {
    dirs::config_dir().ok_or_else(|| {
        LaunchError::Environment("could not determine the application data directory".to_string())
    })
}

/// Per-server cache directory of the client inside the application data
/// root, e.g. `%APPDATA%\iiko\Rms\my-server-example-com_443`.
///
/// The sanitized target is the leaf: it is the same value BackOffice
/// receives via `/AdditionalTmpFolder`, so this must resolve to the exact
/// directory the process writes into. The version decides only the vendor
/// folder: `Syrve` for Syrve builds of major version 9 or newer, `iiko`
/// otherwise.
pub fn cache_dir(
    root: &Path,
    vendor: Vendor,
    app_type: AppType,
    sanitized_target: &str,
    version: &str,
) -> PathBuf {
    let vendor_folder = match vendor {
        Vendor::Syrve if major_version(version) >= 9 => "Syrve",
        _ => "iiko",
    };
    let edition_folder = if app_type.is_rms() { "Rms" } else { "Chain" };
    root.join(vendor_folder)
        .join(edition_folder)
        .join(sanitized_target)
}

fn major_version(version: &str) -> u32 {
    version
        .split('.')
        .next()
        .and_then(|segment| {
            let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .unwrap_or(0)
}

/// Removes a stale cache directory so the new BackOffice build regenerates
/// its configuration. Failures only warn; the launch can proceed without the
/// cleanup.
pub fn clean_cache_dir(path: &Path) {
    if !path.exists() {
        log::debug!("cache directory '{}' does not exist, nothing to clean", path.display());
        return;
    }
    log::info!("removing stale cache directory '{}'", path.display());
    if let Err(err) = fsutil::remove_dir_all_robust(path) {
        log::warn!("could not remove cache directory '{}': {err}", path.display());
    }
}
