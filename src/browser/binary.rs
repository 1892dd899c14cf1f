//! Chrome/Chromium executable discovery.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, RoboError};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

/// Executable names looked up in `PATH`.
const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Locate a browser: explicit path first, then well-known locations, then `PATH`.
pub fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(RoboError::BrowserNotFound(path.to_path_buf()));
    }

    find_in(CHROME_PATHS.iter().map(Path::new), CHROME_COMMANDS).ok_or_else(|| {
        RoboError::Launch(
            "Chrome/Chromium not found. Install it (e.g. `apt install chromium`) \
             or set CHROME_PATH"
                .to_string(),
        )
    })
}

fn find_in<'a>(
    candidates: impl IntoIterator<Item = &'a Path>,
    commands: &[&str],
) -> Option<PathBuf> {
    for path in candidates {
        if path.exists() {
            info!("Found Chrome at: {}", path.display());
            return Some(path.to_path_buf());
        }
    }

    for cmd in commands {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Some(path);
        }
    }
    None
}
