//! Waiting for the browser to finish writing a download.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use crate::error::{Result, RoboError};

/// Suffix Chrome gives files that are still being written.
pub const PARTIAL_SUFFIX: &str = ".crdownload";

/// Poll `dir` until it holds a completed download and return its path.
///
/// The directory belongs to a single session, so any completed file is the
/// export. If several exist the oldest wins (ties broken by name).
pub async fn wait_for_first_file(dir: &Path, timeout: Duration, poll: Duration) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(path) = completed_file(dir).await? {
            info!("Download finished: {}", path.display());
            return Ok(path);
        }
        if Instant::now() >= deadline {
            return Err(RoboError::DownloadTimeout);
        }
        sleep(poll).await;
    }
}

async fn completed_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut done: Vec<(SystemTime, PathBuf)> = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
            debug!("Download in progress: {}", name.to_string_lossy());
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        done.push((modified, entry.path()));
    }

    done.sort();
    Ok(done.into_iter().next().map(|(_, path)| path))
}
