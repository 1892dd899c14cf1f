//! The export robot.
//!
//! [`Robo::export`] runs one request end to end in a fresh browser session:
//! login, open the report, export it, wait for the download and read it back.
//! The session is closed on every path once it has been launched, including
//! when the caller drops the export future.

pub mod download;
pub mod exports;
pub mod portal;
pub mod reports;
pub mod step;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::browser::{ChromeLauncher, Page, SessionGuard, SessionLauncher, SessionPool};
use crate::config::RoboConfig;
use crate::error::Result;

pub use reports::{ReportId, ReportSummary};
use step::required;

/// A downloaded report.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub report: ReportId,
    /// Name the portal gave the file.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct Robo {
    config: Arc<RoboConfig>,
    launcher: Arc<dyn SessionLauncher>,
}

impl Robo {
    pub fn new(config: Arc<RoboConfig>, launcher: Arc<dyn SessionLauncher>) -> Self {
        Self { config, launcher }
    }

    /// Robot backed by local Chrome sessions, bounded by `browser.max_sessions`.
    pub fn from_config(config: RoboConfig) -> Self {
        let chrome = Arc::new(ChromeLauncher::new(config.browser.clone()));
        let pool = SessionPool::new(chrome, config.browser.max_sessions);
        Self::new(Arc::new(config), Arc::new(pool))
    }

    /// Export the report named `report_id`. Unknown ids fail before any
    /// browser is started.
    pub async fn export(&self, report_id: &str) -> Result<ExportedFile> {
        let report: ReportId = report_id.parse()?;
        self.export_report(report).await
    }

    pub async fn export_report(&self, report: ReportId) -> Result<ExportedFile> {
        info!(report = %report, "Starting export");
        let session = SessionGuard::new(self.launcher.launch().await?);

        let (page, download_dir) = session.parts()?;
        let outcome = self.run(page, download_dir, report).await;

        session.close().await;
        outcome
    }

    async fn run(
        &self,
        page: &dyn Page,
        download_dir: &Path,
        report: ReportId,
    ) -> Result<ExportedFile> {
        let timings = &self.config.timings;

        required("login", portal::login(page, &self.config.portal, timings)).await?;
        reports::run_report(page, report, timings).await?;

        let path = required(
            "wait for download",
            download::wait_for_first_file(
                download_dir,
                timings.download_timeout,
                timings.download_poll,
            ),
        )
        .await?;
        let bytes = tokio::fs::read(&path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.xlsx", report));

        info!(report = %report, "Exported {} ({} bytes)", file_name, bytes.len());
        Ok(ExportedFile {
            report,
            file_name,
            bytes,
        })
    }
}
