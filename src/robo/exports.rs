//! Export-panel controller.
//!
//! Drives the "exports" card inside the report frame: detect it, close it if
//! open, trigger a new export, wait for the server to generate it, download
//! the newest row and close the card again.

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use super::step::{optional, required};
use crate::browser::dom::{first_match, safe_click, Lookup};
use crate::browser::{Frame, Key, Node};
use crate::config::Timings;
use crate::error::{Result, RoboError};

/// Direct selector for the exports card.
pub const PANEL_SELECTOR: &str = "zg-report-exports-box mat-card";
/// One row of the exports list.
pub const LIST_ITEM_SELECTOR: &str = "zg-exports-list-item";
/// Tag of the card container enclosing the list.
pub const PANEL_TAG: &str = "mat-card";

const CLOSE_ICON: &str = "close";
const CLOSE_LABELS: &[&str] = &["Fechar", "Close"];
const CLOSE_FALLBACK_SELECTOR: &str =
    "mat-card-content > div:nth-of-type(1) button:nth-of-type(2)";

const EXPORT_LABELS: &[&str] = &["Exportar"];
const EXPORT_FALLBACK_SELECTOR: &str = "zg-exports-list-item button:nth-of-type(1) mat-icon";

const DOWNLOAD_ICON: &str = "file_download";
const ROW_BUTTON_FALLBACK: &str = "button:nth-of-type(1)";

/// What is known about the exports card. Recomputed on every inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelState {
    /// The card could not be inspected, or closing it failed.
    Unknown,
    /// No card in the frame.
    Absent,
    /// A card was open and has been closed.
    Closed,
    /// The card is open.
    Open(Node),
}

/// Controller bound to the frame hosting the exports card.
pub struct ExportsPanel<'a> {
    frame: &'a dyn Frame,
    timings: &'a Timings,
}

impl<'a> ExportsPanel<'a> {
    pub fn new(frame: &'a dyn Frame, timings: &'a Timings) -> Self {
        Self { frame, timings }
    }

    /// Poll for the card until `timeout`: the direct selector first, then the
    /// card enclosing any list row.
    pub async fn detect(&self, timeout: Duration) -> Result<Option<Node>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(card) = self.frame.query(PANEL_SELECTOR).await? {
                return Ok(Some(card));
            }

            if let Some(item) = self.frame.query_all(LIST_ITEM_SELECTOR).await?.first() {
                if let Some(card) = self.frame.closest_ancestor(item, PANEL_TAG).await? {
                    debug!("Exports card found through a list row");
                    return Ok(Some(card));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(self.timings.panel_poll).await;
        }
    }

    /// Quick look at the card's state.
    pub async fn inspect(&self) -> Result<PanelState> {
        Ok(match self.detect(self.timings.panel_check_timeout).await? {
            Some(card) => PanelState::Open(card),
            None => PanelState::Absent,
        })
    }

    /// Close the card if it is open. Best effort: never fails.
    pub async fn ensure_closed(&self) -> PanelState {
        optional("close exports panel", self.close_if_open())
            .await
            .unwrap_or(PanelState::Unknown)
    }

    async fn close_if_open(&self) -> Result<PanelState> {
        let card = match self.inspect().await? {
            PanelState::Open(card) => card,
            state => return Ok(state),
        };
        info!("Exports card detected; closing");

        let chain = [
            Lookup::Icon(CLOSE_ICON),
            Lookup::Text(CLOSE_LABELS),
            Lookup::Selector(CLOSE_FALLBACK_SELECTOR),
        ];
        match first_match(self.frame, &card, &chain).await? {
            Some((_, button)) => {
                safe_click(self.frame, &button, self.timings.click_delay).await?;
                info!("Exports card closed");
                sleep(self.timings.close_settle).await;
            }
            None => {
                debug!("No close control on exports card, sending Escape");
                self.frame.press_key(Key::Escape).await?;
                sleep(self.timings.escape_settle).await;
            }
        }
        Ok(PanelState::Closed)
    }

    /// Click the card header's "Exportar" control.
    pub async fn trigger_export(&self) -> Result<()> {
        let card = self
            .detect(self.timings.panel_timeout)
            .await?
            .ok_or(RoboError::ExportsPanelNotVisible)?;

        let chain = [
            Lookup::Text(EXPORT_LABELS),
            Lookup::Selector(EXPORT_FALLBACK_SELECTOR),
        ];
        let (_, button) = first_match(self.frame, &card, &chain)
            .await?
            .ok_or(RoboError::ExportButtonMissing)?;

        safe_click(self.frame, &button, self.timings.click_delay).await?;
        info!("Clicked header 'Exportar'");
        Ok(())
    }

    /// Download the newest export: the first row, falling back to the last.
    pub async fn download_latest(&self) -> Result<()> {
        let card = self
            .detect(self.timings.panel_timeout)
            .await?
            .ok_or(RoboError::ExportsPanelMissing)?;

        let items = self
            .frame
            .query_all_within(&card, LIST_ITEM_SELECTOR)
            .await?;
        let (Some(first), Some(last)) = (items.first(), items.last()) else {
            return Err(RoboError::EmptyExportList);
        };

        let mut candidates = vec![first];
        if last != first {
            candidates.push(last);
        }

        let chain = [
            Lookup::Icon(DOWNLOAD_ICON),
            Lookup::Selector(ROW_BUTTON_FALLBACK),
        ];
        for row in candidates {
            if let Some((_, button)) = first_match(self.frame, row, &chain).await? {
                safe_click(self.frame, &button, self.timings.click_delay).await?;
                info!("Download triggered for the newest export");
                sleep(self.timings.download_start).await;
                return Ok(());
            }
            debug!("No download control in row {}", row.id());
        }
        Err(RoboError::DownloadButtonMissing)
    }

    /// Close, export, wait for processing, download, close.
    pub async fn run_full_cycle(&self) -> Result<()> {
        self.ensure_closed().await;
        required("trigger export", self.trigger_export()).await?;

        info!(
            "Waiting {}s for the export to be processed",
            self.timings.export_processing.as_secs()
        );
        sleep(self.timings.export_processing).await;

        required("download latest export", self.download_latest()).await?;
        self.ensure_closed().await;
        Ok(())
    }
}
