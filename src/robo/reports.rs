//! The exportable reports and the flow that opens one and exports it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};

use super::exports::ExportsPanel;
use super::portal::{open_reports_menu, wait_for_reports_frame};
use super::step::{optional, required};
use crate::browser::dom::click_selector;
use crate::browser::{Frame, Page};
use crate::config::Timings;
use crate::error::{Result, RoboError};

/// Position of the category holding every exportable spreadsheet.
pub const CATEGORY_POSITION: u32 = 4;

/// Startup dialogs of the report viewer, dismissed in this order.
pub const VIEWER_MODALS: [&str; 2] = ["#button-1035-btnInnerEl", "#button-1006-btnIconEl"];

/// Title of the `n`-th category in the reports frame (1-based).
pub fn category_selector(n: u32) -> String {
    format!("zg-category-list-item:nth-of-type({}) h4", n)
}

/// Title of the `n`-th report inside the open category (1-based).
pub fn report_selector(n: u32) -> String {
    format!("zg-spreadsheet-list-viewer-item:nth-of-type({}) h4", n)
}

/// A report the robot knows how to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportId {
    AnaliticoGlosas,
    VisaoPagamento,
    GlosaMantida,
}

impl ReportId {
    pub const ALL: [ReportId; 3] = [
        ReportId::AnaliticoGlosas,
        ReportId::VisaoPagamento,
        ReportId::GlosaMantida,
    ];

    /// Identifier used in URLs and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            ReportId::AnaliticoGlosas => "analitico_glosas",
            ReportId::VisaoPagamento => "visao_pagamento",
            ReportId::GlosaMantida => "glosa_mantida",
        }
    }

    /// Title shown by the portal.
    pub fn label(self) -> &'static str {
        match self {
            ReportId::AnaliticoGlosas => "Analítico de Glosas",
            ReportId::VisaoPagamento => "Visão por Pagamento",
            ReportId::GlosaMantida => "Glosa Mantida",
        }
    }

    /// Position of the report within the category list.
    pub fn position(self) -> u32 {
        match self {
            ReportId::AnaliticoGlosas => 3,
            ReportId::VisaoPagamento => 5,
            ReportId::GlosaMantida => 7,
        }
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportId {
    type Err = RoboError;

    fn from_str(s: &str) -> Result<Self> {
        ReportId::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| RoboError::UnknownReport(s.to_string()))
    }
}

/// Listing entry for a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub id: &'static str,
    pub label: &'static str,
}

impl From<ReportId> for ReportSummary {
    fn from(report: ReportId) -> Self {
        Self {
            id: report.as_str(),
            label: report.label(),
        }
    }
}

/// Every known report, in portal order.
pub fn catalog() -> Vec<ReportSummary> {
    ReportId::ALL.into_iter().map(ReportSummary::from).collect()
}

/// Open `report` from the reports menu and run a full export cycle on it.
///
/// Expects a logged-in page. The exported file lands in the session's
/// download directory.
pub async fn run_report(page: &dyn Page, report: ReportId, timings: &Timings) -> Result<()> {
    info!(report = %report, "Opening 'Painéis e relatórios'");
    required("open reports menu", open_reports_menu(page, timings)).await?;

    let reports_frame = required("find reports frame", wait_for_reports_frame(page, timings)).await?;
    let frame = reports_frame.as_ref();

    info!(report = %report, "Opening report category");
    let category = category_selector(CATEGORY_POSITION);
    required(
        "open category",
        click_selector(
            frame,
            &category,
            timings.list_item_timeout,
            timings.selector_poll,
            timings.click_delay,
        ),
    )
    .await?;

    info!(report = %report, "Selecting '{}'", report.label());
    let item = report_selector(report.position());
    required(
        "select report",
        click_selector(
            frame,
            &item,
            timings.list_item_timeout,
            timings.selector_poll,
            timings.click_delay,
        ),
    )
    .await?;

    debug!("Waiting for the viewer to load");
    sleep(timings.viewer_load).await;

    let viewer = viewer_frame(&reports_frame).await?;
    dismiss_viewer_modals(viewer.as_ref(), timings).await;

    ExportsPanel::new(frame, timings).run_full_cycle().await?;
    info!(report = %report, "Export cycle finished");
    Ok(())
}

/// The embedded viewer: second child frame, else the first, else the
/// reports frame itself.
pub async fn viewer_frame(reports_frame: &Arc<dyn Frame>) -> Result<Arc<dyn Frame>> {
    let children = reports_frame.child_frames().await?;
    Ok(children
        .get(1)
        .or_else(|| children.first())
        .cloned()
        .unwrap_or_else(|| reports_frame.clone()))
}

async fn dismiss_viewer_modals(viewer: &dyn Frame, timings: &Timings) {
    for selector in VIEWER_MODALS {
        let dismissed = optional(
            "dismiss viewer modal",
            click_selector(
                viewer,
                selector,
                timings.modal_timeout,
                timings.selector_poll,
                timings.click_delay,
            ),
        )
        .await;
        if dismissed.is_some() {
            info!("Closed viewer dialog {}", selector);
        }
    }
}
