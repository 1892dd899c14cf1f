//! HTTP request handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

use super::AppState;
use crate::error::RoboError;
use crate::robo::reports::{catalog, ReportSummary};
use crate::robo::ExportedFile;

/// Run one export and stream the downloaded file back as an attachment.
pub async fn export_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Response {
    info!(report = %report_id, "Export requested");
    match state.robo.export(&report_id).await {
        Ok(file) => attachment(file),
        Err(e) => {
            error!(report = %report_id, "Export failed: {}", e);
            error_response(&e)
        }
    }
}

/// List the reports that can be exported.
pub async fn list_reports() -> Json<Vec<ReportSummary>> {
    Json(catalog())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn attachment(file: ExportedFile) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&file.file_name),
            ),
        ],
        file.bytes,
    )
        .into_response()
}

fn error_response(e: &RoboError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

/// `attachment; filename="..."`, adding an RFC 5987 `filename*` when the
/// name is not plain ASCII.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if fallback == file_name {
        return format!("attachment; filename=\"{}\"", file_name);
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}
