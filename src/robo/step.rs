//! Required and optional pipeline steps.
//!
//! A required step propagates its failure and aborts the request. An optional
//! step logs its failure and yields `None`; it can never produce an error, so
//! the caller cannot accidentally propagate it.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::error::Result;

/// Run a step whose failure aborts the pipeline.
pub async fn required<T, F>(name: &'static str, step: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(step = name, "Running step");
    match step.await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(step = name, "Step failed: {}", e);
            Err(e)
        }
    }
}

/// Run a best-effort step: failures are logged and swallowed.
pub async fn optional<T, F>(name: &'static str, step: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match step.await {
        Ok(value) => Some(value),
        Err(e) => {
            info!(step = name, "Optional step skipped: {}", e);
            None
        }
    }
}
