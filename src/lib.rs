//! glosa-robo - report export robot for the Zero Glosa claims portal.
//!
//! Drives a headless Chrome through the portal's login, reports menu and
//! export panel, and serves the downloaded spreadsheets over HTTP.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod robo;
pub mod server;

pub use config::RoboConfig;
pub use error::{Result, RoboError};
pub use robo::{ExportedFile, ReportId, Robo};
