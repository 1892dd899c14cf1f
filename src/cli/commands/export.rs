//! One-shot export command.

use std::path::Path;

use console::style;

use crate::config::RoboConfig;
use crate::robo::{ReportId, Robo};

/// Export `report` and write the file into `output`.
pub async fn cmd_export(config: RoboConfig, report: &str, output: &Path) -> anyhow::Result<()> {
    let report: ReportId = report.parse()?;
    config.portal.credentials()?;

    println!(
        "{} Exporting '{}' (this takes a minute)...",
        style("→").cyan(),
        report.label()
    );

    let robo = Robo::from_config(config);
    let file = match robo.export_report(report).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("  {} Export failed: {}", style("✗").red(), e);
            return Err(e.into());
        }
    };

    tokio::fs::create_dir_all(output).await?;
    let path = output.join(&file.file_name);
    tokio::fs::write(&path, &file.bytes).await?;

    println!(
        "  {} Saved {} ({} bytes)",
        style("✓").green(),
        path.display(),
        file.bytes.len()
    );
    Ok(())
}
