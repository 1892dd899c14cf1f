//! Report listing command.

use console::style;

use crate::robo::reports::catalog;

pub fn cmd_reports(json: bool) -> anyhow::Result<()> {
    let reports = catalog();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("\n{}", style("Reports").bold());
    println!("{}", "-".repeat(45));
    println!("{:<20} Label", "ID");
    println!("{}", "-".repeat(45));
    for report in reports {
        println!("{:<20} {}", report.id, report.label);
    }
    Ok(())
}
