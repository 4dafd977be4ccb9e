//! `stackvo status`: daemon and stack overview.

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use stackvo_core::UnitKind;
use stackvo_daemon::DaemonRequest;

use super::{call, print_json};

#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "total")]
    total: String,
    #[tabled(rename = "enabled")]
    configured: String,
    #[tabled(rename = "running")]
    running: String,
}

pub fn run(json: bool) -> Result<()> {
    let status = call(&DaemonRequest::new("status"))?;
    if json {
        return print_json(&status);
    }

    let containers = &status["containers"];
    println!(
        "Stackvo v{} | {} containers | {} running | {} active builds",
        env!("CARGO_PKG_VERSION"),
        count(&containers["total"]),
        count(&containers["running"]),
        count(&status["active_jobs"]),
    );
    if let Some(err) = containers["error"].as_str() {
        println!("{} docker: {err}", "■".red().bold());
    }

    let rows: Vec<KindRow> = UnitKind::ALL
        .iter()
        .map(|kind| {
            let entry = &status["units"][kind.plural()];
            match entry["error"].as_str() {
                Some(err) => KindRow {
                    kind: kind.plural().to_string(),
                    total: "-".to_string(),
                    configured: "-".to_string(),
                    running: format!("error: {err}"),
                },
                None => KindRow {
                    kind: kind.plural().to_string(),
                    total: count(&entry["total"]),
                    configured: count(&entry["configured"]),
                    running: count(&entry["running"]),
                },
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if let Some(root) = status["root"].as_str() {
        println!("{} {root}", "root:".bright_black());
    }
    Ok(())
}

fn count(value: &Value) -> String {
    value
        .as_u64()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string())
}
