//! `stackvo list`, the lifecycle verbs and `stackvo deps`.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use stackvo_core::{Unit, UnitKind};
use stackvo_daemon::DaemonRequest;
use stackvo_orchestrator::{DependencyReport, LifecycleOutcome, StepStatus};

use super::{call, decode, print_json};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// `service`, `tool` or `project`. Lists all three when omitted.
    pub kind: Option<UnitKind>,
}

#[derive(Args, Debug)]
pub struct UnitArgs {
    /// `service`, `tool` or `project`.
    pub kind: UnitKind,
    /// Unit name (e.g. "redis", "adminer", "blog").
    pub name: String,
}

#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "enabled")]
    enabled: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "url")]
    url: String,
    #[tabled(rename = "ports")]
    ports: String,
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

pub fn list(args: ListArgs, json: bool) -> Result<()> {
    let mut request = DaemonRequest::new("list");
    request.kind = args.kind;
    let payload = call(&request)?;
    if json {
        return print_json(&payload);
    }

    let grouped: BTreeMap<String, Vec<Unit>> = match args.kind {
        Some(kind) => BTreeMap::from([(kind.plural().to_string(), decode(payload, "unit list")?)]),
        None => decode(payload, "unit list")?,
    };

    let separator = "■".repeat(67).bright_black().to_string();
    println!(
        "Indicators: {} RUNNING  {} STOPPED  {} NOT CREATED",
        "■".green().bold(),
        "■".yellow().bold(),
        "■".bright_black().bold(),
    );
    for kind in UnitKind::ALL {
        let Some(units) = grouped.get(kind.plural()) else {
            continue;
        };
        println!("{separator}");
        println!("{}", kind.plural().to_uppercase().bold());
        if units.is_empty() {
            println!("No {} found.", kind.plural());
            continue;
        }
        let rows: Vec<UnitRow> = units.iter().map(unit_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    Ok(())
}

fn unit_row(unit: &Unit) -> UnitRow {
    let status = match &unit.error {
        Some(err) => format!("{} {}", "■".red().bold(), err),
        None => format!("{} {}", status_indicator(unit), unit.status),
    };
    let ports = unit
        .network
        .ports
        .iter()
        .filter_map(|port| {
            port.host_port
                .as_ref()
                .map(|host| format!("{host}->{}", port.container_port))
        })
        .collect::<Vec<_>>()
        .join(", ");
    UnitRow {
        name: unit.name.to_string(),
        status,
        enabled: if unit.configured { "yes" } else { "no" }.to_string(),
        version: unit.version.clone().unwrap_or_default(),
        url: unit.url.clone().unwrap_or_default(),
        ports,
    }
}

fn status_indicator(unit: &Unit) -> String {
    if unit.running {
        "■".green().bold().to_string()
    } else if unit.status == "not created" {
        "■".bright_black().bold().to_string()
    } else {
        "■".yellow().bold().to_string()
    }
}

// ---------------------------------------------------------------------------
// enable / disable / start / stop / restart
// ---------------------------------------------------------------------------

pub fn lifecycle(cmd: &str, args: UnitArgs, json: bool) -> Result<()> {
    let payload = call(&DaemonRequest::unit(cmd, args.kind, args.name))?;
    if json {
        return print_json(&payload);
    }

    let outcome: LifecycleOutcome = decode(payload, "lifecycle outcome")?;
    for record in &outcome.steps {
        let mark = match record.status {
            StepStatus::Done => "✓".green().to_string(),
            StepStatus::Failed => "✗".red().to_string(),
            StepStatus::Running | StepStatus::Pending => "·".bright_black().to_string(),
        };
        println!("  {mark} {:<10} {}", record.step.to_string(), record.message);
    }
    println!("✓ {}", outcome.message);
    Ok(())
}

// ---------------------------------------------------------------------------
// deps
// ---------------------------------------------------------------------------

pub fn deps(name: &str, json: bool) -> Result<()> {
    let payload = call(&DaemonRequest::new("deps").with_name(name))?;
    if json {
        return print_json(&payload);
    }

    let report: DependencyReport = decode(payload, "dependency report")?;
    println!("{}", report.unit.to_string().bold());
    if !report.description.is_empty() {
        println!("{}", report.description.bright_black());
    }
    if report.required.is_empty() && report.optional.is_empty() {
        println!("No dependencies.");
    }
    for (label, deps) in [("required", &report.required), ("optional", &report.optional)] {
        for dep in deps {
            let state = if dep.running {
                "running".green()
            } else {
                "stopped".yellow()
            };
            println!("  {label:<9} {:<20} {state}", dep.name.to_string());
        }
    }
    if !report.internal.is_empty() {
        println!("  internal  {}", report.internal.join(", "));
    }
    if report.has_unmet_dependencies {
        println!(
            "Enabling {} will start its stopped required dependencies first.",
            report.unit
        );
    }
    Ok(())
}
