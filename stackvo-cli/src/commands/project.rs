//! `stackvo project`: scaffold, build and remove projects.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use stackvo_core::NewProject;
use stackvo_daemon::DaemonRequest;
use stackvo_orchestrator::{BuildJob, JobStatus};

use super::{call, decode, print_json};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Write projects/<name>/stackvo.json and start its first build.
    Create(CreateArgs),

    /// Regenerate, build and start a project in the background.
    Build {
        name: String,
        /// Block until the build finishes.
        #[arg(long)]
        wait: bool,
    },

    /// Stop and remove a project with its image and directory.
    Delete { name: String },

    /// Show one build job.
    Job { id: String },

    /// List build jobs, newest first.
    Jobs,

    /// Cancel a queued or running build job.
    Cancel { id: String },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Project name (directory under projects/).
    pub name: String,

    /// php | nodejs | python | ruby | golang
    #[arg(long, default_value = "php")]
    pub runtime: String,

    /// Runtime version (e.g. "8.2").
    #[arg(long = "runtime-version", value_name = "VERSION")]
    pub version: String,

    /// Defaults to <name>.loc.
    #[arg(long)]
    pub domain: Option<String>,

    /// nginx | apache | caddy | ferron
    #[arg(long)]
    pub webserver: Option<String>,

    #[arg(long)]
    pub document_root: Option<String>,

    /// PHP extension, repeatable.
    #[arg(long = "extension", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Block until the first build finishes.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "stage")]
    stage: String,
    #[tabled(rename = "created")]
    created: String,
}

pub fn run(cmd: ProjectCommand, json: bool) -> Result<()> {
    match cmd {
        ProjectCommand::Create(args) => create(args, json),
        ProjectCommand::Build { name, wait } => {
            let payload = call(&DaemonRequest::new("build").with_name(name).waiting(wait))?;
            show_job(payload, json)
        }
        ProjectCommand::Delete { name } => {
            let payload = call(&DaemonRequest::new("delete_project").with_name(&name))?;
            if json {
                return print_json(&payload);
            }
            println!("✓ Deleted project '{name}'");
            Ok(())
        }
        ProjectCommand::Job { id } => show_job(call(&DaemonRequest::new("job").with_id(id))?, json),
        ProjectCommand::Cancel { id } => {
            show_job(call(&DaemonRequest::new("cancel").with_id(id))?, json)
        }
        ProjectCommand::Jobs => {
            let payload = call(&DaemonRequest::new("jobs"))?;
            if json {
                return print_json(&payload);
            }
            let jobs: Vec<BuildJob> = decode(payload, "job list")?;
            if jobs.is_empty() {
                println!("No build jobs.");
                return Ok(());
            }
            let rows: Vec<JobRow> = jobs
                .iter()
                .map(|job| JobRow {
                    id: job.id.clone(),
                    project: job.project.to_string(),
                    status: status_label(job.status),
                    stage: job.stage.map(|s| s.to_string()).unwrap_or_default(),
                    created: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            Ok(())
        }
    }
}

fn create(args: CreateArgs, json: bool) -> Result<()> {
    let project = NewProject {
        name: args.name,
        runtime: args.runtime,
        version: args.version,
        domain: args.domain,
        webserver: args.webserver,
        document_root: args.document_root,
        extensions: (!args.extensions.is_empty()).then_some(args.extensions),
    };
    let payload = call(
        &DaemonRequest::new("create_project")
            .with_project(project)
            .waiting(args.wait),
    )?;
    if json {
        return print_json(&payload);
    }

    let domain = payload["project"]["domain"].as_str().unwrap_or_default().to_string();
    let name = payload["project"]["name"].as_str().unwrap_or_default().to_string();
    println!("✓ Created project '{name}' ({domain})");
    show_job(payload["job"].clone(), false)
}

fn show_job(payload: Value, json: bool) -> Result<()> {
    if json {
        return print_json(&payload);
    }

    let job: BuildJob = decode(payload, "build job")?;
    println!(
        "job {} for {}: {}{}",
        job.id,
        job.project,
        status_label(job.status),
        job.stage
            .map(|stage| format!(" ({stage})"))
            .unwrap_or_default()
    );
    if let Some(result) = &job.result {
        for stage in &result.stages {
            let code = stage
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<8} exit {code}", stage.stage.to_string());
            if stage.exit_code != Some(0) && !stage.stderr.is_empty() {
                for line in stage.stderr.lines() {
                    println!("    {}", line.red());
                }
            }
        }
    }
    if let Some(err) = &job.error {
        println!("  {}", err.red());
    }
    if job.status == JobStatus::Failed {
        bail!("build of '{}' failed", job.project);
    }
    Ok(())
}

fn status_label(status: JobStatus) -> String {
    match status {
        JobStatus::Queued => "queued".bright_black().to_string(),
        JobStatus::Running => "running".cyan().to_string(),
        JobStatus::Succeeded => "succeeded".green().to_string(),
        JobStatus::Failed => "failed".red().to_string(),
        JobStatus::Cancelled => "cancelled".yellow().to_string(),
    }
}
