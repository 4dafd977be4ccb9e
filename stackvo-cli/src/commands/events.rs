//! `stackvo events`: follow the daemon's event stream.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;

use stackvo_daemon::DaemonError;
use stackvo_orchestrator::Event;

use super::home_dir;

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Topic prefix to follow (e.g. "service:", "project:build"). Repeatable.
    #[arg(long = "topic", value_name = "PREFIX")]
    pub topics: Vec<String>,
}

pub fn run(args: EventsArgs, json: bool) -> Result<()> {
    let home = home_dir()?;
    let mut render_error = None;
    let result = stackvo_daemon::subscribe(&home, args.topics, |event| {
        match render(&event, json) {
            Ok(()) => true,
            Err(err) => {
                render_error = Some(err);
                false
            }
        }
    });

    match result {
        Ok(()) => match render_error {
            Some(err) => Err(err),
            None => {
                println!("daemon closed the event stream");
                Ok(())
            }
        },
        Err(DaemonError::DaemonNotRunning { .. }) => Err(anyhow!(
            "daemon is not running; start it with `stackvo daemon start`"
        )),
        Err(err) => Err(err).context("event stream failed"),
    }
}

fn render(event: &Event, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(event).context("failed to render event JSON")?
        );
        return Ok(());
    }
    let topic = if event.topic.ends_with(":error") {
        event.topic.red().bold()
    } else {
        event.topic.cyan()
    };
    println!(
        "{} {topic} {}",
        chrono::Local::now().format("%H:%M:%S").to_string().bright_black(),
        event.payload
    );
    Ok(())
}
