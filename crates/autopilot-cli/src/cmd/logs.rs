use std::path::Path;

use autopilot_core::orchestrator::RunDb;
use clap::Subcommand;

use crate::output::{print_json, print_table};

#[derive(Subcommand)]
pub enum LogsSubcommand {
    /// List recent runs
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show one run with its full trace
    Show { id: String },
}

pub fn run(root: &Path, subcommand: LogsSubcommand, json: bool) -> anyhow::Result<()> {
    let db = RunDb::open(&autopilot_core::paths::runs_db_path(root))?;
    match subcommand {
        LogsSubcommand::List { limit } => {
            let runs = db.list_recent(limit)?;
            if json {
                return print_json(&runs);
            }
            if runs.is_empty() {
                println!("No runs recorded yet.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = runs
                .iter()
                .map(|log| {
                    vec![
                        log.id.to_string(),
                        log.timestamp.to_rfc3339(),
                        log.status.to_string(),
                        if log.test_mode { "sandbox" } else { "live" }.to_string(),
                        log.actions_executed.len().to_string(),
                        format!("{} ms", log.execution_time_ms),
                    ]
                })
                .collect();
            print_table(&["ID", "STARTED", "STATUS", "MODE", "ACTIONS", "TIME"], &rows);
            Ok(())
        }
        LogsSubcommand::Show { id } => {
            let run_id: uuid::Uuid = id.parse()?;
            let log = db.get(run_id)?;
            if json {
                return print_json(&log);
            }
            println!("Run {} — {} ({} ms)", log.id, log.status, log.execution_time_ms);
            if let Some(message) = &log.error_message {
                println!("  {message}");
            }
            for step in &log.trace.steps {
                println!(
                    "  {}. {} [{:?}] {} ms",
                    step.index + 1,
                    step.name,
                    step.status,
                    step.duration_ms
                );
                if let Some(err) = &step.error {
                    println!("       error: {err}");
                }
                for warning in &step.warnings {
                    println!("       note: {warning}");
                }
            }
            Ok(())
        }
    }
}
