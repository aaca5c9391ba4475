//! `autopilot run` — execute an ad-hoc plan.
//!
//! Manual commands always go through the estimate-and-dry-run path first;
//! the live execution only happens after the summary is shown and confirmed
//! (or `--yes` is passed). `--test` stops after the sandbox run.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use autopilot_core::config::Config;
use autopilot_core::executor::ExecutorRegistry;
use autopilot_core::impact;
use autopilot_core::interpreter::IntentInterpreter;
use autopilot_core::orchestrator::{ExecuteOptions, Orchestrator, RunDb};
use autopilot_core::plan::ActionPlan;
use autopilot_core::preview;
use intent_client::IntentClient;

use crate::output::print_json;

pub fn run(
    root: &Path,
    plan_file: Option<&Path>,
    command_text: Option<&str>,
    test: bool,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_inner(root, plan_file, command_text, test, yes, json))
}

async fn run_inner(
    root: &Path,
    plan_file: Option<&Path>,
    command_text: Option<&str>,
    test: bool,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load_or_default(root);
    let plan = resolve_plan(plan_file, command_text).await?;
    plan.validate()?;

    let registry = Arc::new(ExecutorRegistry::with_builtins());
    let db = Arc::new(RunDb::open(&autopilot_core::paths::runs_db_path(root))?);
    let orchestrator = Orchestrator::new(registry.clone())
        .with_db(db)
        .with_action_timeout(config.execution.action_timeout())
        .with_finalize_attempts(config.execution.finalize_attempts);

    // Estimate + sandbox dry run, surfaced before anything commits.
    let estimate = impact::estimate(&plan, &registry).await;
    let dry_run = orchestrator
        .execute(
            &plan,
            serde_json::Value::Null,
            ExecuteOptions {
                test_mode: true,
                policy: config.command_retry.clone(),
                ..ExecuteOptions::default()
            },
        )
        .await?;
    let summary = preview::render(&estimate, &dry_run);

    if json && test {
        return print_json(&dry_run);
    }
    if !json {
        print_summary(&summary);
    }
    if test {
        println!("\nSandbox run complete; nothing was committed.");
        return Ok(());
    }

    if !yes && !confirm(&summary)? {
        println!("Aborted.");
        return Ok(());
    }

    let log = orchestrator
        .execute(
            &plan,
            serde_json::Value::Null,
            ExecuteOptions {
                policy: config.command_retry,
                ..ExecuteOptions::default()
            },
        )
        .await?;

    if json {
        return print_json(&log);
    }
    println!(
        "\nRun {} finished: {} ({} ms, {} action(s))",
        log.id,
        log.status,
        log.execution_time_ms,
        log.actions_executed.len()
    );
    Ok(())
}

async fn resolve_plan(
    plan_file: Option<&Path>,
    command_text: Option<&str>,
) -> anyhow::Result<ActionPlan> {
    match (plan_file, command_text) {
        (Some(path), _) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            // YAML is a superset of JSON, so one parser handles both.
            let plan: ActionPlan = serde_yaml::from_str(&data)
                .with_context(|| format!("failed to parse plan from {}", path.display()))?;
            Ok(plan)
        }
        (None, Some(text)) => {
            let url = std::env::var("AUTOPILOT_INTENT_URL")
                .context("--command requires AUTOPILOT_INTENT_URL to be set")?;
            let client = IntentClient::new(url);
            let plan = client.interpret(text, &[]).await?;
            Ok(plan)
        }
        (None, None) => anyhow::bail!("pass either --plan <file> or --command <text>"),
    }
}

fn print_summary(summary: &autopilot_core::preview::PreviewSummary) {
    println!("{}", summary.headline);
    println!(
        "  risk: {:?}   affected items: {}   reversible: {}",
        summary.risk_level,
        summary
            .affected_items
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".into()),
        summary.reversible
    );
    for step in &summary.steps {
        match &step.detail {
            Some(detail) => println!("  {}. {} — {} ({detail})", step.index + 1, step.name, step.outcome),
            None => println!("  {}. {} — {}", step.index + 1, step.name, step.outcome),
        }
    }
    for warning in &summary.warnings {
        println!("  ! {warning}");
    }
}

fn confirm(summary: &autopilot_core::preview::PreviewSummary) -> anyhow::Result<bool> {
    use std::io::Write as _;
    let mut stdout = std::io::stdout();
    write!(
        stdout,
        "\nExecute for real{}? [y/N] ",
        if summary.reversible {
            ""
        } else {
            " (cannot be undone)"
        }
    )?;
    stdout.flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
