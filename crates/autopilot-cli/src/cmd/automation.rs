use std::path::Path;
use std::sync::Arc;

use autopilot_core::automation;
use autopilot_core::config::Config;
use autopilot_core::executor::ExecutorRegistry;
use autopilot_core::orchestrator::{Orchestrator, RunDb};
use clap::Subcommand;

use crate::output::{print_json, print_table};

#[derive(Subcommand)]
pub enum AutomationSubcommand {
    /// List all automations with their statistics
    List,
    /// Show one automation manifest
    Show { slug: String },
    /// Sandbox-run an automation (no side effects, no statistics)
    Test {
        slug: String,
        /// Trigger payload as inline JSON
        #[arg(long, default_value = "{}")]
        trigger: String,
    },
    /// Run an automation live
    Run {
        slug: String,
        /// Trigger payload as inline JSON
        #[arg(long, default_value = "{}")]
        trigger: String,
    },
}

pub fn run(root: &Path, subcommand: AutomationSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        AutomationSubcommand::List => list(root, json),
        AutomationSubcommand::Show { slug } => show(root, &slug, json),
        AutomationSubcommand::Test { slug, trigger } => execute(root, &slug, &trigger, true, json),
        AutomationSubcommand::Run { slug, trigger } => execute(root, &slug, &trigger, false, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let automations = automation::list(root)?;
    if json {
        return print_json(&automations);
    }
    if automations.is_empty() {
        println!("No automations. Add a manifest under .autopilot/automations/<slug>/");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = automations
        .iter()
        .map(|a| {
            vec![
                a.slug.clone(),
                a.name.clone(),
                if a.enabled { "enabled" } else { "disabled" }.to_string(),
                a.plan.len().to_string(),
                a.stats.total_runs.to_string(),
                a.stats
                    .last_run
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(
        &["SLUG", "NAME", "STATE", "ACTIONS", "RUNS", "LAST RUN"],
        &rows,
    );
    Ok(())
}

fn show(root: &Path, slug: &str, json: bool) -> anyhow::Result<()> {
    let automation = automation::load(root, slug)?;
    if json {
        return print_json(&automation);
    }
    println!("{} ({})", automation.name, automation.slug);
    if let Some(desc) = &automation.description {
        println!("  {desc}");
    }
    println!("  trigger: {:?}", automation.trigger);
    println!("  actions:");
    for action in &automation.plan.actions {
        println!("    {}. {}", action.order, action.display_name());
    }
    let p = &automation.retry_policy;
    println!(
        "  retry: {} × {:?}, base {}s, worst-case wait {}s",
        p.max_retries,
        p.strategy,
        p.base_delay_seconds,
        p.worst_case_wait().as_secs()
    );
    Ok(())
}

fn execute(root: &Path, slug: &str, trigger: &str, test: bool, json: bool) -> anyhow::Result<()> {
    let trigger_data: serde_json::Value = serde_json::from_str(trigger)?;
    let automation = automation::load(root, slug)?;
    let config = Config::load_or_default(root);

    let registry = Arc::new(ExecutorRegistry::with_builtins());
    let db = Arc::new(RunDb::open(&autopilot_core::paths::runs_db_path(root))?);
    let orchestrator = Orchestrator::new(registry)
        .with_db(db)
        .with_action_timeout(config.execution.action_timeout())
        .with_finalize_attempts(config.execution.finalize_attempts);
    orchestrator
        .stats()
        .seed(automation.id, automation.stats.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    let log = runtime.block_on(orchestrator.run_automation(&automation, trigger_data, test))?;

    if !test {
        if let Some(stats) = orchestrator.stats().stats_for(automation.id) {
            automation::update_stats(root, slug, &stats)?;
        }
    }

    if json {
        return print_json(&log);
    }
    println!(
        "{} run {}: {} ({} ms)",
        if test { "Sandbox" } else { "Live" },
        log.id,
        log.status,
        log.execution_time_ms
    );
    for step in &log.trace.steps {
        let marker = match step.status {
            autopilot_core::trace::StepStatus::Success => "ok",
            autopilot_core::trace::StepStatus::Warning => "--",
            _ => "!!",
        };
        match &step.error {
            Some(err) => println!("  [{marker}] {} — {err}", step.name),
            None => println!("  [{marker}] {}", step.name),
        }
    }
    Ok(())
}
