use std::path::Path;

use autopilot_core::automation;

use crate::output::print_json;

pub fn run(root: &Path, slug: &str, json: bool) -> anyhow::Result<()> {
    let automation = automation::load(root, slug)?;
    let stats = &automation.stats;

    if json {
        return print_json(stats);
    }

    println!("Statistics for {}", automation.slug);
    println!("  total runs:      {}", stats.total_runs);
    println!("  successful:      {}", stats.successful_runs);
    println!("  failed:          {}", stats.failed_runs);
    println!("  with retries:    {}", stats.retried_runs);
    println!("  avg run time:    {:.1} ms", stats.average_execution_time_ms);
    match stats.last_run {
        Some(t) => println!("  last run:        {}", t.to_rfc3339()),
        None => println!("  last run:        never"),
    }
    Ok(())
}
