use autopilot_core::config::{Config, WarnLevel};
use clap::Subcommand;
use std::path::Path;

use crate::output::print_json;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Check the configuration for errors and unusual values
    Validate,
}

pub fn run(root: &Path, subcommand: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        ConfigSubcommand::Validate => {
            let config = Config::load(root)?;
            let warnings = config.validate();

            if json {
                return print_json(&warnings);
            }

            if warnings.is_empty() {
                println!("Configuration OK");
                return Ok(());
            }
            for w in &warnings {
                let tag = match w.level {
                    WarnLevel::Error => "error",
                    WarnLevel::Warning => "warning",
                };
                println!("{tag}: {}", w.message);
            }
            if warnings.iter().any(|w| w.level == WarnLevel::Error) {
                anyhow::bail!("configuration has errors");
            }
            Ok(())
        }
    }
}
