use anyhow::Context;
use autopilot_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    io::ensure_dir(&paths::autopilot_dir(root))?;
    io::ensure_dir(&paths::automations_dir(root))?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("Already initialized at {}", root.display());
        return Ok(());
    }

    Config::default()
        .save(root)
        .context("failed to write default config")?;
    println!("Initialized autopilot workspace at {}", root.display());
    println!("  config:      {}", paths::CONFIG_FILE);
    println!("  automations: {}", paths::AUTOMATIONS_DIR);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_creates_config_and_dirs() {
        let dir = TempDir::new().unwrap();
        run(dir.path()).unwrap();
        assert!(paths::config_path(dir.path()).exists());
        assert!(paths::automations_dir(dir.path()).exists());
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        run(dir.path()).unwrap();
        run(dir.path()).unwrap();
    }
}
