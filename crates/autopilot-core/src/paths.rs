use crate::error::{PipelineError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const AUTOPILOT_DIR: &str = ".autopilot";
pub const AUTOMATIONS_DIR: &str = ".autopilot/automations";

pub const CONFIG_FILE: &str = ".autopilot/config.yaml";
pub const RUNS_DB_FILE: &str = ".autopilot/runs.redb";

pub const MANIFEST_FILE: &str = "manifest.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn autopilot_dir(root: &Path) -> PathBuf {
    root.join(AUTOPILOT_DIR)
}

pub fn automations_dir(root: &Path) -> PathBuf {
    root.join(AUTOMATIONS_DIR)
}

pub fn automation_dir(root: &Path, slug: &str) -> PathBuf {
    automations_dir(root).join(slug)
}

pub fn automation_manifest(root: &Path, slug: &str) -> PathBuf {
    automation_dir(root, slug).join(MANIFEST_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn runs_db_path(root: &Path) -> PathBuf {
    root.join(RUNS_DB_FILE)
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(PipelineError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
