//! Preview rendering: data shaping for the confirm-before-commit screen.
//!
//! Projects an impact estimate plus a dry-run log into a flat summary the
//! UI can show verbatim. No execution logic lives here.

use serde::{Deserialize, Serialize};

use crate::execution::ExecutionLog;
use crate::impact::{Impact, RiskLevel};
use crate::trace::StepStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewStep {
    pub index: usize,
    pub name: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub risk_level: RiskLevel,
    pub affected_items: Option<u64>,
    pub reversible: bool,
    pub headline: String,
    pub steps: Vec<PreviewStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Shape an impact estimate and its dry-run log into a human-auditable
/// summary. The dry run comes from a `test_mode` execution, so the step
/// list mirrors exactly what a live run would do.
pub fn render(impact: &Impact, dry_run: &ExecutionLog) -> PreviewSummary {
    let mut warnings = Vec::new();
    if !impact.reversible {
        warnings.push("this command cannot be fully undone".to_string());
    }
    if impact.affected_items.is_none() {
        warnings.push("affected item count could not be estimated".to_string());
    }

    let steps = dry_run
        .trace
        .steps
        .iter()
        .map(|step| {
            for w in &step.warnings {
                warnings.push(format!("{}: {w}", step.name));
            }
            PreviewStep {
                index: step.index,
                name: step.name.clone(),
                outcome: outcome_label(step.status).to_string(),
                detail: step.error.clone(),
            }
        })
        .collect();

    PreviewSummary {
        risk_level: impact.risk_level,
        affected_items: impact.affected_items,
        reversible: impact.reversible,
        headline: format!("{} (dry run: {})", impact.description, dry_run.status),
        steps,
        warnings,
    }
}

fn outcome_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "would run",
        StepStatus::Failed | StepStatus::Error => "would fail",
        StepStatus::Running => "in progress",
        StepStatus::Warning => "skipped",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
