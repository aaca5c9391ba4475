//! Risk & impact estimation for a plan before it runs.
//!
//! Consults a fixed per-kind risk table and each executor's read-only
//! `preview` capability. Nothing here may touch a mutating entry point:
//! estimation happens on the preview path that manual commands go through
//! before the user confirms; trigger-fired automations skip it.

use serde::{Deserialize, Serialize};

use crate::executor::ExecutorRegistry;
use crate::plan::{ActionKind, ActionPlan};

// ---------------------------------------------------------------------------
// RiskLevel / Impact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Impact {
    pub risk_level: RiskLevel,
    /// Estimated number of affected items; `None` when any action's
    /// executor could not answer without side effects.
    pub affected_items: Option<u64>,
    pub reversible: bool,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Per-kind risk table
// ---------------------------------------------------------------------------

/// Baseline risk of an action kind, independent of its parameters.
pub fn base_risk(kind: ActionKind) -> RiskLevel {
    match kind {
        // Irreversible external sends.
        ActionKind::SendEmail | ActionKind::Webhook => RiskLevel::High,
        // Mutations that can be undone but touch money or stock.
        ActionKind::UpdatePrice
        | ActionKind::ApplyDiscount
        | ActionKind::UpdateInventory
        | ActionKind::SyncPlatform
        | ActionKind::RunCommand => RiskLevel::Medium,
        ActionKind::Wait | ActionKind::GenerateReport | ActionKind::ConditionalBranch => {
            RiskLevel::Low
        }
    }
}

/// Whether the kind is reversible in principle. Executors can only narrow
/// this further via `preview`; an external send never becomes reversible.
pub fn kind_reversible(kind: ActionKind) -> bool {
    !matches!(kind, ActionKind::SendEmail | ActionKind::Webhook)
}

// ---------------------------------------------------------------------------
// estimate
// ---------------------------------------------------------------------------

/// Score a plan before execution. Risk is the maximum over all actions;
/// the affected-item estimate sums executor previews and degrades to
/// unknown (with `reversible = false`, conservatively) as soon as one
/// action cannot answer.
pub async fn estimate(plan: &ActionPlan, registry: &ExecutorRegistry) -> Impact {
    let mut risk = RiskLevel::Low;
    let mut affected: Option<u64> = Some(0);
    let mut reversible = true;
    let mut riskiest: Option<ActionKind> = None;

    for action in &plan.actions {
        let kind_risk = base_risk(action.kind);
        if kind_risk >= risk {
            risk = kind_risk;
            riskiest = Some(action.kind);
        }
        if !kind_reversible(action.kind) {
            reversible = false;
        }
        // Branch evaluation never leaves the pipeline; it has no blast
        // radius of its own.
        if action.kind == ActionKind::ConditionalBranch {
            continue;
        }

        let preview = match registry.get(action.kind) {
            Some(executor) => executor.preview(&action.parameters).await.ok(),
            None => None,
        };
        match preview {
            Some(p) => {
                if let (Some(total), Some(count)) = (affected, p.count_estimate) {
                    affected = Some(total + count);
                } else {
                    affected = None;
                    reversible = false;
                }
                if !p.reversible {
                    reversible = false;
                }
            }
            None => {
                affected = None;
                reversible = false;
            }
        }
    }

    let platforms = plan.platforms();
    let description = match riskiest {
        Some(kind) => format!(
            "{} action(s) across {} platform(s); highest risk {} ({})",
            plan.len(),
            platforms.len(),
            risk_str(risk),
            kind
        ),
        None => "empty plan; nothing to execute".to_string(),
    };

    Impact {
        risk_level: risk,
        affected_items: affected,
        reversible,
        description,
    }
}

fn risk_str(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
