//! Action plan data model.
//!
//! An `ActionPlan` is the ordered list of `ActionSpec`s executed for one
//! invocation of a command or automation. Plans are validated before the
//! orchestrator touches them and are immutable once an execution starts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// The closed set of action types the pipeline can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    UpdateInventory,
    UpdatePrice,
    ApplyDiscount,
    SyncPlatform,
    Webhook,
    Wait,
    RunCommand,
    GenerateReport,
    ConditionalBranch,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::SendEmail,
            ActionKind::UpdateInventory,
            ActionKind::UpdatePrice,
            ActionKind::ApplyDiscount,
            ActionKind::SyncPlatform,
            ActionKind::Webhook,
            ActionKind::Wait,
            ActionKind::RunCommand,
            ActionKind::GenerateReport,
            ActionKind::ConditionalBranch,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::SendEmail => "send_email",
            ActionKind::UpdateInventory => "update_inventory",
            ActionKind::UpdatePrice => "update_price",
            ActionKind::ApplyDiscount => "apply_discount",
            ActionKind::SyncPlatform => "sync_platform",
            ActionKind::Webhook => "webhook",
            ActionKind::Wait => "wait",
            ActionKind::RunCommand => "run_command",
            ActionKind::GenerateReport => "generate_report",
            ActionKind::ConditionalBranch => "conditional_branch",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "send_email" => Ok(ActionKind::SendEmail),
            "update_inventory" => Ok(ActionKind::UpdateInventory),
            "update_price" => Ok(ActionKind::UpdatePrice),
            "apply_discount" => Ok(ActionKind::ApplyDiscount),
            "sync_platform" => Ok(ActionKind::SyncPlatform),
            "webhook" => Ok(ActionKind::Webhook),
            "wait" => Ok(ActionKind::Wait),
            "run_command" => Ok(ActionKind::RunCommand),
            "generate_report" => Ok(ActionKind::GenerateReport),
            "conditional_branch" => Ok(ActionKind::ConditionalBranch),
            _ => Err(PipelineError::InvalidPlan(format!(
                "unknown action kind '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// BranchPredicate / BranchSpec
// ---------------------------------------------------------------------------

/// Predicate a `conditional_branch` action evaluates against the execution
/// scope (`trigger.*` and `outputs.<action_id>.*` key paths).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BranchPredicate {
    /// The key path resolves to any value.
    Exists { key: String },
    /// The key path resolves to exactly `value`.
    Equals { key: String, value: serde_json::Value },
    /// The key path resolves to a truthy value (non-null, non-false,
    /// non-zero, non-empty).
    Truthy { key: String },
}

impl BranchPredicate {
    pub fn evaluate(&self, scope: &serde_json::Value) -> bool {
        match self {
            BranchPredicate::Exists { key } => lookup(scope, key).is_some(),
            BranchPredicate::Equals { key, value } => lookup(scope, key) == Some(value),
            BranchPredicate::Truthy { key } => match lookup(scope, key) {
                None => false,
                Some(v) => match v {
                    serde_json::Value::Null => false,
                    serde_json::Value::Bool(b) => *b,
                    serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    serde_json::Value::String(s) => !s.is_empty(),
                    serde_json::Value::Array(a) => !a.is_empty(),
                    serde_json::Value::Object(o) => !o.is_empty(),
                },
            },
        }
    }
}

/// Resolve a dotted key path (`"trigger.order.total"`) inside a JSON object.
fn lookup<'a>(scope: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    let mut current = scope;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Explicit skip range attached to a `conditional_branch` action.
///
/// When the predicate evaluates false, every action with
/// `order` in `(branch_order, skip_through]` is skipped. The range is
/// declared in the plan; branching is never free-form control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub predicate: BranchPredicate,
    pub skip_through: u32,
}

// ---------------------------------------------------------------------------
// ActionSpec
// ---------------------------------------------------------------------------

/// One typed action in a plan. Immutable once an execution starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub id: Uuid,
    pub kind: ActionKind,
    /// Position in the plan; unique and strictly increasing across the plan.
    pub order: u32,
    /// Human-readable label used in traces; defaults to the kind name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Opaque parameters passed through to the executor.
    #[serde(default = "empty_params")]
    pub parameters: serde_json::Value,
    /// Platform identifiers this action touches.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub platform_targets: BTreeSet<String>,
    /// Ids of earlier actions whose output this action consumes. If any of
    /// them fails, this action is marked failed without being invoked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Uuid>,
    /// Present iff `kind == conditional_branch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchSpec>,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ActionSpec {
    pub fn new(kind: ActionKind, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            order,
            label: None,
            parameters: empty_params(),
            platform_targets: BTreeSet::new(),
            depends_on: Vec::new(),
            branch: None,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The name this action appears under in traces and previews.
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.kind.as_str().to_string())
    }
}

// ---------------------------------------------------------------------------
// ActionPlan
// ---------------------------------------------------------------------------

/// Ordered sequence of actions for one invocation. An empty plan is valid
/// and executes as a no-op success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl ActionPlan {
    pub fn new(actions: Vec<ActionSpec>) -> Self {
        Self { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn action(&self, id: Uuid) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// All distinct platform identifiers the plan touches.
    pub fn platforms(&self) -> BTreeSet<String> {
        self.actions
            .iter()
            .flat_map(|a| a.platform_targets.iter().cloned())
            .collect()
    }

    /// Check the plan's structural invariants:
    /// - `order` values are unique and strictly increasing as declared
    /// - action ids are unique
    /// - `branch` is present exactly on `conditional_branch` actions and
    ///   its `skip_through` lies past the branch itself
    /// - `depends_on` references resolve to earlier actions
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        for pair in self.actions.windows(2) {
            if pair[1].order <= pair[0].order {
                return Err(PipelineError::InvalidPlan(format!(
                    "action order must be strictly increasing: {} then {}",
                    pair[0].order, pair[1].order
                )));
            }
        }

        for (i, action) in self.actions.iter().enumerate() {
            if !seen_ids.insert(action.id) {
                return Err(PipelineError::InvalidPlan(format!(
                    "duplicate action id {}",
                    action.id
                )));
            }

            match (&action.kind, &action.branch) {
                (ActionKind::ConditionalBranch, None) => {
                    return Err(PipelineError::InvalidPlan(format!(
                        "conditional_branch action {} has no branch spec",
                        action.id
                    )));
                }
                (ActionKind::ConditionalBranch, Some(branch)) => {
                    if branch.skip_through <= action.order {
                        return Err(PipelineError::InvalidPlan(format!(
                            "branch at order {} must skip forward, got skip_through {}",
                            action.order, branch.skip_through
                        )));
                    }
                }
                (_, Some(_)) => {
                    return Err(PipelineError::InvalidPlan(format!(
                        "action {} is not a conditional_branch but carries a branch spec",
                        action.id
                    )));
                }
                (_, None) => {}
            }

            for dep in &action.depends_on {
                let upstream = self.actions[..i].iter().any(|a| a.id == *dep);
                if !upstream {
                    return Err(PipelineError::InvalidPlan(format!(
                        "action {} depends on {dep}, which is not an earlier action",
                        action.id
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
