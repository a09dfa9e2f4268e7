//! Optimization actions and their execution state.
//!
//! The planner builds a [`Plan`] of `Pending` actions. The executor takes the
//! plan by value and hands back an [`ExecutedPlan`]; after that the records
//! are read-only and belong to whoever renders them.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// How disruptive an action is for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Risk {
    Safe,
    Moderate,
    RequiresReboot,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::Safe => write!(f, "Safe"),
            Risk::Moderate => write!(f, "Moderate"),
            Risk::RequiresReboot => write!(f, "Requires reboot"),
        }
    }
}

/// Execution state of one action.
///
/// `Pending` is the only non-terminal state. Once an action reaches any other
/// state it stays there for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    Pending,
    Success,
    PartialSuccess,
    NoChange,
    Failed,
    Skipped,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }

    /// Whether the action counts toward `actions_run` in the summary.
    pub fn counts_as_run(self) -> bool {
        matches!(
            self,
            ActionStatus::Success
                | ActionStatus::PartialSuccess
                | ActionStatus::NoChange
                | ActionStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Success => "success",
            ActionStatus::PartialSuccess => "partial success",
            ActionStatus::NoChange => "no change",
            ActionStatus::Failed => "failed",
            ActionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remediation the user has to carry out personally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualTask {
    RemoveWindowsOld,
    CleanUpgradeLogs,
    UpdateGpuDriver,
    RepairOffice,
    EnableAntivirus,
    ReviewStartupPrograms,
}

/// What an action does when executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Activate the named power plan
    SetPowerPlan { plan: String },
    /// Switch visual effects to best performance
    ApplyPerformanceVisuals,
    /// Delete the contents of the listed temp folders
    CleanTempFolders { folders: Vec<PathBuf> },
    EmptyRecycleBin,
    /// Terminate and relaunch the desktop shell
    RestartShell { process_name: String },
    FlushDnsCache,
    Manual { task: ManualTask },
}

impl ActionKind {
    pub fn is_automatable(&self) -> bool {
        !matches!(self, ActionKind::Manual { .. })
    }
}

/// One planned or executed remediation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationAction {
    /// Position in the plan
    pub id: usize,
    pub category: String,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: ActionKind,
    pub risk: Risk,
    pub is_automatable: bool,
    /// Storage the planner expects the action to reclaim
    pub estimated_free_mb: u64,
    /// Storage the executor actually reclaimed
    #[serde(default)]
    pub actual_freed_mb: u64,
    pub status: ActionStatus,
    #[serde(default)]
    pub result_message: String,
}

impl OptimizationAction {
    /// Creates a pending action. The id is assigned when it joins a [`Plan`].
    pub fn new(
        kind: ActionKind,
        category: &str,
        title: impl Into<String>,
        description: impl Into<String>,
        risk: Risk,
    ) -> Self {
        Self {
            id: 0,
            category: category.to_string(),
            title: title.into(),
            description: description.into(),
            is_automatable: kind.is_automatable(),
            kind,
            risk,
            estimated_free_mb: 0,
            actual_freed_mb: 0,
            status: ActionStatus::Pending,
            result_message: String::new(),
        }
    }

    pub fn with_estimate(mut self, estimated_free_mb: u64) -> Self {
        self.estimated_free_mb = estimated_free_mb;
        self
    }

    /// Records the execution outcome. Only a pending action can be completed,
    /// and only with a terminal status.
    pub(crate) fn complete(&mut self, outcome: ActionOutcome) -> Result<(), EngineError> {
        if self.status.is_terminal() || !outcome.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: outcome.status,
            });
        }
        self.status = outcome.status;
        self.actual_freed_mb = outcome.freed_mb;
        self.result_message = outcome.message;
        Ok(())
    }
}

/// What the executor learned from running one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    pub freed_mb: u64,
    pub message: String,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Success, message)
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::PartialSuccess, message)
    }

    pub fn no_change(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::NoChange, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Failed, message)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Skipped, message)
    }

    pub fn freed(mut self, freed_mb: u64) -> Self {
        self.freed_mb = freed_mb;
        self
    }

    fn with_status(status: ActionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            freed_mb: 0,
            message: message.into(),
        }
    }
}

/// Ordered list of pending actions produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    actions: Vec<OptimizationAction>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action, assigning it the next id.
    pub fn push(&mut self, mut action: OptimizationAction) {
        action.id = self.actions.len();
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[OptimizationAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<OptimizationAction> {
        self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn automatable(&self) -> impl Iterator<Item = &OptimizationAction> {
        self.actions.iter().filter(|a| a.is_automatable)
    }

    pub fn manual(&self) -> impl Iterator<Item = &OptimizationAction> {
        self.actions.iter().filter(|a| !a.is_automatable)
    }

    pub fn estimated_free_mb(&self) -> u64 {
        self.actions.iter().map(|a| a.estimated_free_mb).sum()
    }

    /// Checks a plan that did not come straight from the planner, such as one
    /// loaded from JSON, before it is handed to the executor.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (index, action) in self.actions.iter().enumerate() {
            if action.id != index {
                return Err(EngineError::InvalidPlan(format!(
                    "action '{}' has id {} at position {}",
                    action.title, action.id, index
                )));
            }
            if action.status != ActionStatus::Pending {
                return Err(EngineError::InvalidPlan(format!(
                    "action '{}' is already {}",
                    action.title, action.status
                )));
            }
            if action.is_automatable != action.kind.is_automatable() {
                return Err(EngineError::InvalidPlan(format!(
                    "action '{}' automatability does not match its kind",
                    action.title
                )));
            }
            if action.actual_freed_mb != 0 || !action.result_message.is_empty() {
                return Err(EngineError::InvalidPlan(format!(
                    "action '{}' carries an execution result",
                    action.title
                )));
            }
        }
        Ok(())
    }
}

impl FromIterator<OptimizationAction> for Plan {
    fn from_iter<I: IntoIterator<Item = OptimizationAction>>(iter: I) -> Self {
        let mut plan = Plan::new();
        for action in iter {
            plan.push(action);
        }
        plan
    }
}

/// Aggregate outcome of one execution run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptimizationSummary {
    /// Actions that ran to a result (success, partial, no change or failed)
    pub actions_run: usize,
    pub total_freed_mb: u64,
    pub failure_count: usize,
    #[serde(default)]
    pub success_count: usize,
    #[serde(default)]
    pub partial_count: usize,
    #[serde(default)]
    pub no_change_count: usize,
    #[serde(default)]
    pub skipped_count: usize,
    /// Non-automatable actions left for the user
    #[serde(default)]
    pub manual_count: usize,
    #[serde(default)]
    pub duration_ms: u64,
}

impl OptimizationSummary {
    pub fn from_actions(actions: &[OptimizationAction], duration_ms: u64) -> Self {
        let count = |status: ActionStatus| actions.iter().filter(|a| a.status == status).count();
        Self {
            actions_run: actions.iter().filter(|a| a.status.counts_as_run()).count(),
            total_freed_mb: actions.iter().map(|a| a.actual_freed_mb).sum(),
            failure_count: count(ActionStatus::Failed),
            success_count: count(ActionStatus::Success),
            partial_count: count(ActionStatus::PartialSuccess),
            no_change_count: count(ActionStatus::NoChange),
            skipped_count: count(ActionStatus::Skipped),
            manual_count: actions.iter().filter(|a| !a.is_automatable).count(),
            duration_ms,
        }
    }
}

/// The executor's result: every action from the plan plus the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedPlan {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub actions: Vec<OptimizationAction>,
    pub summary: OptimizationSummary,
}

impl ExecutedPlan {
    pub fn manual_actions(&self) -> impl Iterator<Item = &OptimizationAction> {
        self.actions.iter().filter(|a| !a.is_automatable)
    }

    pub fn failed_actions(&self) -> impl Iterator<Item = &OptimizationAction> {
        self.actions.iter().filter(|a| a.status == ActionStatus::Failed)
    }
}
