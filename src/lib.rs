//! # AutoTune engine
//!
//! Turns a snapshot of a workstation's state into a health assessment, a
//! remediation plan, and a record of what executing that plan actually did.
//!
//! ```text
//! Scanner -> Snapshot -> evaluate -> build_plan -> Executor::run -> RunReport
//!                                                       |
//!                                  rescan -> compare ---+
//! ```
//!
//! Measurement and rendering happen elsewhere. This crate consumes snapshots
//! through [`Scanner`] and hands back a [`RunReport`].

pub mod actions;
pub mod cleanup;
pub mod command;
pub mod comparator;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod executor;
pub mod models;
pub mod paths;
pub mod planner;
pub mod reports;
pub mod settings;
pub mod state;
pub mod system;

#[cfg(test)]
mod testing;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub use crate::actions::{
    ActionKind, ActionStatus, ExecutedPlan, ManualTask, OptimizationAction, OptimizationSummary, Plan, Risk,
};
pub use crate::comparator::{compare, SnapshotDelta};
pub use crate::error::{EngineError, Result};
pub use crate::evaluator::{evaluate, evaluate_with, Evaluation, Thresholds};
pub use crate::events::{EngineEvent, EventBus};
pub use crate::executor::{Executor, ExecutorSettings, RunControl};
pub use crate::models::{FlaggedIssue, HealthScore, Severity, Snapshot};
pub use crate::planner::{build_plan, build_plan_with, PlannerSettings};
pub use crate::reports::RunReport;
pub use crate::settings::EngineSettings;
pub use crate::system::{OsControl, SystemControl, TrashOutcome};

/// Source of snapshots.
pub trait Scanner {
    /// Captures the machine state before any changes.
    fn scan(&self) -> Result<Snapshot>;

    /// Captures the state after a run. `None` means no rescan is available.
    fn rescan(&self) -> Result<Option<Snapshot>> {
        self.scan().map(Some)
    }
}

/// Reads snapshots the scanner already wrote as JSON.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    before: PathBuf,
    after: Option<PathBuf>,
}

impl SnapshotFile {
    pub fn new(before: impl Into<PathBuf>) -> Self {
        Self {
            before: before.into(),
            after: None,
        }
    }

    /// Uses `after` as the post-run snapshot.
    pub fn with_after(mut self, after: impl Into<PathBuf>) -> Self {
        self.after = Some(after.into());
        self
    }
}

impl Scanner for SnapshotFile {
    fn scan(&self) -> Result<Snapshot> {
        load_snapshot(&self.before)
    }

    fn rescan(&self) -> Result<Option<Snapshot>> {
        self.after.as_deref().map(load_snapshot).transpose()
    }
}

/// Parses and validates a snapshot JSON file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let text = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    let snapshot: Snapshot =
        serde_json::from_str(&text).map_err(|e| EngineError::parse(path.display().to_string(), e))?;
    snapshot.validate()?;
    Ok(snapshot)
}

/// Knobs for [`run_pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub thresholds: Thresholds,
    pub planner: PlannerSettings,
    /// Plan only; execute nothing
    pub dry_run: bool,
}

impl PipelineOptions {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            thresholds: settings.thresholds.clone(),
            planner: settings.planner.clone(),
            dry_run: false,
        }
    }
}

/// Scan, evaluate, plan, execute, rescan and compare.
///
/// A failed rescan does not discard the run; the report is returned without
/// a comparison.
pub async fn run_pipeline<S, C>(scanner: &S, executor: &Executor<C>, options: &PipelineOptions) -> Result<RunReport>
where
    S: Scanner + ?Sized,
    C: SystemControl,
{
    let before = scanner.scan()?;
    before.validate()?;

    let evaluation = evaluate_with(&before, &options.thresholds);
    info!(
        host = %before.system.hostname,
        score = evaluation.score.value(),
        issues = evaluation.issues.len(),
        "snapshot evaluated"
    );

    let plan = build_plan_with(&before, &evaluation.issues, &options.planner);
    if options.dry_run {
        info!(actions = plan.len(), "dry run, nothing executed");
        return Ok(RunReport::planned(before, evaluation, plan));
    }

    let executed = executor.run(plan).await?;
    let report = RunReport::executed(before, evaluation, executed);

    match scanner.rescan().and_then(|after| after.map(|s| s.validate().map(|()| s)).transpose()) {
        Ok(Some(after)) => {
            let after_evaluation = evaluate_with(&after, &options.thresholds);
            let report = report.with_after(after, &after_evaluation);
            if let Some(delta) = report.comparison {
                info!(
                    cpu_delta = delta.cpu_delta,
                    ram_freed_mb = delta.ram_freed_mb,
                    disk_freed_percent = delta.disk_freed_percent,
                    "before/after comparison"
                );
            }
            Ok(report)
        }
        Ok(None) => Ok(report),
        Err(e) => {
            warn!(error = %e, "rescan failed, report has no comparison");
            Ok(report)
        }
    }
}
