//! The post-run report handed to renderers.
//!
//! A [`RunReport`] bundles everything known about one engine run: the
//! snapshot that was evaluated, the issues and score, every action with its
//! outcome, and the before/after comparison when a rescan happened. Saved
//! reports live in `data/reports/<hostname>__<timestamp>/report.json`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::actions::{ActionStatus, ExecutedPlan, OptimizationAction, OptimizationSummary, Plan};
use crate::comparator::{compare, SnapshotDelta};
use crate::error::{EngineError, Result};
use crate::evaluator::Evaluation;
use crate::models::{FlaggedIssue, HealthScore, Snapshot};

pub const REPORT_FILE: &str = "report.json";

/// Read-only record of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub hostname: String,
    pub score: HealthScore,
    pub grade: String,
    pub issues: Vec<FlaggedIssue>,
    pub actions: Vec<OptimizationAction>,
    /// Absent for a dry run
    #[serde(default)]
    pub summary: Option<OptimizationSummary>,
    pub before: Snapshot,
    #[serde(default)]
    pub after: Option<Snapshot>,
    #[serde(default)]
    pub score_after: Option<HealthScore>,
    #[serde(default)]
    pub comparison: Option<SnapshotDelta>,
}

impl RunReport {
    /// Report for a plan that was built but not executed.
    pub fn planned(before: Snapshot, evaluation: Evaluation, plan: Plan) -> Self {
        Self::base(Uuid::new_v4(), before, evaluation, plan.into_actions(), None)
    }

    /// Report for an executed plan.
    pub fn executed(before: Snapshot, evaluation: Evaluation, executed: ExecutedPlan) -> Self {
        Self::base(
            executed.run_id,
            before,
            evaluation,
            executed.actions,
            Some(executed.summary),
        )
    }

    fn base(
        report_id: Uuid,
        before: Snapshot,
        evaluation: Evaluation,
        actions: Vec<OptimizationAction>,
        summary: Option<OptimizationSummary>,
    ) -> Self {
        Self {
            report_id,
            generated_at: Utc::now(),
            hostname: before.system.hostname.clone(),
            score: evaluation.score,
            grade: evaluation.score.grade().to_string(),
            issues: evaluation.issues,
            actions,
            summary,
            before,
            after: None,
            score_after: None,
            comparison: None,
        }
    }

    /// Attaches the rescan taken after execution.
    pub fn with_after(mut self, after: Snapshot, after_evaluation: &Evaluation) -> Self {
        self.comparison = Some(compare(&self.before, &after));
        self.score_after = Some(after_evaluation.score);
        self.after = Some(after);
        self
    }

    /// Actions the user still has to carry out by hand.
    pub fn manual_actions(&self) -> impl Iterator<Item = &OptimizationAction> {
        self.actions.iter().filter(|a| !a.is_automatable)
    }

    pub fn actions_with_status(&self, status: ActionStatus) -> impl Iterator<Item = &OptimizationAction> {
        self.actions.iter().filter(move |a| a.is_automatable && a.status == status)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| EngineError::Serialize {
            what: "run report".into(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| EngineError::parse("run report", e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::from_json(&text)
    }
}

/// Writes `report` to a new folder under `reports_dir` and returns the path
/// of the report file.
pub fn save_report(reports_dir: &Path, report: &RunReport) -> Result<PathBuf> {
    let folder = reports_dir.join(folder_name(&report.hostname, report.generated_at));
    fs::create_dir_all(&folder).map_err(|e| EngineError::io(&folder, e))?;
    let path = folder.join(REPORT_FILE);
    fs::write(&path, report.to_json()?).map_err(|e| EngineError::io(&path, e))?;
    info!(path = %path.display(), "report saved");
    Ok(path)
}

/// Report files under `reports_dir`, newest folder first.
pub fn list_reports(reports_dir: &Path) -> Result<Vec<PathBuf>> {
    if !reports_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(reports_dir).map_err(|e| EngineError::io(reports_dir, e))?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path().join(REPORT_FILE))
        .filter(|p| p.is_file())
        .collect();
    // Folder names end in a sortable timestamp
    found.sort_by(|a, b| timestamp_part(b).cmp(&timestamp_part(a)));
    Ok(found)
}

fn timestamp_part(report_file: &Path) -> String {
    report_file
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy())
        .and_then(|n| n.rsplit("__").next().map(str::to_string))
        .unwrap_or_default()
}

fn folder_name(hostname: &str, at: DateTime<Utc>) -> String {
    let host = sanitize_name(hostname);
    let host = if host.is_empty() { "Unknown_PC".to_string() } else { host };
    format!("{}__{}", host, at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Replaces characters that are unsafe in folder names and limits length.
fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(50)
        .collect();
    sanitized.trim_matches('_').to_string()
}
