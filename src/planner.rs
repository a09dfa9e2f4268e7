//! Remediation planning.
//!
//! Maps diagnostic facts to candidate actions. Each rule looks at one fact
//! and yields at most one action; rules run in a fixed order so the plan is
//! stable for the same input. Nothing here touches the machine.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actions::{ActionKind, ManualTask, OptimizationAction, Plan, Risk};
use crate::evaluator::{category, GPU_DRIVER_ADVICE};
use crate::models::{
    bytes_to_mb, Detected, FlaggedIssue, Snapshot, VisualEffects, HIGH_PERFORMANCE_PLAN,
};

/// Planner tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Power plan the engine switches to
    pub target_power_plan: String,
    /// Shell working set above which a restart is proposed
    pub shell_memory_threshold_mb: u64,
    /// Shell uptime above which a restart is proposed
    pub shell_uptime_threshold_hours: u64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            target_power_plan: HIGH_PERFORMANCE_PLAN.to_string(),
            shell_memory_threshold_mb: 400,
            shell_uptime_threshold_hours: 72,
        }
    }
}

/// Builds a plan with the default planner settings.
pub fn build_plan(snapshot: &Snapshot, issues: &[FlaggedIssue]) -> Plan {
    build_plan_with(snapshot, issues, &PlannerSettings::default())
}

pub fn build_plan_with(
    snapshot: &Snapshot,
    issues: &[FlaggedIssue],
    settings: &PlannerSettings,
) -> Plan {
    let rules: [fn(&Snapshot, &[FlaggedIssue], &PlannerSettings) -> Option<OptimizationAction>; 12] = [
        power_plan,
        visual_effects,
        temp_folders,
        recycle_bin,
        shell_restart,
        dns_flush,
        windows_old,
        upgrade_logs,
        gpu_driver,
        office_repair,
        antivirus,
        startup_review,
    ];

    let plan: Plan = rules
        .iter()
        .filter_map(|rule| rule(snapshot, issues, settings))
        .collect();

    debug!(
        actions = plan.len(),
        automatable = plan.automatable().count(),
        estimated_mb = plan.estimated_free_mb(),
        "built optimization plan"
    );
    plan
}

fn power_plan(s: &Snapshot, _: &[FlaggedIssue], cfg: &PlannerSettings) -> Option<OptimizationAction> {
    if s.performance
        .power_plan
        .trim()
        .eq_ignore_ascii_case(&cfg.target_power_plan)
    {
        return None;
    }
    Some(OptimizationAction::new(
        ActionKind::SetPowerPlan {
            plan: cfg.target_power_plan.clone(),
        },
        category::POWER,
        format!("Switch to {} power plan", cfg.target_power_plan),
        format!(
            "The active plan is '{}'. Switching keeps the CPU at full clock under load.",
            s.performance.power_plan
        ),
        Risk::Safe,
    ))
}

fn visual_effects(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    if s.performance.visual_effects == VisualEffects::BestPerformance {
        return None;
    }
    Some(OptimizationAction::new(
        ActionKind::ApplyPerformanceVisuals,
        category::POWER,
        "Adjust visual effects for best performance",
        "Turns off animations and shadows that cost GPU and CPU time.",
        Risk::Safe,
    ))
}

fn temp_folders(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    let bytes = s.cleanup.temp_bytes();
    if bytes == 0 {
        return None;
    }
    let folders: Vec<_> = s
        .cleanup
        .temp_folders
        .iter()
        .filter(|f| f.size_bytes > 0)
        .map(|f| f.path.clone())
        .collect();
    let count = folders.len();
    Some(
        OptimizationAction::new(
            ActionKind::CleanTempFolders { folders },
            category::CLEANUP,
            "Clean temporary files",
            format!("Deletes {} MB of temporary files from {} folder(s).", bytes_to_mb(bytes), count),
            Risk::Safe,
        )
        .with_estimate(bytes_to_mb(bytes)),
    )
}

fn recycle_bin(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    if s.cleanup.recycle_bin_bytes == 0 && s.cleanup.recycle_bin_items == 0 {
        return None;
    }
    Some(
        OptimizationAction::new(
            ActionKind::EmptyRecycleBin,
            category::CLEANUP,
            "Empty the Recycle Bin",
            format!(
                "Permanently removes {} item(s) ({} MB).",
                s.cleanup.recycle_bin_items,
                bytes_to_mb(s.cleanup.recycle_bin_bytes)
            ),
            Risk::Safe,
        )
        .with_estimate(bytes_to_mb(s.cleanup.recycle_bin_bytes)),
    )
}

fn shell_restart(s: &Snapshot, _: &[FlaggedIssue], cfg: &PlannerSettings) -> Option<OptimizationAction> {
    let shell = &s.shell;
    if shell.instance_count == 0 {
        return None;
    }
    let bloated = shell.working_set_mb > cfg.shell_memory_threshold_mb;
    let stale = shell.uptime_hours > cfg.shell_uptime_threshold_hours;
    if !bloated && !stale {
        return None;
    }
    Some(OptimizationAction::new(
        ActionKind::RestartShell {
            process_name: shell.process_name.clone(),
        },
        category::SYSTEM,
        format!("Restart {}", shell.process_name),
        format!(
            "The shell uses {} MB after {} hours. The taskbar and open folders disappear briefly.",
            shell.working_set_mb, shell.uptime_hours
        ),
        Risk::Moderate,
    ))
}

fn dns_flush(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    s.network.as_present()?;
    Some(OptimizationAction::new(
        ActionKind::FlushDnsCache,
        category::NETWORK,
        "Flush DNS cache",
        "Discards cached name lookups so stale records are resolved again.",
        Risk::Safe,
    ))
}

fn windows_old(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    let Detected::Present(old) = &s.cleanup.windows_old else {
        return None;
    };
    Some(
        OptimizationAction::new(
            ActionKind::Manual {
                task: ManualTask::RemoveWindowsOld,
            },
            category::CLEANUP,
            "Remove previous Windows installation",
            format!(
                "{} holds {} MB. Removing it prevents rolling back the last upgrade; use Disk Cleanup as administrator.",
                old.path.display(),
                bytes_to_mb(old.size_bytes)
            ),
            Risk::RequiresReboot,
        )
        .with_estimate(bytes_to_mb(old.size_bytes)),
    )
}

fn upgrade_logs(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    let Detected::Present(logs) = &s.cleanup.upgrade_logs else {
        return None;
    };
    Some(
        OptimizationAction::new(
            ActionKind::Manual {
                task: ManualTask::CleanUpgradeLogs,
            },
            category::CLEANUP,
            "Clean upgrade log files",
            format!(
                "{} holds {} MB of setup logs. Deleting them requires administrator rights.",
                logs.path.display(),
                bytes_to_mb(logs.size_bytes)
            ),
            Risk::Moderate,
        )
        .with_estimate(bytes_to_mb(logs.size_bytes)),
    )
}

fn gpu_driver(s: &Snapshot, issues: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    if !issues
        .iter()
        .any(|i| i.category == category::GPU && i.recommendation == GPU_DRIVER_ADVICE)
    {
        return None;
    }
    let gpu = s.gpu.as_present()?;
    let date = gpu.driver_date?;
    let age_days = (s.captured_at.date_naive() - date).num_days();
    Some(OptimizationAction::new(
        ActionKind::Manual {
            task: ManualTask::UpdateGpuDriver,
        },
        category::GPU,
        format!("Update {} driver", gpu.name),
        format!(
            "Driver {} is {} days old. Download the current driver from the vendor.",
            gpu.driver_version, age_days
        ),
        Risk::RequiresReboot,
    ))
}

fn office_repair(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    let office = s.software.office.as_present()?;
    if !office.needs_repair {
        return None;
    }
    Some(OptimizationAction::new(
        ActionKind::Manual {
            task: ManualTask::RepairOffice,
        },
        category::SOFTWARE,
        "Repair Microsoft Office",
        format!("Run a quick repair of Office {} from Apps & features.", office.version),
        Risk::Moderate,
    ))
}

fn antivirus(s: &Snapshot, _: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    let description = match &s.security.antivirus {
        Detected::Absent => "No antivirus is registered. Install one or enable the built-in protection.".to_string(),
        Detected::Present(av) if !av.enabled || !av.realtime_protection => {
            format!("{} is turned off. Re-enable real-time protection.", av.product)
        }
        Detected::Present(_) => return None,
    };
    Some(OptimizationAction::new(
        ActionKind::Manual {
            task: ManualTask::EnableAntivirus,
        },
        category::SECURITY,
        "Enable antivirus protection",
        description,
        Risk::Moderate,
    ))
}

fn startup_review(s: &Snapshot, issues: &[FlaggedIssue], _: &PlannerSettings) -> Option<OptimizationAction> {
    if !issues.iter().any(|i| i.category == category::STARTUP) {
        return None;
    }
    let enabled = s.startup.iter().filter(|e| e.enabled).count();
    Some(OptimizationAction::new(
        ActionKind::Manual {
            task: ManualTask::ReviewStartupPrograms,
        },
        category::STARTUP,
        "Review startup programs",
        format!("{} programs launch at logon. Disable the ones you do not need.", enabled),
        Risk::Safe,
    ))
}
