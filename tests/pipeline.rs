use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use autotune_lib::command::CommandOutcome;
use autotune_lib::evaluator::category;
use autotune_lib::models::BYTES_PER_MB;
use autotune_lib::{
    build_plan, evaluate, load_snapshot, run_pipeline, ActionKind, ActionStatus, EventBus, Executor,
    ExecutorSettings, ManualTask, PipelineOptions, Severity, Snapshot, SnapshotFile, SystemControl, TrashOutcome,
};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Records calls and reports success for everything.
#[derive(Default)]
struct ScriptedControl {
    calls: Mutex<Vec<String>>,
}

impl ScriptedControl {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SystemControl for ScriptedControl {
    async fn set_power_plan(&self, plan: &str, _timeout: Duration) -> CommandOutcome {
        self.record(format!("power_plan {}", plan));
        CommandOutcome::success()
    }

    async fn apply_performance_visuals(&self, _timeout: Duration) -> CommandOutcome {
        self.record("visuals");
        CommandOutcome::success()
    }

    async fn flush_dns_cache(&self, _timeout: Duration) -> CommandOutcome {
        self.record("dns");
        CommandOutcome::success()
    }

    async fn empty_recycle_bin(&self, _timeout: Duration) -> Result<TrashOutcome, String> {
        self.record("trash");
        Ok(TrashOutcome::Emptied {
            freed_bytes: 50 * BYTES_PER_MB,
        })
    }

    fn find_processes(&self, _name: &str) -> Vec<u32> {
        vec![4242]
    }

    fn terminate_process(&self, pid: u32) -> Result<(), String> {
        self.record(format!("kill {}", pid));
        Ok(())
    }

    fn is_running(&self, _pid: u32) -> bool {
        false
    }

    fn start_process(&self, name: &str) -> Result<(), String> {
        self.record(format!("start {}", name));
        Ok(())
    }
}

fn fast_settings() -> ExecutorSettings {
    ExecutorSettings {
        shell_exit_wait_ms: 10,
        shell_poll_ms: 1,
        shell_settle_ms: 1,
        shell_retry_delay_ms: 1,
        ..ExecutorSettings::default()
    }
}

/// Points the fixture's temp folders at real directories holding 300 MB and
/// 200 MB of sparse files, and writes the result next to them.
fn staged_snapshot(dir: &TempDir) -> PathBuf {
    let mut snapshot = load_snapshot(&fixture("degraded_snapshot.json")).unwrap();
    for (folder, mb) in snapshot.cleanup.temp_folders.iter_mut().zip([300u64, 200]) {
        let path = dir.path().join(folder.path.file_name().unwrap());
        fs::create_dir_all(path.join("cache")).unwrap();
        File::create(path.join("cache").join("blob.tmp"))
            .unwrap()
            .set_len(mb * BYTES_PER_MB)
            .unwrap();
        folder.path = path;
    }
    let staged = dir.path().join("before.json");
    fs::write(&staged, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
    staged
}

#[test]
fn degraded_machine_is_flagged_and_planned() {
    let snapshot = load_snapshot(&fixture("degraded_snapshot.json")).unwrap();
    let evaluation = evaluate(&snapshot);

    assert!(evaluation.score.value() < 80);
    let first = &evaluation.issues[0];
    assert_eq!(first.severity, Severity::Critical);
    assert_eq!(first.category, category::MEMORY);

    let plan = build_plan(&snapshot, &evaluation.issues);
    let kinds: Vec<&ActionKind> = plan.actions().iter().map(|a| &a.kind).collect();
    assert!(matches!(kinds[0], ActionKind::SetPowerPlan { plan } if plan == "High performance"));
    assert_eq!(kinds[1], &ActionKind::ApplyPerformanceVisuals);
    assert!(matches!(kinds[2], ActionKind::CleanTempFolders { folders } if folders.len() == 2));
    assert_eq!(kinds[3], &ActionKind::EmptyRecycleBin);
    assert!(matches!(kinds[4], ActionKind::RestartShell { .. }));
    assert_eq!(kinds[5], &ActionKind::FlushDnsCache);
    assert_eq!(
        kinds[6],
        &ActionKind::Manual {
            task: ManualTask::RemoveWindowsOld
        }
    );
    assert_eq!(
        kinds[7],
        &ActionKind::Manual {
            task: ManualTask::UpdateGpuDriver
        }
    );
    assert_eq!(plan.len(), 8);
    assert_eq!(plan.actions()[2].estimated_free_mb, 500);
    assert!(plan.actions().iter().enumerate().all(|(i, a)| a.id == i));
}

#[test]
fn evaluation_is_deterministic() {
    let snapshot = load_snapshot(&fixture("degraded_snapshot.json")).unwrap();
    assert_eq!(evaluate(&snapshot), evaluate(&snapshot));
}

#[tokio::test]
async fn full_run_executes_and_compares() {
    let dir = TempDir::new().unwrap();
    let scanner = SnapshotFile::new(staged_snapshot(&dir)).with_after(fixture("after_snapshot.json"));
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let executor = Executor::new(ScriptedControl::default(), fast_settings()).with_events(bus);

    let report = run_pipeline(&scanner, &executor, &PipelineOptions::default())
        .await
        .unwrap();

    // Manual work is handed back untouched
    let manual: Vec<_> = report.manual_actions().collect();
    assert_eq!(manual.len(), 2);
    assert!(manual.iter().all(|a| a.status == ActionStatus::Pending));

    // Everything automatable ran to a result
    assert!(report
        .actions
        .iter()
        .filter(|a| a.is_automatable)
        .all(|a| a.status == ActionStatus::Success));

    let summary = report.summary.clone().unwrap();
    assert_eq!(summary.actions_run, 6);
    assert_eq!(summary.failure_count, 0);
    assert_eq!(summary.manual_count, 2);
    assert_eq!(summary.total_freed_mb, 550);

    let cleanup = &report.actions[2];
    assert_eq!(cleanup.actual_freed_mb, 500);
    assert!(fs::read_dir(dir.path().join("TEMP_USER")).unwrap().next().is_none());

    let delta = report.comparison.unwrap();
    assert_eq!(delta.ram_freed_mb, 4_700);
    assert_eq!(delta.cpu_delta, 22.5);
    assert_eq!(delta.disk_freed_percent, 0.2);
    assert!(report.score_after.unwrap() > report.score);

    assert_eq!(
        executor_calls(&executor),
        vec![
            "power_plan High performance",
            "visuals",
            "trash",
            "kill 4242",
            "start explorer.exe",
            "dns"
        ]
    );

    let mut finished = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, autotune_lib::EngineEvent::ActionFinished { .. }) {
            finished += 1;
        }
    }
    assert_eq!(finished, 6);
}

fn executor_calls(executor: &Executor<ScriptedControl>) -> Vec<String> {
    executor.control().calls()
}

#[tokio::test]
async fn dry_run_executes_nothing() {
    let dir = TempDir::new().unwrap();
    let scanner = SnapshotFile::new(staged_snapshot(&dir));
    let executor = Executor::new(ScriptedControl::default(), fast_settings());
    let options = PipelineOptions {
        dry_run: true,
        ..PipelineOptions::default()
    };

    let report = run_pipeline(&scanner, &executor, &options).await.unwrap();

    assert!(report.summary.is_none());
    assert!(report.comparison.is_none());
    assert!(report.actions.iter().all(|a| a.status == ActionStatus::Pending));
    assert!(executor_calls(&executor).is_empty());
    assert!(dir.path().join("TEMP_USER/cache/blob.tmp").exists());
}

#[tokio::test]
async fn report_survives_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let scanner = SnapshotFile::new(staged_snapshot(&dir)).with_after(fixture("after_snapshot.json"));
    let executor = Executor::new(ScriptedControl::default(), fast_settings());
    let report = run_pipeline(&scanner, &executor, &PipelineOptions::default())
        .await
        .unwrap();

    let restored = autotune_lib::RunReport::from_json(&report.to_json().unwrap()).unwrap();
    assert_eq!(restored.summary, report.summary);
    assert_eq!(restored.actions, report.actions);
    assert_eq!(restored.comparison, report.comparison);
}

#[tokio::test]
async fn unreadable_after_snapshot_keeps_the_run() {
    let dir = TempDir::new().unwrap();
    let scanner = SnapshotFile::new(staged_snapshot(&dir)).with_after(dir.path().join("missing.json"));
    let executor = Executor::new(ScriptedControl::default(), fast_settings());

    let report = run_pipeline(&scanner, &executor, &PipelineOptions::default())
        .await
        .unwrap();

    assert!(report.summary.is_some());
    assert!(report.comparison.is_none());
}

#[test]
fn after_fixture_is_valid() {
    let after: Snapshot = load_snapshot(&fixture("after_snapshot.json")).unwrap();
    assert_eq!(after.memory.used_mb, 11_200);
}
