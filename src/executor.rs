//! Runs a [`Plan`] against a [`SystemControl`].
//!
//! Actions run one at a time in plan order. Every automatable action ends in a
//! terminal status with a message; manual actions pass through untouched.
//! Nothing an individual action does can abort the run. The only hard error is
//! a plan that was not fresh from the planner.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::{ActionKind, ActionOutcome, ActionStatus, ExecutedPlan, OptimizationSummary, Plan};
use crate::cleanup::{self, CleanupReport};
use crate::command::CommandOutcome;
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::models::bytes_to_mb;
use crate::system::{SystemControl, TrashOutcome};

/// Timing and tolerance knobs for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Hard limit for each external command
    pub command_timeout_secs: u64,
    /// Extra time the control gets to clean up after a command timeout
    pub control_grace_secs: u64,
    /// How long to wait for shell processes to exit after termination
    pub shell_exit_wait_ms: u64,
    pub shell_poll_ms: u64,
    /// Pause between the old shell exiting and the new one starting
    pub shell_settle_ms: u64,
    pub shell_retry_delay_ms: u64,
    /// Share of failed files above which a cleanup is only partial
    pub partial_failure_ratio: f64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 10,
            control_grace_secs: 5,
            shell_exit_wait_ms: 5_000,
            shell_poll_ms: 100,
            shell_settle_ms: 1_000,
            shell_retry_delay_ms: 500,
            partial_failure_ratio: 0.2,
        }
    }
}

impl ExecutorSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    fn control_deadline(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.saturating_add(self.control_grace_secs))
    }
}

/// Cooperative stop for a run in progress. The action currently executing
/// finishes; every automatable action after it is skipped.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stop: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

pub struct Executor<C> {
    control: C,
    settings: ExecutorSettings,
    events: EventBus,
    run_control: RunControl,
}

impl<C: SystemControl> Executor<C> {
    pub fn new(control: C, settings: ExecutorSettings) -> Self {
        Self {
            control,
            settings,
            events: EventBus::default(),
            run_control: RunControl::new(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_run_control(mut self, run_control: RunControl) -> Self {
        self.run_control = run_control;
        self
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn run_control(&self) -> RunControl {
        self.run_control.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Executes every automatable action in `plan` and returns the records.
    pub async fn run(&self, plan: Plan) -> Result<ExecutedPlan> {
        plan.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let automatable = plan.automatable().count();
        info!(%run_id, total = plan.len(), automatable, "starting optimization run");
        self.events.emit(EngineEvent::RunStarted {
            run_id,
            total: plan.len(),
            automatable,
        });

        let mut actions = plan.into_actions();
        for action in actions.iter_mut() {
            if !action.is_automatable {
                debug!(id = action.id, title = %action.title, "manual action left pending");
                self.events.emit(EngineEvent::ActionManual {
                    run_id,
                    id: action.id,
                    title: action.title.clone(),
                    risk: action.risk,
                });
                continue;
            }

            let outcome = if self.run_control.is_stop_requested() {
                ActionOutcome::skipped("Run stopped before this action started")
            } else {
                self.events.emit(EngineEvent::ActionStarted {
                    run_id,
                    id: action.id,
                    title: action.title.clone(),
                });
                info!(id = action.id, title = %action.title, "running action");
                self.execute(&action.kind).await
            };

            if outcome.status == ActionStatus::Failed {
                warn!(id = action.id, title = %action.title, message = %outcome.message, "action failed");
            } else {
                info!(
                    id = action.id,
                    status = %outcome.status,
                    freed_mb = outcome.freed_mb,
                    message = %outcome.message,
                    "action finished"
                );
            }

            action.complete(outcome)?;
            self.events.emit(EngineEvent::ActionFinished {
                run_id,
                id: action.id,
                title: action.title.clone(),
                status: action.status,
                freed_mb: action.actual_freed_mb,
                message: action.result_message.clone(),
            });
        }

        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = OptimizationSummary::from_actions(&actions, duration_ms);
        info!(
            %run_id,
            actions_run = summary.actions_run,
            failures = summary.failure_count,
            freed_mb = summary.total_freed_mb,
            duration_ms,
            "optimization run finished"
        );
        self.events.emit(EngineEvent::RunFinished {
            run_id,
            summary: summary.clone(),
        });

        Ok(ExecutedPlan {
            run_id,
            started_at,
            finished_at: Utc::now(),
            actions,
            summary,
        })
    }

    async fn execute(&self, kind: &ActionKind) -> ActionOutcome {
        let timeout = self.settings.command_timeout();
        match kind {
            ActionKind::SetPowerPlan { plan } => {
                let outcome = self.guarded(self.control.set_power_plan(plan, timeout)).await;
                command_outcome(outcome, &format!("Power plan set to {}", plan))
            }
            ActionKind::ApplyPerformanceVisuals => {
                let outcome = self.guarded(self.control.apply_performance_visuals(timeout)).await;
                command_outcome(outcome, "Visual effects set to best performance")
            }
            ActionKind::FlushDnsCache => {
                let outcome = self.guarded(self.control.flush_dns_cache(timeout)).await;
                command_outcome(outcome, "DNS resolver cache flushed")
            }
            ActionKind::CleanTempFolders { folders } => self.clean_temp(folders.clone()).await,
            ActionKind::EmptyRecycleBin => self.empty_recycle_bin(timeout).await,
            ActionKind::RestartShell { process_name } => self.restart_shell(process_name).await,
            ActionKind::Manual { .. } => ActionOutcome::skipped("Manual actions are never executed"),
        }
    }

    /// Bounds a control call so a control that never answers cannot stall
    /// the run.
    async fn guarded<F: Future<Output = CommandOutcome>>(&self, fut: F) -> CommandOutcome {
        let deadline = self.settings.control_deadline();
        match tokio::time::timeout(deadline, fut).await {
            Ok(outcome) => outcome,
            Err(_) => CommandOutcome::TimedOut {
                after: deadline,
                tree_terminated: false,
            },
        }
    }

    async fn clean_temp(&self, folders: Vec<PathBuf>) -> ActionOutcome {
        match tokio::task::spawn_blocking(move || cleanup::clean_folders(&folders)).await {
            Ok(report) => classify_cleanup(&report, self.settings.partial_failure_ratio),
            Err(e) => ActionOutcome::failed(format!("Cleanup worker stopped unexpectedly: {}", e)),
        }
    }

    async fn empty_recycle_bin(&self, timeout: Duration) -> ActionOutcome {
        let deadline = self.settings.control_deadline();
        match tokio::time::timeout(deadline, self.control.empty_recycle_bin(timeout)).await {
            Ok(Ok(TrashOutcome::Emptied { freed_bytes })) => {
                let freed_mb = bytes_to_mb(freed_bytes);
                ActionOutcome::success(format!("Recycle bin emptied ({} MB)", freed_mb)).freed(freed_mb)
            }
            Ok(Ok(TrashOutcome::AlreadyEmpty)) => ActionOutcome::success("Recycle bin was already empty"),
            Ok(Err(e)) => ActionOutcome::failed(format!("Could not empty the recycle bin: {}", e)),
            Err(_) => ActionOutcome::failed(format!(
                "Recycle bin request did not finish within {}s",
                deadline.as_secs()
            )),
        }
    }

    async fn restart_shell(&self, name: &str) -> ActionOutcome {
        let pids = self.control.find_processes(name);
        if pids.is_empty() {
            return match self.start_shell(name).await {
                Ok(()) => ActionOutcome::success(format!("{} was not running; started a new instance", name)),
                Err(e) => ActionOutcome::failed(e),
            };
        }

        let mut not_terminated = 0;
        for pid in &pids {
            if let Err(e) = self.control.terminate_process(*pid) {
                debug!(pid, error = %e, "terminate failed, continuing");
                not_terminated += 1;
            }
        }

        let exit_wait = Duration::from_millis(self.settings.shell_exit_wait_ms);
        let deadline = tokio::time::Instant::now().checked_add(exit_wait);
        while pids.iter().any(|pid| self.control.is_running(*pid)) {
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                warn!(name, "shell did not exit in time, starting replacement anyway");
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.settings.shell_poll_ms)).await;
        }
        tokio::time::sleep(Duration::from_millis(self.settings.shell_settle_ms)).await;

        match self.start_shell(name).await {
            Ok(()) if not_terminated > 0 => ActionOutcome::success(format!(
                "Restarted {}; {} of {} instance(s) could not be terminated",
                name,
                not_terminated,
                pids.len()
            )),
            Ok(()) => ActionOutcome::success(format!("Restarted {} ({} instance(s) replaced)", name, pids.len())),
            Err(e) => ActionOutcome::failed(e),
        }
    }

    /// Starts `name`, retrying once after a short delay.
    async fn start_shell(&self, name: &str) -> std::result::Result<(), String> {
        let first = match self.control.start_process(name) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(name, error = %first, "start failed, retrying once");
        tokio::time::sleep(Duration::from_millis(self.settings.shell_retry_delay_ms)).await;
        self.control
            .start_process(name)
            .map_err(|second| format!("Could not start {}: {}; retry failed: {}", name, first, second))
    }
}

fn command_outcome(outcome: CommandOutcome, success_message: &str) -> ActionOutcome {
    match outcome {
        CommandOutcome::Exited { code: 0, .. } => ActionOutcome::success(success_message),
        CommandOutcome::Exited { code, stderr, .. } if stderr.is_empty() => {
            ActionOutcome::failed(format!("exit code {}", code))
        }
        CommandOutcome::Exited { code, stderr, .. } => ActionOutcome::failed(format!("exit code {}: {}", code, stderr)),
        CommandOutcome::TimedOut { after, tree_terminated } => {
            let tail = if tree_terminated {
                "process tree terminated"
            } else {
                "process tree may still be running"
            };
            ActionOutcome::failed(format!("Timed out after {}s; {}", after.as_secs(), tail))
        }
        CommandOutcome::SpawnFailed(e) => ActionOutcome::failed(format!("Could not run command: {}", e)),
        CommandOutcome::Unsupported(reason) => ActionOutcome::failed(reason),
    }
}

/// Maps a cleanup report to an action outcome.
pub fn classify_cleanup(report: &CleanupReport, partial_failure_ratio: f64) -> ActionOutcome {
    let found = report.files_found();
    if found == 0 {
        return if report.all_inaccessible() {
            ActionOutcome::failed("None of the temp folders could be accessed")
        } else {
            ActionOutcome::no_change("Temp folders were already empty")
        };
    }

    let deleted = report.files_deleted();
    if deleted == 0 {
        return ActionOutcome::no_change(format!("All {} file(s) are in use; nothing was removed", found));
    }

    let freed_mb = bytes_to_mb(report.bytes_freed());
    let failed = report.files_failed();
    let inaccessible = report.inaccessible().count();
    let failure_ratio = failed as f64 / found as f64;

    if inaccessible > 0 || failure_ratio > partial_failure_ratio {
        let mut message = format!("Freed {} MB; {} of {} file(s) were locked", freed_mb, failed, found);
        if inaccessible > 0 {
            message.push_str(&format!(", {} folder(s) could not be accessed", inaccessible));
        }
        ActionOutcome::partial(message).freed(freed_mb)
    } else if failed > 0 {
        ActionOutcome::success(format!("Freed {} MB; {} file(s) in use were skipped", freed_mb, failed)).freed(freed_mb)
    } else {
        ActionOutcome::success(format!("Freed {} MB from {} file(s)", freed_mb, deleted)).freed(freed_mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ManualTask, OptimizationAction, Risk};
    use crate::cleanup::FolderReport;
    use crate::models::BYTES_PER_MB;
    use std::fs::File;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Exit(i32),
        Hang,
    }

    struct FakeControl {
        command: Behaviour,
        trash: std::result::Result<TrashOutcome, String>,
        shell_pids: Vec<u32>,
        start_failures: Mutex<u32>,
        calls: Mutex<Vec<String>>,
        stop_on_dns: Option<RunControl>,
        hang_dns: bool,
    }

    impl FakeControl {
        fn new() -> Self {
            Self {
                command: Behaviour::Exit(0),
                trash: Ok(TrashOutcome::AlreadyEmpty),
                shell_pids: Vec::new(),
                start_failures: Mutex::new(0),
                calls: Mutex::new(Vec::new()),
                stop_on_dns: None,
                hang_dns: false,
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        async fn command(&self, call: &str) -> CommandOutcome {
            self.record(call);
            match self.command {
                Behaviour::Exit(code) => CommandOutcome::Exited {
                    code,
                    stdout: String::new(),
                    stderr: String::new(),
                },
                Behaviour::Hang => std::future::pending().await,
            }
        }
    }

    impl SystemControl for FakeControl {
        async fn set_power_plan(&self, _plan: &str, _timeout: Duration) -> CommandOutcome {
            self.command("power_plan").await
        }

        async fn apply_performance_visuals(&self, _timeout: Duration) -> CommandOutcome {
            self.command("visuals").await
        }

        async fn flush_dns_cache(&self, _timeout: Duration) -> CommandOutcome {
            if let Some(rc) = &self.stop_on_dns {
                rc.request_stop();
            }
            if self.hang_dns {
                self.record("dns");
                return std::future::pending().await;
            }
            self.command("dns").await
        }

        async fn empty_recycle_bin(&self, _timeout: Duration) -> std::result::Result<TrashOutcome, String> {
            self.record("trash");
            self.trash.clone()
        }

        fn find_processes(&self, _name: &str) -> Vec<u32> {
            self.shell_pids.clone()
        }

        fn terminate_process(&self, pid: u32) -> std::result::Result<(), String> {
            self.record(&format!("kill {}", pid));
            Ok(())
        }

        fn is_running(&self, _pid: u32) -> bool {
            false
        }

        fn start_process(&self, name: &str) -> std::result::Result<(), String> {
            self.record(&format!("start {}", name));
            let mut failures = self.start_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err("access denied".into());
            }
            Ok(())
        }
    }

    fn action(kind: ActionKind) -> OptimizationAction {
        OptimizationAction::new(kind, "Test", "test action", "", Risk::Safe)
    }

    fn plan_of(kinds: Vec<ActionKind>) -> Plan {
        kinds.into_iter().map(action).collect()
    }

    fn executor(control: FakeControl) -> Executor<FakeControl> {
        Executor::new(control, ExecutorSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_command_fails_with_timeout() {
        let mut control = FakeControl::new();
        control.command = Behaviour::Hang;
        let executed = executor(control)
            .run(plan_of(vec![ActionKind::FlushDnsCache]))
            .await
            .unwrap();

        let dns = &executed.actions[0];
        assert_eq!(dns.status, ActionStatus::Failed);
        assert!(dns.result_message.contains("Timed out after 15s"), "{}", dns.result_message);
        assert_eq!(executed.summary.failure_count, 1);
        assert_eq!(executed.summary.actions_run, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_continues_after_a_hung_command() {
        let mut control = FakeControl::new();
        control.hang_dns = true;
        let exec = executor(control);
        let executed = exec
            .run(plan_of(vec![ActionKind::FlushDnsCache, ActionKind::ApplyPerformanceVisuals]))
            .await
            .unwrap();

        assert_eq!(executed.actions[0].status, ActionStatus::Failed);
        assert!(executed.actions[0].result_message.starts_with("Timed out after 15s"));
        assert_eq!(executed.actions[1].status, ActionStatus::Success);
        assert_eq!(executed.summary.actions_run, 2);
        assert_eq!(executed.summary.failure_count, 1);
        assert_eq!(*exec.control.calls.lock().unwrap(), vec!["dns", "visuals"]);
    }

    #[test]
    fn huge_timeouts_saturate() {
        let settings = ExecutorSettings {
            command_timeout_secs: u64::MAX,
            control_grace_secs: u64::MAX,
            ..ExecutorSettings::default()
        };
        assert_eq!(settings.control_deadline(), Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn unbounded_shell_wait_does_not_overflow() {
        let mut control = FakeControl::new();
        control.shell_pids = vec![40];
        let settings = ExecutorSettings {
            shell_exit_wait_ms: u64::MAX,
            shell_settle_ms: 0,
            ..ExecutorSettings::default()
        };
        let executed = Executor::new(control, settings)
            .run(plan_of(vec![ActionKind::RestartShell {
                process_name: "explorer.exe".into(),
            }]))
            .await
            .unwrap();
        assert_eq!(executed.actions[0].status, ActionStatus::Success);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failed_with_code() {
        let mut control = FakeControl::new();
        control.command = Behaviour::Exit(5);
        let executed = executor(control)
            .run(plan_of(vec![ActionKind::SetPowerPlan {
                plan: "High performance".into(),
            }]))
            .await
            .unwrap();
        assert_eq!(executed.actions[0].status, ActionStatus::Failed);
        assert_eq!(executed.actions[0].result_message, "exit code 5");
    }

    #[tokio::test]
    async fn already_empty_recycle_bin_is_success() {
        let executed = executor(FakeControl::new())
            .run(plan_of(vec![ActionKind::EmptyRecycleBin]))
            .await
            .unwrap();
        assert_eq!(executed.actions[0].status, ActionStatus::Success);
        assert_eq!(executed.actions[0].actual_freed_mb, 0);
        assert_eq!(executed.summary.failure_count, 0);
    }

    #[tokio::test]
    async fn recycle_bin_error_is_failed() {
        let mut control = FakeControl::new();
        control.trash = Err("COM call failed".into());
        let executed = executor(control)
            .run(plan_of(vec![ActionKind::EmptyRecycleBin]))
            .await
            .unwrap();
        assert_eq!(executed.actions[0].status, ActionStatus::Failed);
        assert!(executed.actions[0].result_message.contains("COM call failed"));
    }

    #[tokio::test]
    async fn temp_cleanup_reports_freed_megabytes() {
        let one = TempDir::new().unwrap();
        let two = TempDir::new().unwrap();
        File::create(one.path().join("cache.bin"))
            .unwrap()
            .set_len(300 * BYTES_PER_MB)
            .unwrap();
        File::create(two.path().join("setup.log"))
            .unwrap()
            .set_len(200 * BYTES_PER_MB)
            .unwrap();

        let plan = plan_of(vec![ActionKind::CleanTempFolders {
            folders: vec![one.path().to_path_buf(), two.path().to_path_buf()],
        }]);
        let executed = executor(FakeControl::new()).run(plan).await.unwrap();

        let cleanup = &executed.actions[0];
        assert_eq!(cleanup.status, ActionStatus::Success);
        assert_eq!(cleanup.actual_freed_mb, 500);
        assert_eq!(executed.summary.total_freed_mb, 500);
    }

    #[tokio::test]
    async fn empty_temp_folder_is_no_change() {
        let dir = TempDir::new().unwrap();
        let executed = executor(FakeControl::new())
            .run(plan_of(vec![ActionKind::CleanTempFolders {
                folders: vec![dir.path().to_path_buf()],
            }]))
            .await
            .unwrap();
        assert_eq!(executed.actions[0].status, ActionStatus::NoChange);
        assert_eq!(executed.summary.actions_run, 1);
    }

    #[tokio::test]
    async fn manual_actions_stay_pending_and_are_not_counted() {
        let control = FakeControl::new();
        let plan = plan_of(vec![
            ActionKind::Manual {
                task: ManualTask::UpdateGpuDriver,
            },
            ActionKind::FlushDnsCache,
        ]);
        let exec = executor(control);
        let executed = exec.run(plan).await.unwrap();

        assert_eq!(executed.actions[0].status, ActionStatus::Pending);
        assert_eq!(executed.actions[1].status, ActionStatus::Success);
        assert_eq!(executed.summary.actions_run, 1);
        assert_eq!(executed.summary.manual_count, 1);
        assert_eq!(*exec.control.calls.lock().unwrap(), vec!["dns".to_string()]);
    }

    #[tokio::test]
    async fn every_automatable_action_reaches_a_terminal_status() {
        let dir = TempDir::new().unwrap();
        let plan = plan_of(vec![
            ActionKind::SetPowerPlan {
                plan: "High performance".into(),
            },
            ActionKind::ApplyPerformanceVisuals,
            ActionKind::CleanTempFolders {
                folders: vec![dir.path().to_path_buf()],
            },
            ActionKind::EmptyRecycleBin,
            ActionKind::FlushDnsCache,
        ]);
        let executed = executor(FakeControl::new()).run(plan).await.unwrap();

        assert!(executed.actions.iter().all(|a| a.status.is_terminal()));
        let s = &executed.summary;
        assert_eq!(s.actions_run, 5);
        assert_eq!(s.success_count + s.partial_count + s.no_change_count + s.failure_count, s.actions_run);
        assert_eq!(
            s.total_freed_mb,
            executed.actions.iter().map(|a| a.actual_freed_mb).sum::<u64>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shell_restart_terminates_then_starts() {
        let mut control = FakeControl::new();
        control.shell_pids = vec![40, 41];
        let exec = executor(control);
        let executed = exec
            .run(plan_of(vec![ActionKind::RestartShell {
                process_name: "explorer.exe".into(),
            }]))
            .await
            .unwrap();

        assert_eq!(executed.actions[0].status, ActionStatus::Success);
        assert_eq!(
            *exec.control.calls.lock().unwrap(),
            vec!["kill 40", "kill 41", "start explorer.exe"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shell_start_is_retried_once() {
        let mut control = FakeControl::new();
        control.start_failures = Mutex::new(1);
        let exec = executor(control);
        let executed = exec
            .run(plan_of(vec![ActionKind::RestartShell {
                process_name: "explorer.exe".into(),
            }]))
            .await
            .unwrap();
        assert_eq!(executed.actions[0].status, ActionStatus::Success);
        assert_eq!(exec.control.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shell_start_failing_twice_is_failed() {
        let mut control = FakeControl::new();
        control.start_failures = Mutex::new(2);
        let executed = executor(control)
            .run(plan_of(vec![ActionKind::RestartShell {
                process_name: "explorer.exe".into(),
            }]))
            .await
            .unwrap();
        assert_eq!(executed.actions[0].status, ActionStatus::Failed);
        assert!(executed.actions[0].result_message.contains("retry failed"));
    }

    #[tokio::test]
    async fn stop_request_skips_remaining_actions() {
        let run_control = RunControl::new();
        let mut control = FakeControl::new();
        control.stop_on_dns = Some(run_control.clone());
        let executed = executor(control)
            .with_run_control(run_control)
            .run(plan_of(vec![
                ActionKind::FlushDnsCache,
                ActionKind::EmptyRecycleBin,
                ActionKind::ApplyPerformanceVisuals,
            ]))
            .await
            .unwrap();

        assert_eq!(executed.actions[0].status, ActionStatus::Success);
        assert_eq!(executed.actions[1].status, ActionStatus::Skipped);
        assert_eq!(executed.actions[2].status, ActionStatus::Skipped);
        assert_eq!(executed.summary.actions_run, 1);
        assert_eq!(executed.summary.skipped_count, 2);
    }

    #[tokio::test]
    async fn plan_with_completed_action_is_rejected() {
        let mut done = action(ActionKind::FlushDnsCache);
        done.status = ActionStatus::Success;
        let plan: Plan = vec![done].into_iter().collect();
        assert!(executor(FakeControl::new()).run(plan).await.is_err());
    }

    #[tokio::test]
    async fn events_follow_action_transitions() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let plan = plan_of(vec![
            ActionKind::Manual {
                task: ManualTask::RepairOffice,
            },
            ActionKind::FlushDnsCache,
        ]);
        executor(FakeControl::new()).with_events(bus).run(plan).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(match event {
                EngineEvent::RunStarted { .. } => "run_started",
                EngineEvent::ActionStarted { .. } => "action_started",
                EngineEvent::ActionFinished { .. } => "action_finished",
                EngineEvent::ActionManual { .. } => "action_manual",
                EngineEvent::RunFinished { .. } => "run_finished",
            });
        }
        assert_eq!(
            names,
            vec!["run_started", "action_manual", "action_started", "action_finished", "run_finished"]
        );
    }

    fn folder(accessible: bool, found: u64, deleted: u64, bytes: u64) -> FolderReport {
        FolderReport {
            path: PathBuf::from("tmp"),
            accessible,
            files_found: found,
            files_deleted: deleted,
            files_failed: found - deleted,
            bytes_freed: bytes,
            ..FolderReport::default()
        }
    }

    #[test]
    fn locked_files_below_ratio_are_still_success() {
        let report = CleanupReport {
            folders: vec![folder(true, 10, 9, 20 * BYTES_PER_MB)],
        };
        let outcome = classify_cleanup(&report, 0.2);
        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(outcome.freed_mb, 20);
    }

    #[test]
    fn many_locked_files_make_partial_success() {
        let report = CleanupReport {
            folders: vec![folder(true, 10, 5, 3 * BYTES_PER_MB + 17)],
        };
        let outcome = classify_cleanup(&report, 0.2);
        assert_eq!(outcome.status, ActionStatus::PartialSuccess);
        assert_eq!(outcome.freed_mb, 3);
    }

    #[test]
    fn inaccessible_folder_makes_partial_success() {
        let report = CleanupReport {
            folders: vec![folder(true, 4, 4, BYTES_PER_MB), folder(false, 0, 0, 0)],
        };
        assert_eq!(classify_cleanup(&report, 0.2).status, ActionStatus::PartialSuccess);
    }

    #[test]
    fn all_files_locked_is_no_change() {
        let report = CleanupReport {
            folders: vec![folder(true, 6, 0, 0)],
        };
        assert_eq!(classify_cleanup(&report, 0.2).status, ActionStatus::NoChange);
    }

    #[test]
    fn only_inaccessible_folders_is_failed() {
        let report = CleanupReport {
            folders: vec![folder(false, 0, 0, 0)],
        };
        assert_eq!(classify_cleanup(&report, 0.2).status, ActionStatus::Failed);
    }
}
