//! The capability that mutates operating-system state.
//!
//! The executor only ever talks to [`SystemControl`]. [`OsControl`] is the
//! live implementation; tests substitute scripted fakes.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, info};

use crate::cleanup;
use crate::command::{run_hidden, CommandOutcome, CommandSpec};
use crate::models::HIGH_PERFORMANCE_PLAN;

/// Exit code the recycle bin helper script uses for "nothing to empty".
pub const TRASH_EMPTY_EXIT_CODE: i32 = 3;

/// Result of a successful recycle bin request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashOutcome {
    Emptied { freed_bytes: u64 },
    AlreadyEmpty,
}

/// Operations the executor performs against the machine.
///
/// Command style operations receive the subprocess timeout and report a
/// [`CommandOutcome`]; they must not outlive it by more than a few seconds.
pub trait SystemControl: Send + Sync {
    fn set_power_plan(&self, plan: &str, timeout: Duration) -> impl Future<Output = CommandOutcome> + Send;

    fn apply_performance_visuals(&self, timeout: Duration) -> impl Future<Output = CommandOutcome> + Send;

    fn flush_dns_cache(&self, timeout: Duration) -> impl Future<Output = CommandOutcome> + Send;

    fn empty_recycle_bin(&self, timeout: Duration) -> impl Future<Output = Result<TrashOutcome, String>> + Send;

    /// Pids of every running process whose name matches, ignoring case.
    fn find_processes(&self, name: &str) -> Vec<u32>;

    fn terminate_process(&self, pid: u32) -> Result<(), String>;

    fn is_running(&self, pid: u32) -> bool;

    /// Starts a detached instance of `name`.
    fn start_process(&self, name: &str) -> Result<(), String>;
}

/// Live control over the local machine.
#[derive(Debug, Clone, Default)]
pub struct OsControl;

impl OsControl {
    pub fn new() -> Self {
        Self
    }
}

/// Well known Windows power scheme GUIDs.
pub fn power_scheme_guid(plan: &str) -> Option<&'static str> {
    match plan.to_ascii_lowercase().as_str() {
        "high performance" => Some("8c5e7fda-e8bf-4a96-9a85-a6e23a8c635c"),
        "balanced" => Some("381b4222-f694-41f0-9685-ff5bb260df2e"),
        "power saver" => Some("a1841308-3d13-4d3f-8da8-2c0e1c4ef5e0"),
        "ultimate performance" => Some("e9a42b02-d5df-448d-aa00-03f14749eb61"),
        _ => None,
    }
}

fn power_plan_command(plan: &str) -> Result<CommandSpec, String> {
    if cfg!(windows) {
        let guid = power_scheme_guid(plan).ok_or_else(|| format!("Unknown power plan '{}'", plan))?;
        Ok(CommandSpec::new("powercfg", ["/setactive", guid]))
    } else if cfg!(target_os = "linux") {
        let profile = if plan.eq_ignore_ascii_case(HIGH_PERFORMANCE_PLAN) {
            "performance"
        } else if plan.eq_ignore_ascii_case("power saver") {
            "power-saver"
        } else {
            "balanced"
        };
        Ok(CommandSpec::new("powerprofilesctl", ["set", profile]))
    } else {
        Err("Power plans cannot be changed on this platform".to_string())
    }
}

fn dns_flush_command() -> Result<CommandSpec, String> {
    if cfg!(windows) {
        Ok(CommandSpec::new("ipconfig", ["/flushdns"]))
    } else if cfg!(target_os = "macos") {
        Ok(CommandSpec::new("dscacheutil", ["-flushcache"]))
    } else if cfg!(target_os = "linux") {
        Ok(CommandSpec::new("resolvectl", ["flush-caches"]))
    } else {
        Err("DNS cache flush is not supported on this platform".to_string())
    }
}

fn visual_effects_command() -> Result<CommandSpec, String> {
    if cfg!(windows) {
        Ok(CommandSpec::new(
            "reg",
            [
                "add",
                r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\VisualEffects",
                "/v",
                "VisualFXSetting",
                "/t",
                "REG_DWORD",
                "/d",
                "2",
                "/f",
            ],
        ))
    } else {
        Err("Visual effect presets are only available on Windows".to_string())
    }
}

async fn run_or_unsupported(spec: Result<CommandSpec, String>, timeout: Duration) -> CommandOutcome {
    match spec {
        Ok(spec) => run_hidden(&spec, timeout).await,
        Err(reason) => CommandOutcome::Unsupported(reason),
    }
}

/// Sums the bin, clears it, and prints the byte count. Exits with
/// [`TRASH_EMPTY_EXIT_CODE`] when there was nothing to clear.
const RECYCLE_BIN_SCRIPT: &str = "$bin = (New-Object -ComObject Shell.Application).NameSpace(10); \
$items = @($bin.Items()); \
if ($items.Count -eq 0) { exit 3 }; \
$size = ($items | Measure-Object -Property Size -Sum).Sum; \
Clear-RecycleBin -Force -ErrorAction Stop; \
Write-Output $size";

async fn empty_windows_bin(timeout: Duration) -> Result<TrashOutcome, String> {
    let spec = CommandSpec::new(
        "powershell",
        ["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command", RECYCLE_BIN_SCRIPT],
    );
    match run_hidden(&spec, timeout).await {
        CommandOutcome::Exited { code: 0, stdout, .. } => Ok(TrashOutcome::Emptied {
            freed_bytes: stdout.lines().last().and_then(|l| l.trim().parse().ok()).unwrap_or(0),
        }),
        CommandOutcome::Exited { code: TRASH_EMPTY_EXIT_CODE, .. } => Ok(TrashOutcome::AlreadyEmpty),
        CommandOutcome::Exited { code, stderr, .. } if stderr.is_empty() => Err(format!("exit code {}", code)),
        CommandOutcome::Exited { code, stderr, .. } => Err(format!("exit code {}: {}", code, stderr)),
        CommandOutcome::TimedOut { after, .. } => Err(format!("timed out after {}s", after.as_secs())),
        CommandOutcome::SpawnFailed(e) | CommandOutcome::Unsupported(e) => Err(e),
    }
}

/// Freedesktop and macOS trash locations for the current user.
fn trash_dirs() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    if cfg!(target_os = "macos") {
        return home.map(|h| vec![h.join(".Trash")]).unwrap_or_default();
    }
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| home.map(|h| h.join(".local").join("share")));
    match data_home {
        Some(d) => vec![d.join("Trash").join("files"), d.join("Trash").join("info")],
        None => Vec::new(),
    }
}

/// Empties the given trash folders. Missing folders count as empty.
pub(crate) fn empty_trash_dirs(dirs: &[PathBuf]) -> Result<TrashOutcome, String> {
    let existing: Vec<PathBuf> = dirs.iter().filter(|d| d.is_dir()).cloned().collect();
    let item_count: u64 = existing.iter().map(|d| cleanup::measure(d).1).sum();
    if item_count == 0 {
        return Ok(TrashOutcome::AlreadyEmpty);
    }
    let report = cleanup::clean_folders(&existing);
    if report.files_deleted() == 0 {
        return Err(format!("{} item(s) in the trash could not be removed", report.files_failed()));
    }
    Ok(TrashOutcome::Emptied {
        freed_bytes: report.bytes_freed(),
    })
}

fn refreshed_processes() -> System {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    sys
}

fn matches_name(process_name: &str, wanted: &str) -> bool {
    let strip = |n: &str| n.strip_suffix(".exe").map(str::to_string).unwrap_or_else(|| n.to_string());
    strip(&process_name.to_ascii_lowercase()) == strip(&wanted.to_ascii_lowercase())
}

impl SystemControl for OsControl {
    async fn set_power_plan(&self, plan: &str, timeout: Duration) -> CommandOutcome {
        info!(plan, "activating power plan");
        run_or_unsupported(power_plan_command(plan), timeout).await
    }

    async fn apply_performance_visuals(&self, timeout: Duration) -> CommandOutcome {
        run_or_unsupported(visual_effects_command(), timeout).await
    }

    async fn flush_dns_cache(&self, timeout: Duration) -> CommandOutcome {
        run_or_unsupported(dns_flush_command(), timeout).await
    }

    async fn empty_recycle_bin(&self, timeout: Duration) -> Result<TrashOutcome, String> {
        if cfg!(windows) {
            empty_windows_bin(timeout).await
        } else {
            let dirs = trash_dirs();
            tokio::task::spawn_blocking(move || empty_trash_dirs(&dirs))
                .await
                .map_err(|e| format!("trash cleanup task failed: {}", e))?
        }
    }

    fn find_processes(&self, name: &str) -> Vec<u32> {
        let sys = refreshed_processes();
        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, p)| matches_name(&p.name().to_string_lossy(), name))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        debug!(name, count = pids.len(), "process lookup");
        pids
    }

    fn terminate_process(&self, pid: u32) -> Result<(), String> {
        let sys = refreshed_processes();
        match sys.process(Pid::from_u32(pid)) {
            Some(process) if process.kill() => Ok(()),
            Some(_) => Err(format!("could not signal process {}", pid)),
            None => Err(format!("process {} is not running", pid)),
        }
    }

    fn is_running(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }

    fn start_process(&self, name: &str) -> Result<(), String> {
        // `cmd /c start "" <name>` detaches the new instance from this process
        let mut cmd = if cfg!(windows) {
            let mut cmd = std::process::Command::new("cmd");
            cmd.args(["/c", "start", "", name]);
            cmd
        } else {
            std::process::Command::new(name)
        };
        spawn_detached(cmd)
            .map(|pid| debug!(name, pid, "started process"))
            .map_err(|e| format!("Failed to start '{}': {}", name, e))
    }
}

/// Spawns `cmd` without tying it to our stdio and reaps it on a background
/// thread once it exits.
fn spawn_detached(mut cmd: std::process::Command) -> std::io::Result<u32> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = child.id();
    std::thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || {
            if let Err(e) = child.wait() {
                debug!(pid, error = %e, "could not reap detached process");
            }
        })?;
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn known_plans_have_guids() {
        assert_eq!(
            power_scheme_guid("High performance"),
            Some("8c5e7fda-e8bf-4a96-9a85-a6e23a8c635c")
        );
        assert_eq!(power_scheme_guid("BALANCED"), Some("381b4222-f694-41f0-9685-ff5bb260df2e"));
        assert_eq!(power_scheme_guid("Turbo"), None);
    }

    #[test]
    fn process_names_match_with_or_without_extension() {
        assert!(matches_name("Explorer.EXE", "explorer.exe"));
        assert!(matches_name("explorer", "explorer.exe"));
        assert!(!matches_name("explorer2.exe", "explorer.exe"));
    }

    #[test]
    fn empty_trash_is_reported_as_already_empty() {
        let dir = TempDir::new().unwrap();
        let files = dir.path().join("files");
        fs::create_dir(&files).unwrap();
        let dirs = vec![files, dir.path().join("info")];
        assert_eq!(empty_trash_dirs(&dirs), Ok(TrashOutcome::AlreadyEmpty));
    }

    #[test]
    fn trash_contents_are_removed() {
        let dir = TempDir::new().unwrap();
        let files = dir.path().join("files");
        let info = dir.path().join("info");
        fs::create_dir(&files).unwrap();
        fs::create_dir(&info).unwrap();
        fs::write(files.join("old.txt"), vec![0u8; 4096]).unwrap();
        fs::write(info.join("old.txt.trashinfo"), b"[Trash Info]\n").unwrap();

        match empty_trash_dirs(&[files.clone(), info]) {
            Ok(TrashOutcome::Emptied { freed_bytes }) => assert_eq!(freed_bytes, 4096 + 13),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fs::read_dir(&files).unwrap().count(), 0);
    }

    #[test]
    fn current_process_is_running() {
        assert!(OsControl::new().is_running(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn detached_process_is_reaped_after_exit() {
        let pid = spawn_detached(std::process::Command::new("true")).unwrap();
        let control = OsControl::new();
        let mut gone = false;
        for _ in 0..50 {
            let sys = refreshed_processes();
            if sys.process(Pid::from_u32(pid)).is_none() {
                gone = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(gone, "pid {} was left behind as a zombie", pid);
        assert!(!control.is_running(pid));
    }
}
