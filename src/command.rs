//! Hidden subprocess execution with a hard timeout.
//!
//! Commands run without a console window, with stdout/stderr captured. If the
//! wait exceeds the timeout, the whole process tree is killed: descendants
//! found in the process table first, then the child itself.

use std::process::Stdio;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How long to keep draining output after the process exited. Grandchildren
/// that inherited the pipes can hold them open indefinitely.
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// What happened to a subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The process exited on its own
    Exited {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The wait hit the timeout and the tree was killed
    TimedOut {
        after: Duration,
        tree_terminated: bool,
    },
    /// The process could not be started or waited on
    SpawnFailed(String),
    /// The operation has no implementation on this platform
    Unsupported(String),
}

impl CommandOutcome {
    pub fn success() -> Self {
        CommandOutcome::Exited {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Exited { code: 0, .. })
    }
}

/// Runs `spec` without a visible window and waits up to `timeout`.
pub async fn run_hidden(spec: &CommandSpec, timeout: Duration) -> CommandOutcome {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandOutcome::SpawnFailed(format!("failed to start '{}': {}", spec.program, e))
        }
    };
    debug!(command = %spec.display(), pid = ?child.id(), "spawned subprocess");

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => CommandOutcome::Exited {
            code: status.code().unwrap_or(-1),
            stdout: collect(stdout).await,
            stderr: collect(stderr).await,
        },
        Ok(Err(e)) => CommandOutcome::SpawnFailed(format!("failed to wait for '{}': {}", spec.program, e)),
        Err(_) => {
            warn!(command = %spec.display(), timeout_secs = timeout.as_secs_f64(), "subprocess timed out, killing process tree");
            let tree_terminated = kill_tree(&mut child).await;
            for reader in [stdout, stderr].into_iter().flatten() {
                reader.abort();
            }
            CommandOutcome::TimedOut {
                after: timeout,
                tree_terminated,
            }
        }
    }
}

fn drain<R>(mut pipe: R) -> JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).trim().to_string()
    })
}

async fn collect(reader: Option<JoinHandle<String>>) -> String {
    let Some(handle) = reader else {
        return String::new();
    };
    match tokio::time::timeout(OUTPUT_DRAIN, handle).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}

/// Kills every descendant of `child`, then `child` itself.
async fn kill_tree(child: &mut Child) -> bool {
    let mut all_gone = true;
    if let Some(root) = child.id() {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        for pid in descendants(&sys, Pid::from_u32(root)).into_iter().rev() {
            if let Some(process) = sys.process(pid) {
                if !process.kill() {
                    debug!(pid = pid.as_u32(), "could not signal descendant");
                    all_gone = false;
                }
            }
        }
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill timed out subprocess");
        all_gone = false;
    }
    all_gone
}

/// Collects the descendants of `root` breadth first.
pub(crate) fn descendants(sys: &System, root: Pid) -> Vec<Pid> {
    let mut found: Vec<Pid> = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) && *pid != root && !found.contains(pid) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    found
}
