use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::actions::{ActionStatus, OptimizationSummary, Risk};

const DEFAULT_CAPACITY: usize = 256;

/// Progress notifications emitted while a plan runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        run_id: Uuid,
        total: usize,
        automatable: usize,
    },
    ActionStarted {
        run_id: Uuid,
        id: usize,
        title: String,
    },
    ActionFinished {
        run_id: Uuid,
        id: usize,
        title: String,
        status: ActionStatus,
        freed_mb: u64,
        message: String,
    },
    ActionManual {
        run_id: Uuid,
        id: usize,
        title: String,
        risk: Risk,
    },
    RunFinished {
        run_id: Uuid,
        summary: OptimizationSummary,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            EngineEvent::RunStarted { run_id, .. }
            | EngineEvent::ActionStarted { run_id, .. }
            | EngineEvent::ActionFinished { run_id, .. }
            | EngineEvent::ActionManual { run_id, .. }
            | EngineEvent::RunFinished { run_id, .. } => *run_id,
        }
    }

    /// One line summary for console output.
    pub fn describe(&self) -> String {
        match self {
            EngineEvent::RunStarted { total, automatable, .. } => {
                format!("Starting run: {} action(s), {} automatic", total, automatable)
            }
            EngineEvent::ActionStarted { id, title, .. } => format!("[{}] {} ...", id, title),
            EngineEvent::ActionFinished {
                id,
                title,
                status,
                freed_mb,
                message,
                ..
            } => {
                if *freed_mb > 0 {
                    format!("[{}] {}: {} ({} MB freed) {}", id, title, status, freed_mb, message)
                } else {
                    format!("[{}] {}: {} {}", id, title, status, message)
                }
            }
            EngineEvent::ActionManual { id, title, risk, .. } => {
                format!("[{}] {}: manual follow-up ({})", id, title, risk)
            }
            EngineEvent::RunFinished { summary, .. } => format!(
                "Run finished: {} run, {} failed, {} MB freed in {} ms",
                summary.actions_run, summary.failure_count, summary.total_freed_mb, summary.duration_ms
            ),
        }
    }
}

/// Fan-out channel for [`EngineEvent`]s. Every subscriber sees every event
/// sent after it subscribed; sending with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
