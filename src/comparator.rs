//! Before/after comparison of two snapshots of the same machine.

use serde::{Deserialize, Serialize};

use crate::models::Snapshot;

/// Improvement metrics. Positive values mean the machine got better.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotDelta {
    /// Drop in sustained CPU load, percentage points
    pub cpu_delta: f64,
    /// Drop in used RAM. Negative when usage grew.
    pub ram_freed_mb: i64,
    /// Gain in free space on the system volume, percentage points
    pub disk_freed_percent: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn system_free_percent(snapshot: &Snapshot) -> f64 {
    snapshot.system_disk().map(|d| d.free_percent()).unwrap_or(0.0)
}

pub fn compare(before: &Snapshot, after: &Snapshot) -> SnapshotDelta {
    SnapshotDelta {
        cpu_delta: round1(before.cpu.sustained_load_percent - after.cpu.sustained_load_percent),
        ram_freed_mb: before.memory.used_mb as i64 - after.memory.used_mb as i64,
        disk_freed_percent: round1(system_free_percent(after) - system_free_percent(before)),
    }
}
