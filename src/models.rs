//! # Models Module
//!
//! This module defines the snapshot data structures consumed by the engine.
//! A [`Snapshot`] is the frozen set of facts a scanner measured about one
//! machine at one point in time. Every category is its own sub-record, and
//! hardware or software that is not installed is represented explicitly with
//! [`Detected::Absent`] rather than a missing value.
//!
//! ## Key Features
//!
//! - **System Identity**: hostname, OS and uptime
//! - **Hardware State**: CPU, memory, disk volumes, GPU and battery
//! - **Software State**: startup entries, installed programs, Office, antivirus
//! - **Stability History**: crash and BSOD counts over the last 30 days
//! - **Cleanup Targets**: temp folders, recycle bin and upgrade leftovers
//!
//! All structures implement `Debug`, `Clone`, `Serialize`, and `Deserialize`
//! so that scanner output can be loaded from JSON and reports can embed them.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Bytes in one megabyte as used for every MB figure in the engine.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Converts a byte count to whole megabytes, rounding down.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / BYTES_PER_MB
}

/// Presence marker for a measured component.
///
/// A scanner that finds no battery, no GPU or no temperature sensor reports
/// `Absent`; the evaluator then skips that category entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "info", rename_all = "snake_case")]
pub enum Detected<T> {
    Present(T),
    Absent,
}

impl<T> Detected<T> {
    pub fn as_present(&self) -> Option<&T> {
        match self {
            Detected::Present(value) => Some(value),
            Detected::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Detected::Present(_))
    }
}

impl<T> Default for Detected<T> {
    fn default() -> Self {
        Detected::Absent
    }
}

/// Result of a latency-style probe (ping, DNS resolution).
///
/// Scanners report these as text: `"23 ms"`, `"Failed"`, `"Timed out"` or
/// `"Unknown"`. Anything other than a measured value means the probe itself
/// did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeResult {
    Ok { ms: u32 },
    Failed,
    TimedOut,
    Unknown,
}

impl ProbeResult {
    pub fn millis(&self) -> Option<u32> {
        match self {
            ProbeResult::Ok { ms } => Some(*ms),
            _ => None,
        }
    }
}

impl FromStr for ProbeResult {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim();
        let lower = text.to_ascii_lowercase();
        match lower.as_str() {
            "failed" => return Ok(ProbeResult::Failed),
            "timed out" | "timedout" | "timeout" => return Ok(ProbeResult::TimedOut),
            "unknown" | "" => return Ok(ProbeResult::Unknown),
            _ => {}
        }
        let digits = lower.trim_end_matches("ms").trim();
        digits
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| ProbeResult::Ok { ms: v.round() as u32 })
            .ok_or_else(|| EngineError::InvalidSnapshot(format!("unrecognised probe value '{}'", text)))
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Ok { ms } => write!(f, "{} ms", ms),
            ProbeResult::Failed => write!(f, "Failed"),
            ProbeResult::TimedOut => write!(f, "Timed out"),
            ProbeResult::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Complete set of measured facts about one machine at one time.
///
/// A snapshot is never mutated after the scanner hands it over; everything
/// the engine derives (issues, score, plan, deltas) lives in new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the scanner finished collecting
    pub captured_at: DateTime<Utc>,
    /// Machine and operating system identity
    pub system: SystemIdentity,
    /// Processor load and temperature
    pub cpu: CpuInfo,
    /// Physical memory usage
    pub memory: MemoryInfo,
    /// Mounted volumes
    pub disks: Vec<DiskInfo>,
    /// Primary graphics adapter
    pub gpu: Detected<GpuInfo>,
    /// Battery (laptops only)
    pub battery: Detected<BatteryInfo>,
    /// Programs registered to launch at logon
    pub startup: Vec<StartupEntry>,
    /// Primary network adapter and connectivity probes
    pub network: Detected<NetworkInfo>,
    /// Installed software inventory
    pub software: SoftwareInfo,
    /// Antivirus and firewall state
    pub security: SecurityInfo,
    /// Event log history for the last 30 days
    pub events: EventLogSummary,
    /// Power plan and visual effect configuration
    pub performance: PerformanceSettings,
    /// Reclaimable storage locations
    pub cleanup: CleanupTargets,
    /// Desktop shell process state
    pub shell: ShellInfo,
}

impl Snapshot {
    /// Checks the snapshot against the data contract.
    ///
    /// A scanner must default rather than omit a measurement, so a snapshot
    /// that fails here is a programming error on the producer side.
    pub fn validate(&self) -> Result<(), EngineError> {
        fn percent(name: &str, value: f64) -> Result<(), EngineError> {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "{} must be within 0..=100, got {}",
                    name, value
                )));
            }
            Ok(())
        }

        percent("cpu.load_percent", self.cpu.load_percent)?;
        percent("cpu.sustained_load_percent", self.cpu.sustained_load_percent)?;
        if self.memory.used_mb > self.memory.total_mb {
            return Err(EngineError::InvalidSnapshot(format!(
                "memory.used_mb ({}) exceeds memory.total_mb ({})",
                self.memory.used_mb, self.memory.total_mb
            )));
        }
        for disk in &self.disks {
            if disk.free_bytes > disk.total_bytes {
                return Err(EngineError::InvalidSnapshot(format!(
                    "disk {} reports more free space than capacity",
                    disk.mount_point
                )));
            }
        }
        if let Detected::Present(battery) = &self.battery {
            percent("battery.charge_percent", battery.charge_percent)?;
            percent("battery.health_percent", battery.health_percent)?;
        }
        Ok(())
    }

    /// The volume the operating system lives on, falling back to the first volume.
    pub fn system_disk(&self) -> Option<&DiskInfo> {
        self.disks
            .iter()
            .find(|d| d.is_system)
            .or_else(|| self.disks.first())
    }
}

/// Machine and operating system identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemIdentity {
    /// Network hostname of the system
    pub hostname: String,
    /// Operating system name (e.g., "Windows 11 Pro")
    pub os_name: String,
    /// Operating system build/version string
    pub os_version: String,
    /// System manufacturer
    pub manufacturer: String,
    /// System model
    pub model: String,
    /// Seconds since the last boot
    pub uptime_seconds: u64,
}

/// Processor load as sampled by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    /// CPU brand/model name
    pub brand: String,
    /// Total number of logical CPU cores
    pub logical_cores: u32,
    /// Instantaneous load percentage (0.0 to 100.0)
    pub load_percent: f64,
    /// Load averaged over the scanner's sampling window (0.0 to 100.0)
    pub sustained_load_percent: f64,
    /// Package temperature in Celsius, when a sensor is exposed
    pub temperature_c: Detected<f32>,
}

/// Physical memory usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total physical memory in megabytes
    pub total_mb: u64,
    /// Memory in use in megabytes
    pub used_mb: u64,
}

impl MemoryInfo {
    pub fn used_percent(&self) -> f64 {
        if self.total_mb == 0 {
            return 0.0;
        }
        self.used_mb as f64 / self.total_mb as f64 * 100.0
    }
}

/// A mounted volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Mount point or drive letter (e.g., "C:\\")
    pub mount_point: String,
    /// Volume label
    #[serde(default)]
    pub label: String,
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Free space in bytes
    pub free_bytes: u64,
    /// Whether the operating system is installed on this volume
    #[serde(default)]
    pub is_system: bool,
}

impl DiskInfo {
    pub fn free_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Graphics adapter and driver information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    /// GPU model name (e.g., "NVIDIA GeForce RTX 3080")
    pub name: String,
    /// Installed driver version
    pub driver_version: String,
    /// Release date of the installed driver, if the scanner could read it
    pub driver_date: Option<NaiveDate>,
    /// Core temperature in Celsius, when a sensor is exposed
    pub temperature_c: Detected<f32>,
}

/// Battery condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    /// Current charge percentage (0.0 to 100.0)
    pub charge_percent: f64,
    /// Full-charge capacity as a percentage of design capacity
    pub health_percent: f64,
    /// Number of charge/discharge cycles
    pub cycle_count: Option<u32>,
}

/// A program registered to launch at logon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupEntry {
    pub name: String,
    pub command: String,
    /// Registry key or folder the entry was found in
    pub location: String,
    pub enabled: bool,
}

/// Network adapter and connectivity probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Adapter description
    pub adapter: String,
    /// Whether the adapter reports an active connection
    pub connected: bool,
    /// Round-trip latency to a well-known host
    pub latency: ProbeResult,
    /// Time to resolve a well-known name
    pub dns: ProbeResult,
}

/// Installed software inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SoftwareInfo {
    #[serde(default)]
    pub installed: Vec<InstalledProgram>,
    #[serde(default)]
    pub office: Detected<OfficeInfo>,
}

/// An entry from the uninstall registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledProgram {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub install_date: Option<NaiveDate>,
}

/// Microsoft Office installation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficeInfo {
    pub version: String,
    /// Whether the scanner found signs of a broken installation
    pub needs_repair: bool,
}

/// Antivirus and firewall state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub antivirus: Detected<AntivirusInfo>,
    pub firewall_enabled: bool,
}

/// Registered antivirus product state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntivirusInfo {
    pub product: String,
    pub enabled: bool,
    pub realtime_protection: bool,
    pub definitions_up_to_date: bool,
    /// A scan was running while the snapshot was taken
    pub scan_in_progress: bool,
}

/// Event log counts over the last 30 days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventLogSummary {
    pub bsod_count_30d: u32,
    pub app_crash_count_30d: u32,
    pub unexpected_shutdowns_30d: u32,
}

/// Visual effects mode as configured in the performance options dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualEffects {
    LetSystemChoose,
    BestAppearance,
    BestPerformance,
    Custom,
    Unknown,
}

/// Power and visual configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSettings {
    /// Active power plan name (e.g., "Balanced", "High performance")
    pub power_plan: String,
    pub visual_effects: VisualEffects,
}

/// Name of the power plan the engine switches to.
pub const HIGH_PERFORMANCE_PLAN: &str = "High performance";

impl PerformanceSettings {
    pub fn is_high_performance(&self) -> bool {
        self.power_plan.trim().eq_ignore_ascii_case(HIGH_PERFORMANCE_PLAN)
    }
}

/// A temp directory and its measured size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempFolder {
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(default)]
    pub file_count: u64,
}

/// Leftover data from a previous OS upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leftover {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Storage the engine can reclaim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupTargets {
    pub temp_folders: Vec<TempFolder>,
    pub recycle_bin_bytes: u64,
    #[serde(default)]
    pub recycle_bin_items: u64,
    /// Previous installation folder kept after a feature upgrade
    pub windows_old: Detected<Leftover>,
    /// Setup and upgrade log folders
    pub upgrade_logs: Detected<Leftover>,
}

impl CleanupTargets {
    pub fn temp_bytes(&self) -> u64 {
        self.temp_folders.iter().map(|f| f.size_bytes).sum()
    }
}

/// Desktop shell process state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellInfo {
    /// Executable name of the shell (e.g., "explorer.exe")
    pub process_name: String,
    pub instance_count: u32,
    /// Combined working set of all instances in megabytes
    pub working_set_mb: u64,
    /// Hours since the oldest instance started
    pub uptime_hours: u64,
}

/// Severity of a diagnostic finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

/// One diagnostic finding produced by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedIssue {
    pub severity: Severity,
    pub category: String,
    pub description: String,
    pub recommendation: String,
}

impl FlaggedIssue {
    pub fn new(
        severity: Severity,
        category: &str,
        description: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.to_string(),
            description: description.into(),
            recommendation: recommendation.into(),
        }
    }
}

/// Sorts issues for display: most severe first, then by category.
///
/// The sort is stable, so issues of equal rank keep rule order.
pub fn sort_for_display(issues: &mut [FlaggedIssue]) {
    issues.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.category.cmp(&b.category))
    });
}

/// Overall machine condition on a 0 to 100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub struct HealthScore(u8);

impl HealthScore {
    pub const MAX: HealthScore = HealthScore(100);

    /// Clamps a raw running total into the valid range.
    pub fn from_raw(raw: i64) -> Self {
        HealthScore(raw.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn grade(self) -> &'static str {
        match self.0 {
            90..=100 => "Excellent",
            75..=89 => "Good",
            50..=74 => "Fair",
            _ => "Poor",
        }
    }
}

impl TryFrom<u8> for HealthScore {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > 100 {
            return Err(format!("health score {} is outside 0..=100", value));
        }
        Ok(HealthScore(value))
    }
}

impl From<HealthScore> for u8 {
    fn from(score: HealthScore) -> u8 {
        score.0
    }
}

impl fmt::Display for HealthScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
