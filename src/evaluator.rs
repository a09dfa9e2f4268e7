//! Health evaluation.
//!
//! Turns a [`Snapshot`] into flagged issues and a single health score. Each
//! category applies a fixed set of threshold rules; every rule that fires
//! emits one issue and subtracts a fixed penalty. Categories never interact,
//! and the score is clamped to 0..=100 once, after all rules ran.

use serde::{Deserialize, Serialize};

use crate::models::{
    bytes_to_mb, Detected, FlaggedIssue, HealthScore, ProbeResult, Severity, Snapshot,
    sort_for_display,
};

pub mod category {
    pub const MEMORY: &str = "Memory";
    pub const CPU: &str = "CPU";
    pub const STORAGE: &str = "Storage";
    pub const GPU: &str = "GPU";
    pub const BATTERY: &str = "Battery";
    pub const STARTUP: &str = "Startup";
    pub const SECURITY: &str = "Security";
    pub const STABILITY: &str = "Stability";
    pub const NETWORK: &str = "Network";
    pub const CLEANUP: &str = "Cleanup";
    pub const SOFTWARE: &str = "Software";
    pub const POWER: &str = "Power";
    pub const SYSTEM: &str = "System";
}

/// Fixed score penalties, one per rule.
pub mod penalty {
    pub const RAM_CRITICAL: i64 = 20;
    pub const RAM_WARNING: i64 = 10;
    pub const CPU_LOAD_CRITICAL: i64 = 15;
    pub const CPU_LOAD_WARNING: i64 = 8;
    pub const CPU_TEMP_CRITICAL: i64 = 10;
    pub const CPU_TEMP_WARNING: i64 = 5;
    pub const DISK_CRITICAL: i64 = 15;
    pub const DISK_WARNING: i64 = 7;
    pub const GPU_DRIVER_OLD: i64 = 5;
    pub const GPU_TEMP: i64 = 5;
    pub const BATTERY_CRITICAL: i64 = 10;
    pub const BATTERY_WARNING: i64 = 5;
    pub const STARTUP_WARNING: i64 = 8;
    pub const STARTUP_INFO: i64 = 3;
    pub const ANTIVIRUS_MISSING: i64 = 20;
    pub const ANTIVIRUS_SCANNING: i64 = 5;
    pub const DEFINITIONS_OLD: i64 = 5;
    pub const FIREWALL_OFF: i64 = 10;
    pub const BSOD_CRITICAL: i64 = 20;
    pub const BSOD_WARNING: i64 = 10;
    pub const APP_CRASHES: i64 = 5;
    pub const UNEXPECTED_SHUTDOWN: i64 = 5;
    pub const PROBE_POOR: i64 = 5;
    pub const PROBE_FAIR: i64 = 2;
    pub const DISCONNECTED: i64 = 5;
    pub const TEMP_FILES: i64 = 5;
    pub const WINDOWS_OLD: i64 = 2;
    pub const OFFICE_REPAIR: i64 = 5;
    pub const POWER_PLAN: i64 = 2;
    pub const LONG_UPTIME: i64 = 2;
}

/// Threshold values for the evaluation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub ram_critical_percent: f64,
    pub ram_warning_percent: f64,
    pub cpu_critical_percent: f64,
    pub cpu_warning_percent: f64,
    pub cpu_temp_critical_c: f32,
    pub cpu_temp_warning_c: f32,
    pub disk_free_critical_percent: f64,
    pub disk_free_warning_percent: f64,
    pub gpu_driver_max_age_days: i64,
    pub gpu_temp_warning_c: f32,
    pub battery_health_critical_percent: f64,
    pub battery_health_warning_percent: f64,
    pub startup_warning_count: usize,
    pub startup_info_count: usize,
    pub bsod_critical_count: u32,
    pub app_crash_warning_count: u32,
    pub latency_fair_ms: u32,
    pub latency_poor_ms: u32,
    pub dns_fair_ms: u32,
    pub dns_poor_ms: u32,
    pub temp_files_warning_mb: u64,
    pub uptime_info_days: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ram_critical_percent: 95.0,
            ram_warning_percent: 85.0,
            cpu_critical_percent: 90.0,
            cpu_warning_percent: 75.0,
            cpu_temp_critical_c: 90.0,
            cpu_temp_warning_c: 80.0,
            disk_free_critical_percent: 5.0,
            disk_free_warning_percent: 15.0,
            gpu_driver_max_age_days: 365,
            gpu_temp_warning_c: 85.0,
            battery_health_critical_percent: 50.0,
            battery_health_warning_percent: 70.0,
            startup_warning_count: 20,
            startup_info_count: 10,
            bsod_critical_count: 3,
            app_crash_warning_count: 10,
            latency_fair_ms: 50,
            latency_poor_ms: 150,
            dns_fair_ms: 50,
            dns_poor_ms: 200,
            temp_files_warning_mb: 1024,
            uptime_info_days: 14,
        }
    }
}

/// Outcome of the three-tier probe classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Good,
    Fair,
    Poor,
}

/// Buckets a probe into Good (< fair), Fair (fair..=poor) or Poor (> poor).
///
/// A probe that failed, timed out or was never measured is Poor.
pub fn classify_probe(probe: ProbeResult, fair_ms: u32, poor_ms: u32) -> Quality {
    match probe {
        ProbeResult::Ok { ms } if ms < fair_ms => Quality::Good,
        ProbeResult::Ok { ms } if ms <= poor_ms => Quality::Fair,
        _ => Quality::Poor,
    }
}

/// Issues and score derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Issues in display order
    pub issues: Vec<FlaggedIssue>,
    pub score: HealthScore,
}

impl Evaluation {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_issue_in(&self, category: &str) -> bool {
        self.issues.iter().any(|i| i.category == category)
    }
}

/// Evaluates a snapshot with the default thresholds.
pub fn evaluate(snapshot: &Snapshot) -> Evaluation {
    evaluate_with(snapshot, &Thresholds::default())
}

/// Evaluates a snapshot with custom thresholds.
pub fn evaluate_with(snapshot: &Snapshot, thresholds: &Thresholds) -> Evaluation {
    let mut card = Scorecard::default();

    memory_rules(snapshot, thresholds, &mut card);
    cpu_rules(snapshot, thresholds, &mut card);
    storage_rules(snapshot, thresholds, &mut card);
    gpu_rules(snapshot, thresholds, &mut card);
    battery_rules(snapshot, thresholds, &mut card);
    startup_rules(snapshot, thresholds, &mut card);
    security_rules(snapshot, &mut card);
    stability_rules(snapshot, thresholds, &mut card);
    network_rules(snapshot, thresholds, &mut card);
    cleanup_rules(snapshot, thresholds, &mut card);
    software_rules(snapshot, &mut card);
    power_rules(snapshot, &mut card);
    system_rules(snapshot, thresholds, &mut card);

    let mut issues = card.issues;
    sort_for_display(&mut issues);
    Evaluation {
        issues,
        score: HealthScore::from_raw(100 - card.penalty),
    }
}

/// Recommendation attached to the outdated GPU driver issue.
pub const GPU_DRIVER_ADVICE: &str = "Install the latest driver from the GPU vendor.";

/// Whether the GPU driver is older than the allowed age at capture time.
pub fn gpu_driver_outdated(snapshot: &Snapshot, thresholds: &Thresholds) -> bool {
    let Detected::Present(gpu) = &snapshot.gpu else {
        return false;
    };
    let Some(date) = gpu.driver_date else {
        return false;
    };
    let age_days = (snapshot.captured_at.date_naive() - date).num_days();
    age_days > thresholds.gpu_driver_max_age_days
}

#[derive(Default)]
struct Scorecard {
    issues: Vec<FlaggedIssue>,
    penalty: i64,
}

impl Scorecard {
    fn flag(
        &mut self,
        severity: Severity,
        category: &str,
        penalty: i64,
        description: String,
        recommendation: &str,
    ) {
        self.penalty += penalty;
        self.issues
            .push(FlaggedIssue::new(severity, category, description, recommendation));
    }
}

fn memory_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let used = s.memory.used_percent();
    if used > t.ram_critical_percent {
        card.flag(
            Severity::Critical,
            category::MEMORY,
            penalty::RAM_CRITICAL,
            format!("Memory usage is critically high ({:.0}% of {} MB)", used, s.memory.total_mb),
            "Close unused applications or add more RAM.",
        );
    } else if used >= t.ram_warning_percent {
        card.flag(
            Severity::Warning,
            category::MEMORY,
            penalty::RAM_WARNING,
            format!("Memory usage is high ({:.0}% of {} MB)", used, s.memory.total_mb),
            "Review memory-heavy programs and startup items.",
        );
    }
}

fn cpu_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let load = s.cpu.sustained_load_percent;
    if load > t.cpu_critical_percent {
        card.flag(
            Severity::Critical,
            category::CPU,
            penalty::CPU_LOAD_CRITICAL,
            format!("Sustained CPU load is {:.0}%", load),
            "Identify the processes keeping the CPU busy.",
        );
    } else if load > t.cpu_warning_percent {
        card.flag(
            Severity::Warning,
            category::CPU,
            penalty::CPU_LOAD_WARNING,
            format!("Sustained CPU load is elevated ({:.0}%)", load),
            "Check for background tasks consuming CPU time.",
        );
    }

    if let Detected::Present(temp) = s.cpu.temperature_c {
        if temp > t.cpu_temp_critical_c {
            card.flag(
                Severity::Critical,
                category::CPU,
                penalty::CPU_TEMP_CRITICAL,
                format!("CPU temperature is {:.0} °C", temp),
                "Clean the cooling system and check thermal paste.",
            );
        } else if temp > t.cpu_temp_warning_c {
            card.flag(
                Severity::Warning,
                category::CPU,
                penalty::CPU_TEMP_WARNING,
                format!("CPU temperature is elevated ({:.0} °C)", temp),
                "Make sure vents are not blocked.",
            );
        }
    }
}

fn storage_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    for disk in &s.disks {
        if disk.total_bytes == 0 {
            continue;
        }
        let free = disk.free_percent();
        if free < t.disk_free_critical_percent {
            card.flag(
                Severity::Critical,
                category::STORAGE,
                penalty::DISK_CRITICAL,
                format!(
                    "Volume {} is almost full ({:.1}% free, {} MB)",
                    disk.mount_point,
                    free,
                    bytes_to_mb(disk.free_bytes)
                ),
                "Free up space immediately; low space breaks updates and paging.",
            );
        } else if free < t.disk_free_warning_percent {
            card.flag(
                Severity::Warning,
                category::STORAGE,
                penalty::DISK_WARNING,
                format!("Volume {} is running low on space ({:.1}% free)", disk.mount_point, free),
                "Remove unneeded files or move data to another drive.",
            );
        }
    }
}

fn gpu_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let Detected::Present(gpu) = &s.gpu else {
        return;
    };
    if gpu_driver_outdated(s, t) {
        let date = gpu
            .driver_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        card.flag(
            Severity::Warning,
            category::GPU,
            penalty::GPU_DRIVER_OLD,
            format!("{} driver {} is from {}", gpu.name, gpu.driver_version, date),
            GPU_DRIVER_ADVICE,
        );
    }
    if let Detected::Present(temp) = gpu.temperature_c {
        if temp > t.gpu_temp_warning_c {
            card.flag(
                Severity::Warning,
                category::GPU,
                penalty::GPU_TEMP,
                format!("{} is running hot ({:.0} °C)", gpu.name, temp),
                "Check GPU fans and case airflow.",
            );
        }
    }
}

fn battery_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let Detected::Present(battery) = &s.battery else {
        return;
    };
    let health = battery.health_percent;
    if health < t.battery_health_critical_percent {
        card.flag(
            Severity::Critical,
            category::BATTERY,
            penalty::BATTERY_CRITICAL,
            format!("Battery holds only {:.0}% of its design capacity", health),
            "Replace the battery.",
        );
    } else if health < t.battery_health_warning_percent {
        card.flag(
            Severity::Warning,
            category::BATTERY,
            penalty::BATTERY_WARNING,
            format!("Battery capacity has degraded to {:.0}%", health),
            "Plan a battery replacement.",
        );
    }
}

fn startup_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let enabled = s.startup.iter().filter(|e| e.enabled).count();
    if enabled > t.startup_warning_count {
        card.flag(
            Severity::Warning,
            category::STARTUP,
            penalty::STARTUP_WARNING,
            format!("{} programs start with Windows", enabled),
            "Disable startup programs you do not need.",
        );
    } else if enabled > t.startup_info_count {
        card.flag(
            Severity::Info,
            category::STARTUP,
            penalty::STARTUP_INFO,
            format!("{} programs start with Windows", enabled),
            "Review the startup list.",
        );
    }
}

fn security_rules(s: &Snapshot, card: &mut Scorecard) {
    match &s.security.antivirus {
        Detected::Absent => card.flag(
            Severity::Critical,
            category::SECURITY,
            penalty::ANTIVIRUS_MISSING,
            "No antivirus product is registered".to_string(),
            "Install or enable an antivirus product.",
        ),
        Detected::Present(av) => {
            if !av.enabled || !av.realtime_protection {
                card.flag(
                    Severity::Critical,
                    category::SECURITY,
                    penalty::ANTIVIRUS_MISSING,
                    format!("{} protection is turned off", av.product),
                    "Turn real-time protection back on.",
                );
            }
            if av.scan_in_progress {
                card.flag(
                    Severity::Warning,
                    category::SECURITY,
                    penalty::ANTIVIRUS_SCANNING,
                    format!("{} was scanning during the check", av.product),
                    "Re-run the check after the scan finishes; results may be skewed.",
                );
            }
            if !av.definitions_up_to_date {
                card.flag(
                    Severity::Warning,
                    category::SECURITY,
                    penalty::DEFINITIONS_OLD,
                    format!("{} definitions are out of date", av.product),
                    "Update virus definitions.",
                );
            }
        }
    }
    if !s.security.firewall_enabled {
        card.flag(
            Severity::Warning,
            category::SECURITY,
            penalty::FIREWALL_OFF,
            "The firewall is disabled".to_string(),
            "Enable the firewall for all network profiles.",
        );
    }
}

fn stability_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let ev = &s.events;
    if ev.bsod_count_30d >= t.bsod_critical_count {
        card.flag(
            Severity::Critical,
            category::STABILITY,
            penalty::BSOD_CRITICAL,
            format!("{} blue screens in the last 30 days", ev.bsod_count_30d),
            "Check drivers, memory and storage health.",
        );
    } else if ev.bsod_count_30d >= 1 {
        card.flag(
            Severity::Warning,
            category::STABILITY,
            penalty::BSOD_WARNING,
            format!("{} blue screen(s) in the last 30 days", ev.bsod_count_30d),
            "Review the crash dumps for a failing driver.",
        );
    }
    if ev.app_crash_count_30d >= t.app_crash_warning_count {
        card.flag(
            Severity::Warning,
            category::STABILITY,
            penalty::APP_CRASHES,
            format!("{} application crashes in the last 30 days", ev.app_crash_count_30d),
            "Repair or update the crashing applications.",
        );
    }
    if ev.unexpected_shutdowns_30d >= 1 {
        card.flag(
            Severity::Warning,
            category::STABILITY,
            penalty::UNEXPECTED_SHUTDOWN,
            format!("{} unexpected shutdown(s) in the last 30 days", ev.unexpected_shutdowns_30d),
            "Check the power supply and overheating.",
        );
    }
}

fn network_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let Detected::Present(net) = &s.network else {
        return;
    };
    if !net.connected {
        card.flag(
            Severity::Warning,
            category::NETWORK,
            penalty::DISCONNECTED,
            format!("{} is not connected", net.adapter),
            "Check the cable or wireless connection.",
        );
    }
    probe_rule(
        card,
        "Latency",
        net.latency,
        classify_probe(net.latency, t.latency_fair_ms, t.latency_poor_ms),
        "Check the router and other devices saturating the connection.",
    );
    probe_rule(
        card,
        "DNS resolution",
        net.dns,
        classify_probe(net.dns, t.dns_fair_ms, t.dns_poor_ms),
        "Flush the DNS cache or switch to a faster DNS server.",
    );
}

fn probe_rule(card: &mut Scorecard, what: &str, probe: ProbeResult, quality: Quality, fix: &str) {
    match quality {
        Quality::Good => {}
        Quality::Fair => card.flag(
            Severity::Info,
            category::NETWORK,
            penalty::PROBE_FAIR,
            format!("{} is fair ({})", what, probe),
            fix,
        ),
        Quality::Poor => card.flag(
            Severity::Warning,
            category::NETWORK,
            penalty::PROBE_POOR,
            format!("{} is poor ({})", what, probe),
            fix,
        ),
    }
}

fn cleanup_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let temp_mb = bytes_to_mb(s.cleanup.temp_bytes());
    if temp_mb > t.temp_files_warning_mb {
        card.flag(
            Severity::Warning,
            category::CLEANUP,
            penalty::TEMP_FILES,
            format!("Temporary files occupy {} MB", temp_mb),
            "Run the temp file cleanup.",
        );
    }
    if let Detected::Present(old) = &s.cleanup.windows_old {
        card.flag(
            Severity::Info,
            category::CLEANUP,
            penalty::WINDOWS_OLD,
            format!(
                "A previous Windows installation occupies {} MB",
                bytes_to_mb(old.size_bytes)
            ),
            "Remove it with Disk Cleanup once the upgrade is confirmed stable.",
        );
    }
}

fn software_rules(s: &Snapshot, card: &mut Scorecard) {
    if let Detected::Present(office) = &s.software.office {
        if office.needs_repair {
            card.flag(
                Severity::Warning,
                category::SOFTWARE,
                penalty::OFFICE_REPAIR,
                format!("Office {} reports a damaged installation", office.version),
                "Run an Office quick repair.",
            );
        }
    }
}

fn power_rules(s: &Snapshot, card: &mut Scorecard) {
    if !s.performance.is_high_performance() {
        card.flag(
            Severity::Info,
            category::POWER,
            penalty::POWER_PLAN,
            format!("Power plan is '{}'", s.performance.power_plan),
            "Switch to the High performance plan on mains power.",
        );
    }
}

fn system_rules(s: &Snapshot, t: &Thresholds, card: &mut Scorecard) {
    let days = s.system.uptime_seconds / 86_400;
    if days > t.uptime_info_days {
        card.flag(
            Severity::Info,
            category::SYSTEM,
            penalty::LONG_UPTIME,
            format!("The system has been running for {} days", days),
            "Restart to apply pending updates and release leaked resources.",
        );
    }
}
