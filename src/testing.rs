//! Shared fixtures for unit tests.

use chrono::{Duration, TimeZone, Utc};

use crate::models::*;

/// A machine with nothing worth flagging.
pub fn healthy_snapshot() -> Snapshot {
    let captured_at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
    Snapshot {
        captured_at,
        system: SystemIdentity {
            hostname: "WS-0142".into(),
            os_name: "Windows 11 Pro".into(),
            os_version: "10.0.22631".into(),
            manufacturer: "Lenovo".into(),
            model: "ThinkPad T14".into(),
            uptime_seconds: 2 * 86_400,
        },
        cpu: CpuInfo {
            brand: "AMD Ryzen 7 PRO 6850U".into(),
            logical_cores: 16,
            load_percent: 12.0,
            sustained_load_percent: 18.5,
            temperature_c: Detected::Present(54.0),
        },
        memory: MemoryInfo {
            total_mb: 16_384,
            used_mb: 7_900,
        },
        disks: vec![DiskInfo {
            mount_point: "C:\\".into(),
            label: "OS".into(),
            total_bytes: 512 * 1024 * 1024 * 1024,
            free_bytes: 260 * 1024 * 1024 * 1024,
            is_system: true,
        }],
        gpu: Detected::Present(GpuInfo {
            name: "AMD Radeon 680M".into(),
            driver_version: "31.0.24002.92".into(),
            driver_date: Some(captured_at.date_naive() - Duration::days(40)),
            temperature_c: Detected::Present(58.0),
        }),
        battery: Detected::Present(BatteryInfo {
            charge_percent: 88.0,
            health_percent: 94.0,
            cycle_count: Some(112),
        }),
        startup: (0..5)
            .map(|i| StartupEntry {
                name: format!("Agent {}", i),
                command: format!("C:\\Program Files\\Agent{}\\agent.exe", i),
                location: "HKCU\\Software\\Microsoft\\Windows\\CurrentVersion\\Run".into(),
                enabled: true,
            })
            .collect(),
        network: Detected::Present(NetworkInfo {
            adapter: "Intel Wi-Fi 6E AX211".into(),
            connected: true,
            latency: ProbeResult::Ok { ms: 18 },
            dns: ProbeResult::Ok { ms: 12 },
        }),
        software: SoftwareInfo {
            installed: vec![InstalledProgram {
                name: "Microsoft 365 Apps".into(),
                version: "16.0.17328".into(),
                publisher: "Microsoft Corporation".into(),
                install_date: None,
            }],
            office: Detected::Present(OfficeInfo {
                version: "16.0".into(),
                needs_repair: false,
            }),
        },
        security: SecurityInfo {
            antivirus: Detected::Present(AntivirusInfo {
                product: "Microsoft Defender Antivirus".into(),
                enabled: true,
                realtime_protection: true,
                definitions_up_to_date: true,
                scan_in_progress: false,
            }),
            firewall_enabled: true,
        },
        events: EventLogSummary::default(),
        performance: PerformanceSettings {
            power_plan: HIGH_PERFORMANCE_PLAN.into(),
            visual_effects: VisualEffects::BestPerformance,
        },
        cleanup: CleanupTargets {
            temp_folders: Vec::new(),
            recycle_bin_bytes: 0,
            recycle_bin_items: 0,
            windows_old: Detected::Absent,
            upgrade_logs: Detected::Absent,
        },
        shell: ShellInfo {
            process_name: "explorer.exe".into(),
            instance_count: 1,
            working_set_mb: 140,
            uptime_hours: 30,
        },
    }
}
