//! Read-only system report

use autotweak_common::{CommandMode, SystemHost};
use std::fs;
use sysinfo::{DiskKind, Disks, System};

const OS_RELEASE: &str = "/etc/os-release";

#[derive(Debug, Clone)]
pub struct DiskInfo {
    pub name: String,
    pub mount_point: String,
    /// "SSD", "HDD" or "unknown"
    pub kind: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct SystemReport {
    pub os: String,
    pub kernel: String,
    pub hostname: String,
    pub cpu_model: String,
    pub cpu_threads: usize,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub swap_total_bytes: u64,
    pub disks: Vec<DiskInfo>,
    pub running_services: Option<usize>,
    pub boot_time: Option<String>,
}

/// `PRETTY_NAME` from os-release content, quotes removed
pub fn parse_pretty_name(os_release: &str) -> Option<String> {
    os_release
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

fn disk_kind(kind: DiskKind) -> &'static str {
    match kind {
        DiskKind::SSD => "SSD",
        DiskKind::HDD => "HDD",
        _ => "unknown",
    }
}

/// Gather the report; command-backed fields are `None` when the command fails
pub fn collect<H: SystemHost + ?Sized>(host: &H) -> SystemReport {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu();

    let os = fs::read_to_string(OS_RELEASE)
        .ok()
        .and_then(|c| parse_pretty_name(&c))
        .or_else(System::long_os_version)
        .unwrap_or_else(|| "unknown".to_string());

    let cpu_model = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let disks = Disks::new_with_refreshed_list()
        .list()
        .iter()
        .map(|d| DiskInfo {
            name: d.name().to_string_lossy().to_string(),
            mount_point: d.mount_point().display().to_string(),
            kind: disk_kind(d.kind()).to_string(),
            total_bytes: d.total_space(),
            available_bytes: d.available_space(),
        })
        .collect();

    let services = host.run(
        "systemctl list-units --type=service --state=running --no-legend --plain",
        CommandMode::Direct,
    );
    let running_services = services
        .ok
        .then(|| services.stdout.lines().filter(|l| !l.trim().is_empty()).count());

    let analyze = host.run("systemd-analyze", CommandMode::Direct);
    let boot_time = analyze.ok.then(|| analyze.first_line().to_string());

    SystemReport {
        os,
        kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        cpu_model,
        cpu_threads: sys.cpus().len(),
        memory_total_bytes: sys.total_memory(),
        memory_used_bytes: sys.used_memory(),
        swap_total_bytes: sys.total_swap(),
        disks,
        running_services,
        boot_time,
    }
}

/// Bytes as GiB with one decimal
pub fn format_gib(bytes: u64) -> String {
    format!("{:.1} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}
