//! Parameter classification
//!
//! Maps a recorded parameter name to the control surface that restores it.
//! The kind is decided once, when the original value is recorded, and
//! stored in the journal next to the value.

use serde::{Deserialize, Serialize};

/// Reserved name for the CPU frequency governor
pub const CPU_GOVERNOR: &str = "cpu_governor";

/// Composite-name suffix for a disk's I/O scheduler
pub const SCHEDULER_SUFFIX: &str = "_scheduler";

/// Composite-name suffix for a disk's read-ahead size
pub const READ_AHEAD_SUFFIX: &str = "_read_ahead_kb";

/// First segments of dotted names that are live kernel tunables
pub const SYSCTL_NAMESPACES: &[&str] = &[
    "vm", "kernel", "net", "fs", "dev", "abi", "user", "debug", "sunrpc", "crypto",
];

/// Which control surface a parameter lives on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Generic runtime key written through sysctl
    Sysctl,
    /// `/sys/block/<disk>/queue/scheduler`
    DiskScheduler { disk: String },
    /// `/sys/block/<disk>/queue/read_ahead_kb`
    DiskReadAhead { disk: String },
    /// Every CPU's `cpufreq/scaling_governor`
    CpuGovernor,
}

impl ParameterKind {
    /// Decide the control surface for a recorded name
    pub fn classify(name: &str) -> Self {
        if name == CPU_GOVERNOR {
            return ParameterKind::CpuGovernor;
        }

        if is_sysctl_name(name) {
            return ParameterKind::Sysctl;
        }

        if let Some(disk) = disk_prefix(name, READ_AHEAD_SUFFIX) {
            return ParameterKind::DiskReadAhead { disk };
        }

        if let Some(disk) = disk_prefix(name, SCHEDULER_SUFFIX) {
            return ParameterKind::DiskScheduler { disk };
        }

        ParameterKind::Sysctl
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Sysctl => "sysctl",
            ParameterKind::DiskScheduler { .. } => "disk scheduler",
            ParameterKind::DiskReadAhead { .. } => "disk read-ahead",
            ParameterKind::CpuGovernor => "cpu governor",
        }
    }
}

/// Whether `name` is a dotted key in a known sysctl namespace
pub fn is_sysctl_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((namespace, rest)) => !rest.is_empty() && SYSCTL_NAMESPACES.contains(&namespace),
        None => false,
    }
}

// Disk names never contain '/' or '.', which keeps composite names out of
// dotted sysctl keys and away from path traversal.
fn disk_prefix(name: &str, suffix: &str) -> Option<String> {
    let disk = name.strip_suffix(suffix)?;
    if disk.is_empty() || disk.contains('/') || disk.contains('.') {
        return None;
    }
    Some(disk.to_string())
}

/// Composite name for a disk's scheduler
pub fn scheduler_parameter(disk: &str) -> String {
    format!("{}{}", disk, SCHEDULER_SUFFIX)
}

/// Composite name for a disk's read-ahead size
pub fn read_ahead_parameter(disk: &str) -> String {
    format!("{}{}", disk, READ_AHEAD_SUFFIX)
}

/// Active entry of a sysfs scheduler listing: `"mq-deadline [none] bfq"` -> `"none"`
pub fn parse_active_scheduler(raw: &str) -> String {
    let raw = raw.trim();
    match (raw.find('['), raw.find(']')) {
        (Some(start), Some(end)) if start < end => raw[start + 1..end].to_string(),
        _ => raw.to_string(),
    }
}

/// Every entry of a sysfs scheduler listing, brackets removed
pub fn parse_available_schedulers(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .map(|s| s.trim_matches(|c| c == '[' || c == ']').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sysctl_names() {
        assert_eq!(ParameterKind::classify("vm.swappiness"), ParameterKind::Sysctl);
        assert_eq!(
            ParameterKind::classify("net.ipv4.tcp_fastopen"),
            ParameterKind::Sysctl
        );
        assert_eq!(
            ParameterKind::classify("kernel.sched_autogroup_enabled"),
            ParameterKind::Sysctl
        );
    }

    #[test]
    fn test_classify_composite_disk_names() {
        assert_eq!(
            ParameterKind::classify("sda_scheduler"),
            ParameterKind::DiskScheduler {
                disk: "sda".to_string()
            }
        );
        assert_eq!(
            ParameterKind::classify("nvme0n1_read_ahead_kb"),
            ParameterKind::DiskReadAhead {
                disk: "nvme0n1".to_string()
            }
        );
        assert_eq!(
            ParameterKind::classify("dm-0_scheduler"),
            ParameterKind::DiskScheduler {
                disk: "dm-0".to_string()
            }
        );
    }

    #[test]
    fn test_classify_cpu_governor() {
        assert_eq!(ParameterKind::classify(CPU_GOVERNOR), ParameterKind::CpuGovernor);
    }

    #[test]
    fn test_classify_falls_back_to_generic() {
        assert_eq!(ParameterKind::classify("swappiness"), ParameterKind::Sysctl);
        assert_eq!(ParameterKind::classify("_scheduler"), ParameterKind::Sysctl);
        assert_eq!(ParameterKind::classify("../x_scheduler"), ParameterKind::Sysctl);
    }

    #[test]
    fn test_composite_helpers_roundtrip_through_classify() {
        assert_eq!(
            ParameterKind::classify(&scheduler_parameter("sdb")),
            ParameterKind::DiskScheduler {
                disk: "sdb".to_string()
            }
        );
        assert_eq!(read_ahead_parameter("sdb"), "sdb_read_ahead_kb");
    }

    #[test]
    fn test_parse_active_scheduler() {
        assert_eq!(parse_active_scheduler("mq-deadline [none] bfq\n"), "none");
        assert_eq!(parse_active_scheduler("[bfq] none"), "bfq");
        assert_eq!(parse_active_scheduler("none"), "none");
    }

    #[test]
    fn test_parse_available_schedulers() {
        assert_eq!(
            parse_available_schedulers("mq-deadline kyber [bfq] none"),
            vec!["mq-deadline", "kyber", "bfq", "none"]
        );
    }

    #[test]
    fn test_kind_serializes_with_tag() {
        let json = serde_json::to_string(&ParameterKind::DiskScheduler {
            disk: "sda".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"disk_scheduler","disk":"sda"}"#);
    }
}
