//! Host control surfaces
//!
//! `SystemHost` is everything the engine needs from the machine: command
//! execution, live parameter reads and writes, and service toggles.
//! `LiveHost` talks to the real system; `MemoryHost` keeps state in memory.

use crate::command_exec::{run_command, run_program, CommandMode, CommandResult, ExecutionStatus};
use crate::parameter::{parse_active_scheduler, parse_available_schedulers, ParameterKind, CPU_GOVERNOR};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Default sysfs mount point
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

#[derive(Error, Debug)]
pub enum HostError {
    #[error("command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("control surface {} unreadable: {source}", path.display())]
    SurfaceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("control surface {} unwritable: {source}", path.display())]
    SurfaceUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no control surface for {0}")]
    NoSurface(String),
}

impl HostError {
    fn from_command(result: &CommandResult) -> Self {
        HostError::CommandFailed {
            command: result.command.clone(),
            output: result.first_line().to_string(),
        }
    }
}

/// A whole block device as seen in sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    /// `None` when the rotational flag could not be read
    pub rotational: Option<bool>,
    /// Schedulers the kernel offers for this device
    pub schedulers: Vec<String>,
}

impl BlockDevice {
    /// Non-rotational devices are treated as SSDs
    pub fn is_ssd(&self) -> bool {
        self.rotational == Some(false)
    }
}

/// Machine access used by sessions and the revert engine
pub trait SystemHost {
    /// Run an external command; never fails, see `CommandResult::ok`
    fn run(&self, command: &str, mode: CommandMode) -> CommandResult;

    fn read_parameter(&self, name: &str, kind: &ParameterKind) -> Result<String, HostError>;

    fn write_parameter(&self, name: &str, kind: &ParameterKind, value: &str) -> Result<(), HostError>;

    fn enable_service(&self, service: &str) -> Result<(), HostError>;

    fn disable_service(&self, service: &str) -> Result<(), HostError>;

    /// Whole disks, excluding loop, ram and zram devices
    fn block_devices(&self) -> Vec<BlockDevice>;
}

// =============================================================================
// LiveHost
// =============================================================================

/// The real machine
#[derive(Debug, Clone)]
pub struct LiveHost {
    sysfs_root: PathBuf,
}

impl Default for LiveHost {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl LiveHost {
    pub fn new(sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
        }
    }

    fn queue_attribute(&self, disk: &str, attribute: &str) -> PathBuf {
        self.sysfs_root
            .join("block")
            .join(disk)
            .join("queue")
            .join(attribute)
    }

    fn cpu_dir(&self) -> PathBuf {
        self.sysfs_root.join("devices/system/cpu")
    }

    /// Every `cpuN/cpufreq/scaling_governor` node, sorted
    fn governor_surfaces(&self) -> Result<Vec<PathBuf>, HostError> {
        let cpu_dir = self.cpu_dir();
        let entries = fs::read_dir(&cpu_dir).map_err(|source| HostError::SurfaceUnreadable {
            path: cpu_dir.clone(),
            source,
        })?;

        let mut surfaces: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.strip_prefix("cpu")
                    .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
            .map(|entry| entry.path().join("cpufreq/scaling_governor"))
            .filter(|path| path.exists())
            .collect();
        surfaces.sort();
        Ok(surfaces)
    }

    fn systemctl(&self, verb: &str, service: &str) -> Result<(), HostError> {
        let result = run_program("systemctl", &[verb, service]);
        if result.ok {
            Ok(())
        } else {
            Err(HostError::from_command(&result))
        }
    }
}

fn read_surface(path: &Path) -> Result<String, HostError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| HostError::SurfaceUnreadable {
            path: path.to_path_buf(),
            source,
        })
}

fn write_surface(path: &Path, value: &str) -> Result<(), HostError> {
    if !path.exists() {
        return Err(HostError::NoSurface(path.display().to_string()));
    }
    fs::write(path, value).map_err(|source| HostError::SurfaceUnwritable {
        path: path.to_path_buf(),
        source,
    })
}

impl SystemHost for LiveHost {
    fn run(&self, command: &str, mode: CommandMode) -> CommandResult {
        run_command(command, mode)
    }

    fn read_parameter(&self, name: &str, kind: &ParameterKind) -> Result<String, HostError> {
        match kind {
            ParameterKind::Sysctl => {
                let result = run_program("sysctl", &["-n", name]);
                if result.ok {
                    Ok(result.output.trim().to_string())
                } else {
                    Err(HostError::from_command(&result))
                }
            }
            ParameterKind::DiskScheduler { disk } => {
                read_surface(&self.queue_attribute(disk, "scheduler")).map(|raw| parse_active_scheduler(&raw))
            }
            ParameterKind::DiskReadAhead { disk } => read_surface(&self.queue_attribute(disk, "read_ahead_kb")),
            ParameterKind::CpuGovernor => read_surface(&self.cpu_dir().join("cpu0/cpufreq/scaling_governor")),
        }
    }

    fn write_parameter(&self, name: &str, kind: &ParameterKind, value: &str) -> Result<(), HostError> {
        match kind {
            ParameterKind::Sysctl => {
                let assignment = format!("{}={}", name, value);
                let result = run_program("sysctl", &["-w", &assignment]);
                if result.ok {
                    Ok(())
                } else {
                    Err(HostError::from_command(&result))
                }
            }
            ParameterKind::DiskScheduler { disk } => write_surface(&self.queue_attribute(disk, "scheduler"), value),
            ParameterKind::DiskReadAhead { disk } => {
                write_surface(&self.queue_attribute(disk, "read_ahead_kb"), value)
            }
            ParameterKind::CpuGovernor => {
                let surfaces = self.governor_surfaces()?;
                if surfaces.is_empty() {
                    return Err(HostError::NoSurface(CPU_GOVERNOR.to_string()));
                }

                // Every CPU is attempted; the first failure is reported afterwards
                let mut first_error = None;
                for surface in &surfaces {
                    if let Err(e) = write_surface(surface, value) {
                        warn!("{}", e);
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => {
                        info!("Set governor {} on {} CPU(s)", value, surfaces.len());
                        Ok(())
                    }
                }
            }
        }
    }

    fn enable_service(&self, service: &str) -> Result<(), HostError> {
        self.systemctl("enable", service)
    }

    fn disable_service(&self, service: &str) -> Result<(), HostError> {
        self.systemctl("disable", service)
    }

    fn block_devices(&self) -> Vec<BlockDevice> {
        let block_dir = self.sysfs_root.join("block");
        let entries = match fs::read_dir(&block_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", block_dir.display(), e);
                return Vec::new();
            }
        };

        let mut devices: Vec<BlockDevice> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with("loop") && !name.starts_with("ram") && !name.starts_with("zram"))
            .map(|name| {
                let rotational = read_surface(&self.queue_attribute(&name, "rotational"))
                    .ok()
                    .map(|v| v == "1");
                let schedulers = read_surface(&self.queue_attribute(&name, "scheduler"))
                    .map(|raw| parse_available_schedulers(&raw))
                    .unwrap_or_default();
                BlockDevice {
                    name,
                    rotational,
                    schedulers,
                }
            })
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }
}

// =============================================================================
// MemoryHost
// =============================================================================

/// In-memory host for tests and simulations
///
/// Parameters are keyed by their recorded name (`vm.swappiness`,
/// `sda_scheduler`, `cpu_governor`). Unknown parameters read as missing.
#[derive(Debug, Default)]
pub struct MemoryHost {
    parameters: RefCell<BTreeMap<String, String>>,
    services: RefCell<BTreeMap<String, bool>>,
    commands: RefCell<Vec<String>>,
    failing_commands: RefCell<BTreeSet<String>>,
    command_output: RefCell<BTreeMap<String, String>>,
    read_only: RefCell<BTreeSet<String>>,
    devices: Vec<BlockDevice>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(self, name: &str, value: &str) -> Self {
        self.parameters
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Register a service with its enabled state
    pub fn with_service(self, service: &str, enabled: bool) -> Self {
        self.services.borrow_mut().insert(service.to_string(), enabled);
        self
    }

    pub fn with_block_device(mut self, device: BlockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Commands starting with `prefix` exit non-zero
    pub fn failing(self, prefix: &str) -> Self {
        self.failing_commands.borrow_mut().insert(prefix.to_string());
        self
    }

    /// Canned stdout for commands starting with `prefix`
    pub fn with_output(self, prefix: &str, output: &str) -> Self {
        self.command_output
            .borrow_mut()
            .insert(prefix.to_string(), output.to_string());
        self
    }

    /// Writes to `name` fail while reads still work
    pub fn read_only(self, name: &str) -> Self {
        self.read_only.borrow_mut().insert(name.to_string());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<String> {
        self.parameters.borrow().get(name).cloned()
    }

    pub fn service_enabled(&self, service: &str) -> Option<bool> {
        self.services.borrow().get(service).copied()
    }

    /// Every command run so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    fn matches_prefix(set: &BTreeSet<String>, command: &str) -> bool {
        set.iter().any(|prefix| command.starts_with(prefix.as_str()))
    }

    fn set_service(&self, service: &str, enabled: bool) -> Result<(), HostError> {
        let command = format!("systemctl {} {}", if enabled { "enable" } else { "disable" }, service);
        self.commands.borrow_mut().push(command.clone());
        if Self::matches_prefix(&self.failing_commands.borrow(), &command) {
            return Err(HostError::CommandFailed {
                command,
                output: "simulated failure".to_string(),
            });
        }
        self.services.borrow_mut().insert(service.to_string(), enabled);
        Ok(())
    }
}

impl SystemHost for MemoryHost {
    fn run(&self, command: &str, _mode: CommandMode) -> CommandResult {
        self.commands.borrow_mut().push(command.to_string());
        let failed = Self::matches_prefix(&self.failing_commands.borrow(), command);
        let stdout = self
            .command_output
            .borrow()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        let (stderr, output) = if failed {
            ("simulated failure".to_string(), "simulated failure".to_string())
        } else {
            (String::new(), stdout.clone())
        };

        CommandResult {
            command: command.to_string(),
            ok: !failed,
            output,
            stdout: if failed { String::new() } else { stdout },
            stderr,
            exit_code: Some(if failed { 1 } else { 0 }),
            duration_ms: 0,
            status: if failed {
                ExecutionStatus::NonZeroExit
            } else {
                ExecutionStatus::Success
            },
        }
    }

    fn read_parameter(&self, name: &str, _kind: &ParameterKind) -> Result<String, HostError> {
        self.parameters
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::NoSurface(name.to_string()))
    }

    fn write_parameter(&self, name: &str, _kind: &ParameterKind, value: &str) -> Result<(), HostError> {
        if self.read_only.borrow().contains(name) {
            return Err(HostError::SurfaceUnwritable {
                path: PathBuf::from(name),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only parameter"),
            });
        }
        self.parameters
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn enable_service(&self, service: &str) -> Result<(), HostError> {
        self.set_service(service, true)
    }

    fn disable_service(&self, service: &str) -> Result<(), HostError> {
        self.set_service(service, false)
    }

    fn block_devices(&self) -> Vec<BlockDevice> {
        self.devices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_sysfs() -> TempDir {
        let dir = TempDir::new().unwrap();
        let queue = dir.path().join("block/sda/queue");
        fs::create_dir_all(&queue).unwrap();
        fs::write(queue.join("scheduler"), "mq-deadline [bfq] none\n").unwrap();
        fs::write(queue.join("read_ahead_kb"), "128\n").unwrap();
        fs::write(queue.join("rotational"), "1\n").unwrap();
        fs::create_dir_all(dir.path().join("block/loop0/queue")).unwrap();

        for cpu in ["cpu0", "cpu1"] {
            let cpufreq = dir.path().join("devices/system/cpu").join(cpu).join("cpufreq");
            fs::create_dir_all(&cpufreq).unwrap();
            fs::write(cpufreq.join("scaling_governor"), "powersave\n").unwrap();
        }
        fs::create_dir_all(dir.path().join("devices/system/cpu/cpufreq")).unwrap();
        dir
    }

    #[test]
    fn test_live_host_reads_disk_surfaces() {
        let sysfs = fake_sysfs();
        let host = LiveHost::new(sysfs.path());

        let sched = ParameterKind::DiskScheduler {
            disk: "sda".to_string(),
        };
        assert_eq!(host.read_parameter("sda_scheduler", &sched).unwrap(), "bfq");

        let ra = ParameterKind::DiskReadAhead {
            disk: "sda".to_string(),
        };
        assert_eq!(host.read_parameter("sda_read_ahead_kb", &ra).unwrap(), "128");
    }

    #[test]
    fn test_live_host_writes_scheduler_for_disk_not_composite_name() {
        let sysfs = fake_sysfs();
        let host = LiveHost::new(sysfs.path());
        let kind = ParameterKind::classify("sda_scheduler");

        host.write_parameter("sda_scheduler", &kind, "none").unwrap();
        assert_eq!(
            fs::read_to_string(sysfs.path().join("block/sda/queue/scheduler")).unwrap(),
            "none"
        );
        assert!(!sysfs.path().join("block/sda_scheduler").exists());
    }

    #[test]
    fn test_live_host_broadcasts_governor() {
        let sysfs = fake_sysfs();
        let host = LiveHost::new(sysfs.path());

        host.write_parameter(CPU_GOVERNOR, &ParameterKind::CpuGovernor, "performance")
            .unwrap();
        for cpu in ["cpu0", "cpu1"] {
            let path = sysfs
                .path()
                .join("devices/system/cpu")
                .join(cpu)
                .join("cpufreq/scaling_governor");
            assert_eq!(fs::read_to_string(path).unwrap(), "performance");
        }
        assert_eq!(
            host.read_parameter(CPU_GOVERNOR, &ParameterKind::CpuGovernor).unwrap(),
            "performance"
        );
    }

    #[test]
    fn test_live_host_governor_without_cpus() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("devices/system/cpu")).unwrap();
        let host = LiveHost::new(dir.path());
        let err = host
            .write_parameter(CPU_GOVERNOR, &ParameterKind::CpuGovernor, "performance")
            .unwrap_err();
        assert!(matches!(err, HostError::NoSurface(_)));
    }

    #[test]
    fn test_live_host_missing_disk_is_no_surface() {
        let sysfs = fake_sysfs();
        let host = LiveHost::new(sysfs.path());
        let kind = ParameterKind::DiskScheduler {
            disk: "sdz".to_string(),
        };
        assert!(matches!(
            host.write_parameter("sdz_scheduler", &kind, "none"),
            Err(HostError::NoSurface(_))
        ));
    }

    #[test]
    fn test_live_host_block_devices_skip_loop() {
        let sysfs = fake_sysfs();
        let host = LiveHost::new(sysfs.path());
        let devices = host.block_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "sda");
        assert_eq!(devices[0].rotational, Some(true));
        assert!(!devices[0].is_ssd());
        assert_eq!(devices[0].schedulers, vec!["mq-deadline", "bfq", "none"]);
    }

    #[test]
    fn test_memory_host_parameters_and_services() {
        let host = MemoryHost::new()
            .with_parameter("vm.swappiness", "60")
            .with_service("cups.service", true);

        assert_eq!(
            host.read_parameter("vm.swappiness", &ParameterKind::Sysctl).unwrap(),
            "60"
        );
        host.write_parameter("vm.swappiness", &ParameterKind::Sysctl, "10")
            .unwrap();
        assert_eq!(host.parameter("vm.swappiness").as_deref(), Some("10"));

        host.disable_service("cups.service").unwrap();
        assert_eq!(host.service_enabled("cups.service"), Some(false));
        assert_eq!(host.commands(), vec!["systemctl disable cups.service"]);
    }

    #[test]
    fn test_memory_host_failing_commands() {
        let host = MemoryHost::new()
            .failing("journalctl")
            .with_output("swapon", "/dev/sda2 partition 8G\n");
        assert!(!host.run("journalctl --vacuum-time=7d", CommandMode::Direct).ok);
        let swap = host.run("swapon --show", CommandMode::Direct);
        assert!(swap.ok);
        assert_eq!(swap.first_line(), "/dev/sda2 partition 8G");
    }
}
