//! Network, VM and scheduler sysctls plus per-disk I/O settings

use super::{set_and_persist, RecipeContext};
use autotweak_common::parameter::{read_ahead_parameter, scheduler_parameter};
use autotweak_common::{BlockDevice, SystemHost, TweakSession};

pub const KERNEL_SYSCTLS: [(&str, &str); 9] = [
    ("vm.vfs_cache_pressure", "50"),
    ("vm.dirty_writeback_centisecs", "1500"),
    ("net.core.netdev_max_backlog", "16384"),
    ("net.core.somaxconn", "8192"),
    ("net.ipv4.tcp_fastopen", "3"),
    ("net.ipv4.tcp_max_syn_backlog", "8192"),
    ("net.ipv4.tcp_max_tw_buckets", "2000000"),
    ("kernel.nmi_watchdog", "0"),
    ("kernel.sched_autogroup_enabled", "1"),
];

const SSD_SCHEDULERS: [&str; 3] = ["none", "mq-deadline", "deadline"];
const HDD_SCHEDULERS: [&str; 4] = ["bfq", "cfq", "mq-deadline", "deadline"];

const SSD_READ_AHEAD_KB: &str = "256";
const HDD_READ_AHEAD_KB: &str = "1024";

/// First preferred scheduler the device offers
pub fn preferred_scheduler(device: &BlockDevice) -> Option<&'static str> {
    let preferences: &[&'static str] = if device.is_ssd() { &SSD_SCHEDULERS } else { &HDD_SCHEDULERS };
    preferences
        .iter()
        .copied()
        .find(|p| device.schedulers.iter().any(|s| s == p))
}

pub fn apply<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>, ctx: &RecipeContext<'_>) {
    for (key, value) in KERNEL_SYSCTLS {
        set_and_persist(session, &ctx.paths.sysctl_conf, key, value);
    }

    for device in session.host().block_devices() {
        if device.rotational.is_none() {
            session.note(&format!("{}: disk type unknown, I/O settings left unchanged", device.name));
            continue;
        }

        if let Some(scheduler) = preferred_scheduler(&device) {
            session.set_runtime_parameter(&scheduler_parameter(&device.name), scheduler);
        }

        let read_ahead = if device.is_ssd() { SSD_READ_AHEAD_KB } else { HDD_READ_AHEAD_KB };
        session.set_runtime_parameter(&read_ahead_parameter(&device.name), read_ahead);
    }
}
