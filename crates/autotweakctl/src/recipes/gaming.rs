//! Latency-oriented tuning for games

use super::packages::{self, PackageManager};
use super::{program_exists, set_and_persist, RecipeContext};
use autotweak_common::parameter::CPU_GOVERNOR;
use autotweak_common::{CommandMode, SystemHost, TweakSession};

pub const LATENCY_SYSCTLS: [(&str, &str); 4] = [
    ("kernel.sched_min_granularity_ns", "10000000"),
    ("kernel.sched_wakeup_granularity_ns", "15000000"),
    ("vm.stat_interval", "10"),
    ("kernel.timer_migration", "0"),
];

pub fn apply<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>, ctx: &RecipeContext<'_>) {
    session.set_runtime_parameter(CPU_GOVERNOR, "performance");

    if program_exists(session.host(), "nvidia-settings") {
        session.run_action(
            "nvidia-settings -a [gpu:0]/GpuPowerMizerMode=1",
            CommandMode::Direct,
            "Disabled NVIDIA power saving mode",
        );
    }

    for (key, value) in LATENCY_SYSCTLS {
        set_and_persist(session, &ctx.paths.sysctl_conf, key, value);
    }

    let gamemode: &[&str] = match PackageManager::detect(session.host()) {
        Some(PackageManager::Pacman) => &["gamemode", "lib32-gamemode"],
        _ => &["gamemode"],
    };
    packages::install(session, gamemode);
}
