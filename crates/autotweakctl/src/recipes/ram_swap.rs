//! Memory pressure and writeback tuning

use super::{packages, set_and_persist, RecipeContext};
use autotweak_common::{CommandMode, ParameterKind, SystemHost, TweakSession};

pub const SWAPPINESS: (&str, &str) = ("vm.swappiness", "10");

pub const DIRTY_RATIOS: [(&str, &str); 2] = [("vm.dirty_ratio", "10"), ("vm.dirty_background_ratio", "5")];

pub const NUMA_BALANCING: (&str, &str) = ("kernel.numa_balancing", "1");

pub fn apply<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>, ctx: &RecipeContext<'_>) {
    let conf = ctx.paths.sysctl_conf.as_path();

    let swap = session.host().run("swapon --show", CommandMode::Direct);
    if swap.ok && !swap.stdout.trim().is_empty() {
        set_and_persist(session, conf, SWAPPINESS.0, SWAPPINESS.1);
    } else {
        session.note("No active swap, swappiness left unchanged");
    }

    for (key, value) in DIRTY_RATIOS {
        set_and_persist(session, conf, key, value);
    }

    // Only NUMA machines expose this key
    let (key, value) = NUMA_BALANCING;
    if session.host().read_parameter(key, &ParameterKind::Sysctl).is_ok() {
        session.set_runtime_parameter(key, value);
    }

    // Userspace OOM killer, kicks in before the kernel one under swap thrash
    if packages::install(session, &["earlyoom"]).is_some_and(|installed| installed.ok) {
        session.run_action(
            "systemctl enable --now earlyoom",
            CommandMode::Direct,
            "Enabled earlyoom",
        );
    }
}
