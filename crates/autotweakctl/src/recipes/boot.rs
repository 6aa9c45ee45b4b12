//! Boot time: optional services, systemd timeouts, GRUB menu delay

use super::{program_exists, RecipeContext};
use autotweak_common::{CommandMode, KeyMatcher, SystemHost, TweakSession};

/// Services many desktops never use
pub const OPTIONAL_SERVICES: [&str; 6] = [
    "bluetooth.service",
    "cups.service",
    "avahi-daemon.service",
    "ModemManager.service",
    "nfs-server.service",
    "saned.service",
];

pub const SYSTEMD_TIMEOUTS: [(&str, &str); 2] = [("DefaultTimeoutStartSec", "15s"), ("DefaultTimeoutStopSec", "15s")];

pub const GRUB_TIMEOUT: (&str, &str) = ("GRUB_TIMEOUT", "1");

fn service_installed<H: SystemHost + ?Sized>(host: &H, service: &str) -> bool {
    let result = host.run(&format!("systemctl list-unit-files {}", service), CommandMode::Direct);
    result.ok && result.stdout.contains(service)
}

fn service_active<H: SystemHost + ?Sized>(host: &H, service: &str) -> bool {
    host.run(&format!("systemctl is-active --quiet {}", service), CommandMode::Direct)
        .ok
}

pub fn apply<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>, ctx: &RecipeContext<'_>) {
    for service in OPTIONAL_SERVICES {
        let host = session.host();
        if !service_installed(host, service) || !service_active(host, service) {
            continue;
        }
        if ctx.confirm.confirm(&format!("Disable {}?", service)) {
            session.disable_service(service);
        }
    }

    let system_conf = ctx.paths.systemd_system_conf.as_path();
    if system_conf.exists() {
        for (key, value) in SYSTEMD_TIMEOUTS {
            session.upsert_config_line(system_conf, &KeyMatcher::new(key), &format!("{}={}", key, value));
        }
    }

    let grub = ctx.paths.grub_default.as_path();
    if grub.exists() {
        let (key, value) = GRUB_TIMEOUT;
        let edit = session.upsert_config_line(grub, &KeyMatcher::new(key), &format!("{}={}", key, value));
        if edit.changed {
            regenerate_grub(session);
        }
    }

    session.run_action(
        "systemctl enable fstrim.timer",
        CommandMode::Direct,
        "Enabled periodic TRIM (fstrim.timer)",
    );
}

fn regenerate_grub<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>) {
    let host = session.host();
    let command = if program_exists(host, "update-grub") {
        "update-grub"
    } else if program_exists(host, "grub-mkconfig") {
        "grub-mkconfig -o /boot/grub/grub.cfg"
    } else if program_exists(host, "grub2-mkconfig") {
        "grub2-mkconfig -o /boot/grub2/grub.cfg"
    } else {
        session.note("No GRUB config generator found, run it manually to apply GRUB_TIMEOUT");
        return;
    };
    session.run_action(command, CommandMode::Direct, "Regenerated GRUB configuration");
}
