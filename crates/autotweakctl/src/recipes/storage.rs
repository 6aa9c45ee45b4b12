//! TRIM, mount options, LVM discards, HDD power management, btrfs compression

use super::RecipeContext;
use crate::fstab::{add_btrfs_compression, add_noatime};
use autotweak_common::config_edit::is_comment;
use autotweak_common::{CommandMode, KeyMatcher, LineMatcher, SystemHost, TweakSession};

/// Indented `issue_discards = 1`, keeping the line's own indentation
pub fn enable_issue_discards(line: &str) -> Option<String> {
    if is_comment(line) || !KeyMatcher::new("issue_discards").matches(line) {
        return None;
    }
    let indent_len = line.len() - line.trim_start().len();
    Some(format!("{}issue_discards = 1", &line[..indent_len]))
}

pub fn apply<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>, ctx: &RecipeContext<'_>) {
    let devices = session.host().block_devices();
    let has_ssd = devices.iter().any(|d| d.is_ssd());
    let fstab = ctx.paths.fstab.as_path();

    if has_ssd {
        session.run_action(
            "systemctl enable fstrim.timer",
            CommandMode::Direct,
            "Enabled periodic TRIM (fstrim.timer)",
        );
        if fstab.exists() {
            session.rewrite_config_lines(fstab, "Added noatime to fstab mount options", add_noatime);
        }
    }

    let lvm = ctx.paths.lvm_conf.as_path();
    if lvm.exists() {
        session.rewrite_config_lines(lvm, "Enabled issue_discards in LVM", enable_issue_discards);
    }

    for hdd in devices.iter().filter(|d| d.rotational == Some(true)) {
        session.run_action(
            &format!("hdparm -B 254 /dev/{}", hdd.name),
            CommandMode::Direct,
            &format!("Set APM level 254 on /dev/{}", hdd.name),
        );
        session.run_action(
            &format!("hdparm -S 120 /dev/{}", hdd.name),
            CommandMode::Direct,
            &format!("Set 10 minute spindown on /dev/{}", hdd.name),
        );
    }

    let btrfs = session
        .host()
        .run("findmnt -n -t btrfs -o TARGET", CommandMode::Direct);
    if btrfs.ok
        && !btrfs.stdout.trim().is_empty()
        && fstab.exists()
        && ctx
            .confirm
            .confirm("btrfs mounts found. Enable zstd compression in fstab?")
    {
        session.rewrite_config_lines(fstab, "Added zstd compression to btrfs mounts", add_btrfs_compression);
    }
}
