//! Tuning recipes
//!
//! Each recipe feeds mutation requests into a `TweakSession`; the session
//! records prior state and the journal makes the recipe revertible.
//! File locations come from `RecipePaths` so tests can point them at
//! temporary files.

pub mod boot;
pub mod cleanup;
pub mod gaming;
pub mod kernel;
pub mod packages;
pub mod ram_swap;
pub mod storage;

use crate::prompt::Confirm;
use anyhow::{bail, Result};
use autotweak_common::{CommandMode, KeyMatcher, StepOutcome, SystemHost, TweakKind, TweakSession};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Config files and directories the recipes touch
#[derive(Debug, Clone)]
pub struct RecipePaths {
    pub sysctl_conf: PathBuf,
    pub systemd_system_conf: PathBuf,
    pub grub_default: PathBuf,
    pub fstab: PathBuf,
    pub lvm_conf: PathBuf,
    pub temp_dirs: Vec<PathBuf>,
    pub thumbnail_dirs: Vec<PathBuf>,
}

impl Default for RecipePaths {
    fn default() -> Self {
        let home = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/root".to_string()));
        Self {
            sysctl_conf: PathBuf::from("/etc/sysctl.conf"),
            systemd_system_conf: PathBuf::from("/etc/systemd/system.conf"),
            grub_default: PathBuf::from("/etc/default/grub"),
            fstab: PathBuf::from("/etc/fstab"),
            lvm_conf: PathBuf::from("/etc/lvm/lvm.conf"),
            temp_dirs: vec![PathBuf::from("/tmp"), PathBuf::from("/var/tmp")],
            thumbnail_dirs: vec![home.join(".cache/thumbnails"), home.join(".thumbnails")],
        }
    }
}

/// Everything a recipe needs besides the session
pub struct RecipeContext<'a> {
    pub paths: RecipePaths,
    pub confirm: &'a dyn Confirm,
}

impl<'a> RecipeContext<'a> {
    pub fn new(paths: RecipePaths, confirm: &'a dyn Confirm) -> Self {
        Self { paths, confirm }
    }
}

/// Run the recipe for the session's kind
pub fn run_recipe<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>, ctx: &RecipeContext<'_>) {
    match session.kind() {
        TweakKind::Cleanup => cleanup::apply(session, ctx),
        TweakKind::RamSwap => ram_swap::apply(session, ctx),
        TweakKind::Boot => boot::apply(session, ctx),
        TweakKind::Kernel => kernel::apply(session, ctx),
        TweakKind::Storage => storage::apply(session, ctx),
        TweakKind::Gaming => gaming::apply(session, ctx),
    }
}

/// Turn `apply` arguments into an ordered, de-duplicated list of kinds
///
/// `all` expands to every kind except gaming, which needs `include_gaming`.
pub fn select_kinds(args: &[String], include_gaming: bool) -> Result<Vec<TweakKind>> {
    if args.is_empty() {
        bail!("nothing to apply: name one or more of cleanup, ram_swap, boot, kernel, storage, gaming, or 'all'");
    }

    let mut kinds = Vec::new();
    for arg in args {
        let expanded: Vec<TweakKind> = if arg.eq_ignore_ascii_case("all") {
            TweakKind::ALL
                .iter()
                .copied()
                .filter(|k| include_gaming || *k != TweakKind::Gaming)
                .collect()
        } else {
            vec![arg.parse::<TweakKind>()?]
        };

        for kind in expanded {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
    }
    Ok(kinds)
}

/// Set a sysctl live and persist it to `conf`
///
/// The persisted line is only written when the live write succeeded, and
/// only when `conf` exists.
pub fn set_and_persist<H: SystemHost + ?Sized>(
    session: &mut TweakSession<'_, H>,
    conf: &Path,
    key: &str,
    value: &str,
) -> StepOutcome {
    let live = session.set_runtime_parameter(key, value);
    if !live.ok {
        return live;
    }
    if !conf.exists() {
        warn!("{} not found, {} will not survive a reboot", conf.display(), key);
        return live;
    }
    session.upsert_config_line(conf, &KeyMatcher::new(key), &format!("{}={}", key, value))
}

/// Whether a program is on PATH
pub fn program_exists<H: SystemHost + ?Sized>(host: &H, program: &str) -> bool {
    host.run(&format!("which {}", program), CommandMode::Direct).ok
}

/// Single-quote `s` for `sh -c`
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_excludes_gaming_by_default() {
        let kinds = select_kinds(&["all".to_string()], false).unwrap();
        assert_eq!(kinds.len(), 5);
        assert!(!kinds.contains(&TweakKind::Gaming));

        let kinds = select_kinds(&["all".to_string()], true).unwrap();
        assert_eq!(kinds.last(), Some(&TweakKind::Gaming));
    }

    #[test]
    fn test_select_dedups_in_order() {
        let args: Vec<String> = ["kernel", "ram-swap", "kernel"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            select_kinds(&args, false).unwrap(),
            vec![TweakKind::Kernel, TweakKind::RamSwap]
        );
    }

    #[test]
    fn test_select_rejects_unknown() {
        assert!(select_kinds(&["turbo".to_string()], false).is_err());
        assert!(select_kinds(&[], false).is_err());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/home/a b"), "'/home/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
