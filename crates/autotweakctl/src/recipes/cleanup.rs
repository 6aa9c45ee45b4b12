//! Package, log, temp-file and cache cleanup. Nothing here is revertible;
//! the journal entry only lists what ran.

use super::packages::PackageManager;
use super::{shell_quote, RecipeContext};
use autotweak_common::{CommandMode, SystemHost, TweakSession};

pub fn apply<H: SystemHost + ?Sized>(session: &mut TweakSession<'_, H>, ctx: &RecipeContext<'_>) {
    match PackageManager::detect(session.host()) {
        Some(pm) => {
            for (command, mode, description) in pm.cleanup_steps() {
                session.run_action(command, *mode, description);
            }
        }
        None => session.note("No supported package manager found, package cache left alone"),
    }

    session.run_action(
        "journalctl --vacuum-time=7d",
        CommandMode::Direct,
        "Removed journal logs older than 7 days",
    );

    for dir in &ctx.paths.temp_dirs {
        let command = format!(
            "find {} -type f -atime +1 -delete 2>/dev/null || true",
            shell_quote(&dir.display().to_string())
        );
        session.run_action(
            &command,
            CommandMode::Shell,
            &format!("Removed files in {} unused for over a day", dir.display()),
        );
    }

    for dir in ctx.paths.thumbnail_dirs.iter().filter(|d| d.is_dir()) {
        let command = format!("rm -rf -- {}/*", shell_quote(&dir.display().to_string()));
        session.run_action(
            &command,
            CommandMode::Shell,
            &format!("Cleared thumbnail cache {}", dir.display()),
        );
    }
}
