//! Tweak Session
//!
//! The surface recipes talk to. Every mutation is captured before it is
//! made: prior parameter values go into the recorder, config files are
//! backed up on first touch. Individual failures are counted and logged,
//! never propagated.

use crate::backup_store::BackupStore;
use crate::command_exec::CommandMode;
use crate::config_edit::{rewrite_lines, upsert_line, LineMatcher};
use crate::host::SystemHost;
use crate::journal::{JournalEntry, JournalStore, TweakKind};
use crate::parameter::ParameterKind;
use crate::recorder::MutationRecorder;
use std::path::Path;
use tracing::{info, warn};

/// Result of one mutation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub ok: bool,
    /// Whether the system was actually modified
    pub changed: bool,
    /// Prior value, or prior file content for config edits
    pub prior: Option<String>,
    pub detail: String,
}

impl StepOutcome {
    fn success(changed: bool, prior: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            changed,
            prior,
            detail: detail.into(),
        }
    }

    fn failure(prior: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            changed: false,
            prior,
            detail: detail.into(),
        }
    }
}

/// What an operation did once sealed
#[derive(Debug, Clone)]
pub struct OperationReport {
    pub entry: JournalEntry,
    pub attempted: usize,
    pub succeeded: usize,
    /// Set when the entry could not be written to the journal
    pub persist_error: Option<String>,
}

impl OperationReport {
    pub fn ok(&self) -> bool {
        self.persist_error.is_none() && self.succeeded == self.attempted
    }
}

pub struct TweakSession<'h, H: SystemHost + ?Sized> {
    host: &'h H,
    kind: TweakKind,
    backups: BackupStore,
    recorder: MutationRecorder,
    attempted: usize,
    succeeded: usize,
}

impl<'h, H: SystemHost + ?Sized> TweakSession<'h, H> {
    pub fn new(host: &'h H, kind: TweakKind, backup_suffix: &str) -> Self {
        Self::with_backups(host, kind, BackupStore::new(backup_suffix))
    }

    pub fn with_backups(host: &'h H, kind: TweakKind, backups: BackupStore) -> Self {
        info!("Starting {}", kind.label());
        Self {
            host,
            kind,
            backups,
            recorder: MutationRecorder::new(),
            attempted: 0,
            succeeded: 0,
        }
    }

    pub fn host(&self) -> &'h H {
        self.host
    }

    pub fn kind(&self) -> TweakKind {
        self.kind
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    fn finish(&mut self, outcome: StepOutcome) -> StepOutcome {
        self.attempted += 1;
        if outcome.ok {
            self.succeeded += 1;
        }
        outcome
    }

    /// Set a live parameter, recording its current value first
    ///
    /// If the current value cannot be read nothing is written.
    pub fn set_runtime_parameter(&mut self, name: &str, value: &str) -> StepOutcome {
        let kind = ParameterKind::classify(name);

        let prior = match self.host.read_parameter(name, &kind) {
            Ok(prior) => prior,
            Err(e) => {
                warn!("Skipping {}: current value unreadable: {}", name, e);
                return self.finish(StepOutcome::failure(None, e.to_string()));
            }
        };

        if prior == value {
            return self.finish(StepOutcome::success(false, Some(prior), "already set"));
        }

        self.recorder.record_original_value(name, &prior, kind.clone());
        let outcome = match self.host.write_parameter(name, &kind, value) {
            Ok(()) => {
                self.recorder
                    .record_action(format!("Set {} to {} (was {})", name, value, prior));
                StepOutcome::success(true, Some(prior), format!("set to {}", value))
            }
            Err(e) => {
                warn!("Failed to set {}: {}", name, e);
                StepOutcome::failure(Some(prior), e.to_string())
            }
        };
        self.finish(outcome)
    }

    /// Back up `path` if this operation has not yet, and register the backup
    fn backup(&mut self, path: &Path) -> Result<(), String> {
        match self.backups.ensure_backup(path) {
            Ok(Some(backup)) => {
                self.recorder.record_file_backup(path, &backup);
                Ok(())
            }
            Ok(None) => Err(format!("{} does not exist", path.display())),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Upsert `line` into the config file at `path`
    pub fn upsert_config_line(&mut self, path: &Path, matcher: &dyn LineMatcher, line: &str) -> StepOutcome {
        if let Err(reason) = self.backup(path) {
            warn!("Skipping edit of {}: {}", path.display(), reason);
            return self.finish(StepOutcome::failure(None, reason));
        }

        let outcome = match upsert_line(path, matcher, line) {
            Ok(edit) => {
                let prior = Some(edit.prior_lines.join("\n"));
                if edit.changed {
                    self.recorder
                        .record_action(format!("Set '{}' in {}", line, path.display()));
                    StepOutcome::success(true, prior, "updated")
                } else {
                    StepOutcome::success(false, prior, "already present")
                }
            }
            Err(e) => {
                warn!("{}", e);
                StepOutcome::failure(None, e.to_string())
            }
        };
        self.finish(outcome)
    }

    /// Rewrite lines of `path` through `rewrite`; see `config_edit::rewrite_lines`
    pub fn rewrite_config_lines<F>(&mut self, path: &Path, description: &str, rewrite: F) -> StepOutcome
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Err(reason) = self.backup(path) {
            warn!("Skipping edit of {}: {}", path.display(), reason);
            return self.finish(StepOutcome::failure(None, reason));
        }

        let outcome = match rewrite_lines(path, rewrite) {
            Ok(edit) => {
                let prior = Some(edit.prior_lines.join("\n"));
                if edit.changed {
                    self.recorder.record_action(format!(
                        "{} ({} line(s) in {})",
                        description,
                        edit.rewritten,
                        path.display()
                    ));
                    StepOutcome::success(true, prior, format!("{} line(s) rewritten", edit.rewritten))
                } else {
                    StepOutcome::success(false, prior, "nothing to change")
                }
            }
            Err(e) => {
                warn!("{}", e);
                StepOutcome::failure(None, e.to_string())
            }
        };
        self.finish(outcome)
    }

    pub fn disable_service(&mut self, service: &str) -> StepOutcome {
        let outcome = match self.host.disable_service(service) {
            Ok(()) => {
                self.recorder.record_disabled_service(service);
                self.recorder.record_action(format!("Disabled {}", service));
                StepOutcome::success(true, None, "disabled")
            }
            Err(e) => {
                warn!("Failed to disable {}: {}", service, e);
                StepOutcome::failure(None, e.to_string())
            }
        };
        self.finish(outcome)
    }

    /// Run a command whose effect is not reverted, logging `description` on success
    pub fn run_action(&mut self, command: &str, mode: CommandMode, description: &str) -> StepOutcome {
        let result = self.host.run(command, mode);
        let outcome = if result.ok {
            self.recorder.record_action(description);
            StepOutcome::success(true, None, result.first_line())
        } else {
            warn!("{} failed: {}", description, result.first_line());
            StepOutcome::failure(None, result.first_line())
        };
        self.finish(outcome)
    }

    /// Add an informational action without counting a step
    pub fn note(&mut self, text: &str) {
        self.recorder.record_action(text);
    }

    /// Seal the operation and append it to `journal`
    ///
    /// The entry is produced even when appending fails.
    pub fn commit(self, journal: &JournalStore) -> OperationReport {
        let entry = self.recorder.commit(self.kind);
        info!(
            "{} finished: {} of {} step(s) succeeded",
            self.kind.label(),
            self.succeeded,
            self.attempted
        );

        let persist_error = match journal.append(entry.clone()) {
            Ok(()) => None,
            Err(e) => {
                warn!("Could not record {} in journal: {}", self.kind, e);
                Some(e.to_string())
            }
        };

        OperationReport {
            entry,
            attempted: self.attempted,
            succeeded: self.succeeded,
            persist_error,
        }
    }
}

/// Run `recipe` inside a fresh session and commit it to `journal`
///
/// Backups that `journal` still references are reused, not overwritten.
pub fn apply_operation<H, F>(
    host: &H,
    journal: &JournalStore,
    kind: TweakKind,
    backup_suffix: &str,
    recipe: F,
) -> OperationReport
where
    H: SystemHost + ?Sized,
    F: FnOnce(&mut TweakSession<'_, H>),
{
    let backups = BackupStore::new(backup_suffix).holding(journal.referenced_backups());
    let mut session = TweakSession::with_backups(host, kind, backups);
    recipe(&mut session);
    session.commit(journal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup_store::DEFAULT_BACKUP_SUFFIX;
    use crate::config_edit::KeyMatcher;
    use crate::host::MemoryHost;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_set_runtime_parameter_records_prior() {
        let host = MemoryHost::new().with_parameter("vm.swappiness", "60");
        let mut session = TweakSession::new(&host, TweakKind::RamSwap, DEFAULT_BACKUP_SUFFIX);

        let outcome = session.set_runtime_parameter("vm.swappiness", "10");
        assert!(outcome.ok);
        assert_eq!(outcome.prior.as_deref(), Some("60"));
        assert_eq!(host.parameter("vm.swappiness").as_deref(), Some("10"));

        let dir = TempDir::new().unwrap();
        let report = session.commit(&JournalStore::new(dir.path().join("j.json")));
        assert_eq!(report.entry.original_values["vm.swappiness"], "60");
        assert_eq!((report.attempted, report.succeeded), (1, 1));
        assert!(report.ok());
    }

    #[test]
    fn test_unreadable_parameter_is_not_written() {
        let host = MemoryHost::new();
        let mut session = TweakSession::new(&host, TweakKind::Kernel, DEFAULT_BACKUP_SUFFIX);

        let outcome = session.set_runtime_parameter("kernel.numa_balancing", "1");
        assert!(!outcome.ok);
        assert!(host.parameter("kernel.numa_balancing").is_none());
        assert_eq!((session.attempted(), session.succeeded()), (1, 0));
    }

    #[test]
    fn test_failed_write_still_records_prior() {
        let host = MemoryHost::new()
            .with_parameter("cpu_governor", "powersave")
            .read_only("cpu_governor");
        let mut session = TweakSession::new(&host, TweakKind::Gaming, DEFAULT_BACKUP_SUFFIX);
        assert!(!session.set_runtime_parameter("cpu_governor", "performance").ok);

        let dir = TempDir::new().unwrap();
        let report = session.commit(&JournalStore::new(dir.path().join("j.json")));
        assert_eq!(report.entry.original_values["cpu_governor"], "powersave");
        assert_eq!(report.entry.parameter_kinds["cpu_governor"], ParameterKind::CpuGovernor);
        assert!(report.entry.actions.is_empty());
    }

    #[test]
    fn test_upsert_backs_up_once() {
        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("sysctl.conf");
        fs::write(&conf, "vm.dirty_ratio=20\n").unwrap();

        let host = MemoryHost::new();
        let mut session = TweakSession::new(&host, TweakKind::RamSwap, DEFAULT_BACKUP_SUFFIX);
        assert!(session
            .upsert_config_line(&conf, &KeyMatcher::new("vm.dirty_ratio"), "vm.dirty_ratio=10")
            .ok);
        assert!(session
            .upsert_config_line(
                &conf,
                &KeyMatcher::new("vm.dirty_background_ratio"),
                "vm.dirty_background_ratio=5"
            )
            .ok);

        let report = session.commit(&JournalStore::new(dir.path().join("j.json")));
        assert_eq!(report.entry.original_files.len(), 1);
        let backup = &report.entry.original_files[&conf.display().to_string()];
        assert_eq!(fs::read_to_string(backup).unwrap(), "vm.dirty_ratio=20\n");
        assert_eq!(
            fs::read_to_string(&conf).unwrap(),
            "vm.dirty_ratio=10\nvm.dirty_background_ratio=5\n"
        );
    }

    #[test]
    fn test_missing_config_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let absent = dir.path().join("lvm.conf");
        let host = MemoryHost::new();
        let mut session = TweakSession::new(&host, TweakKind::Storage, DEFAULT_BACKUP_SUFFIX);

        let outcome = session.upsert_config_line(&absent, &KeyMatcher::new("a"), "a=1");
        assert!(!outcome.ok);
        assert!(!absent.exists());
    }

    #[test]
    fn test_apply_operation_commits_partial_success() {
        let dir = TempDir::new().unwrap();
        let journal = JournalStore::new(dir.path().join("j.json"));
        let host = MemoryHost::new()
            .with_service("cups.service", true)
            .failing("systemctl disable saned");

        let report = apply_operation(&host, &journal, TweakKind::Boot, DEFAULT_BACKUP_SUFFIX, |s| {
            s.disable_service("cups.service");
            s.disable_service("saned.service");
            s.run_action("systemctl enable fstrim.timer", CommandMode::Direct, "Enabled fstrim.timer");
            s.note("Boot tuning complete");
        });

        assert_eq!((report.attempted, report.succeeded), (3, 2));
        assert!(!report.ok());
        assert_eq!(report.entry.disabled_services, vec!["cups.service"]);
        assert_eq!(
            report.entry.actions,
            vec!["Disabled cups.service", "Enabled fstrim.timer", "Boot tuning complete"]
        );
        assert_eq!(journal.list_all().len(), 1);
    }
}
