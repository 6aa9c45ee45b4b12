//! Revert Engine
//!
//! Replays journal entries backwards: files are restored from their
//! backups, then live parameters get their original values, then disabled
//! services are re-enabled. A failed step is logged and reported but never
//! stops the remaining steps. Processed entries always leave the journal.

use crate::backup_store::restore_backup;
use crate::host::SystemHost;
use crate::journal::{JournalEntry, JournalStore, TweakKind};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Which journal entries to revert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertSelection {
    All,
    /// Zero-based journal position
    Index(usize),
}

impl RevertSelection {
    /// Parse `all` or a 1-based entry number
    pub fn parse(s: &str) -> Result<Self, RevertError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(RevertSelection::All);
        }
        match s.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(RevertSelection::Index(n - 1)),
            _ => Err(RevertError::Unparseable(s.to_string())),
        }
    }
}

impl FromStr for RevertSelection {
    type Err = RevertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Error, Debug)]
pub enum RevertError {
    #[error("no changes to revert")]
    NothingToRevert,

    #[error("entry {index} does not exist (journal has {len} entr(ies))")]
    InvalidSelection { index: usize, len: usize },

    #[error("invalid selection '{0}': expected 'all' or an entry number")]
    Unparseable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    RestoreFile,
    RestoreParameter,
    EnableService,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::RestoreFile => "restore file",
            StepKind::RestoreParameter => "restore parameter",
            StepKind::EnableService => "enable service",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertStep {
    pub kind: StepKind,
    pub target: String,
    pub ok: bool,
    pub detail: String,
}

/// Steps taken for one journal entry
#[derive(Debug, Clone)]
pub struct EntryRevert {
    /// 1-based position the entry had in the journal
    pub index: usize,
    pub kind: TweakKind,
    pub timestamp: String,
    pub steps: Vec<RevertStep>,
}

impl EntryRevert {
    pub fn ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RevertReport {
    /// In processing order
    pub entries: Vec<EntryRevert>,
    /// Set when the reverted entries could not be removed from the journal
    pub journal_error: Option<String>,
}

impl RevertReport {
    pub fn ok(&self) -> bool {
        self.journal_error.is_none() && self.entries.iter().all(EntryRevert::ok)
    }

    pub fn steps_total(&self) -> usize {
        self.entries.iter().map(|e| e.steps.len()).sum()
    }

    pub fn steps_succeeded(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|e| e.steps.iter())
            .filter(|s| s.ok)
            .count()
    }
}

pub struct RevertEngine<'a, H: SystemHost + ?Sized> {
    host: &'a H,
    journal: &'a JournalStore,
}

impl<'a, H: SystemHost + ?Sized> RevertEngine<'a, H> {
    pub fn new(host: &'a H, journal: &'a JournalStore) -> Self {
        Self { host, journal }
    }

    /// Revert the selected entries and drop them from the journal
    ///
    /// `All` walks the journal newest-first so stacked changes to the same
    /// parameter unwind to the oldest recorded value.
    pub fn revert(&self, selection: RevertSelection) -> Result<RevertReport, RevertError> {
        let entries = self.journal.list_all();
        if entries.is_empty() {
            return Err(RevertError::NothingToRevert);
        }

        let order: Vec<usize> = match selection {
            RevertSelection::All => (0..entries.len()).rev().collect(),
            RevertSelection::Index(i) if i < entries.len() => vec![i],
            RevertSelection::Index(i) => {
                return Err(RevertError::InvalidSelection {
                    index: i + 1,
                    len: entries.len(),
                })
            }
        };

        let mut report = RevertReport::default();
        for &i in &order {
            let entry = &entries[i];
            info!("Reverting entry {} ({}, {})", i + 1, entry.kind, entry.timestamp);
            report.entries.push(EntryRevert {
                index: i + 1,
                kind: entry.kind,
                timestamp: entry.timestamp.clone(),
                steps: self.revert_entry(entry),
            });
        }

        match self.journal.remove(|i, _| order.contains(&i)) {
            Ok(removed) => info!("Removed {} reverted entr(ies) from journal", removed.len()),
            Err(e) => {
                warn!("Reverted entries could not be removed from journal: {}", e);
                report.journal_error = Some(e.to_string());
            }
        }

        Ok(report)
    }

    /// Restore one entry's recorded state without touching the journal
    pub fn revert_entry(&self, entry: &JournalEntry) -> Vec<RevertStep> {
        let mut steps = Vec::new();

        for (path, backup) in &entry.original_files {
            let step = match restore_backup(Path::new(backup), Path::new(path)) {
                Ok(()) => RevertStep {
                    kind: StepKind::RestoreFile,
                    target: path.clone(),
                    ok: true,
                    detail: format!("restored from {}", backup),
                },
                Err(e) => {
                    warn!("Skipping restore of {}: {}", path, e);
                    RevertStep {
                        kind: StepKind::RestoreFile,
                        target: path.clone(),
                        ok: false,
                        detail: e.to_string(),
                    }
                }
            };
            steps.push(step);
        }

        for (name, value) in &entry.original_values {
            let kind = entry.kind_of(name);
            let step = match self.host.write_parameter(name, &kind, value) {
                Ok(()) => {
                    info!("Restored {} ({}) = {}", name, kind.as_str(), value);
                    RevertStep {
                        kind: StepKind::RestoreParameter,
                        target: name.clone(),
                        ok: true,
                        detail: format!("set to {}", value),
                    }
                }
                Err(e) => {
                    warn!("Could not restore {}: {}", name, e);
                    RevertStep {
                        kind: StepKind::RestoreParameter,
                        target: name.clone(),
                        ok: false,
                        detail: e.to_string(),
                    }
                }
            };
            steps.push(step);
        }

        for service in &entry.disabled_services {
            let step = match self.host.enable_service(service) {
                Ok(()) => RevertStep {
                    kind: StepKind::EnableService,
                    target: service.clone(),
                    ok: true,
                    detail: "enabled".to_string(),
                },
                Err(e) => {
                    warn!("Could not re-enable {}: {}", service, e);
                    RevertStep {
                        kind: StepKind::EnableService,
                        target: service.clone(),
                        ok: false,
                        detail: e.to_string(),
                    }
                }
            };
            steps.push(step);
        }

        steps
    }
}
