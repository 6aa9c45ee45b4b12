//! Mutation Recorder
//!
//! Accumulates what one logical operation did and what it needs to undo.
//! `commit` always yields an entry, even when nothing was recorded.

use crate::journal::{JournalEntry, TweakKind};
use crate::parameter::ParameterKind;
use chrono::Local;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Timestamp layout used in the journal
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default)]
pub struct MutationRecorder {
    actions: Vec<String>,
    original_values: BTreeMap<String, String>,
    parameter_kinds: BTreeMap<String, ParameterKind>,
    original_files: BTreeMap<String, String>,
    disabled_services: Vec<String>,
}

impl MutationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_action(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("Action: {}", text);
        self.actions.push(text);
    }

    /// Record the value `name` had before this operation
    ///
    /// Returns false if a value was already recorded; the first one is kept.
    pub fn record_original_value(&mut self, name: &str, value: &str, kind: ParameterKind) -> bool {
        if self.original_values.contains_key(name) {
            return false;
        }
        self.original_values.insert(name.to_string(), value.to_string());
        self.parameter_kinds.insert(name.to_string(), kind);
        true
    }

    pub fn record_file_backup(&mut self, path: &Path, backup: &Path) {
        self.original_files
            .entry(path.display().to_string())
            .or_insert_with(|| backup.display().to_string());
    }

    pub fn record_disabled_service(&mut self, service: &str) {
        if !self.disabled_services.iter().any(|s| s == service) {
            self.disabled_services.push(service.to_string());
        }
    }

    /// Seal everything recorded into a journal entry stamped with local time
    pub fn commit(self, kind: TweakKind) -> JournalEntry {
        JournalEntry {
            kind,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            actions: self.actions,
            original_values: self.original_values,
            original_files: self.original_files,
            disabled_services: self.disabled_services,
            parameter_kinds: self.parameter_kinds,
        }
    }
}
