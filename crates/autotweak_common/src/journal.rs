//! Journal Store
//!
//! Durable ordered list of applied operations, kept as one JSON array.
//! Insertion order is chronological order. Entries are only ever appended
//! or removed wholesale by a revert.

use crate::parameter::ParameterKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default journal location
pub const DEFAULT_JOURNAL_PATH: &str = "/var/log/autotweak/autotweak_changes.json";

/// The logical operation a journal entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TweakKind {
    Cleanup,
    RamSwap,
    Boot,
    Kernel,
    Storage,
    Gaming,
}

impl TweakKind {
    /// Every kind, in the order `apply all` runs them
    pub const ALL: [TweakKind; 6] = [
        TweakKind::Cleanup,
        TweakKind::RamSwap,
        TweakKind::Boot,
        TweakKind::Kernel,
        TweakKind::Storage,
        TweakKind::Gaming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TweakKind::Cleanup => "cleanup",
            TweakKind::RamSwap => "ram_swap",
            TweakKind::Boot => "boot",
            TweakKind::Kernel => "kernel",
            TweakKind::Storage => "storage",
            TweakKind::Gaming => "gaming",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            TweakKind::Cleanup => "System cleanup",
            TweakKind::RamSwap => "RAM/Swap tuning",
            TweakKind::Boot => "Boot optimization",
            TweakKind::Kernel => "Kernel tuning",
            TweakKind::Storage => "Storage optimization",
            TweakKind::Gaming => "Gaming tuning",
        }
    }
}

impl fmt::Display for TweakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tweak kind '{0}' (expected one of cleanup, ram_swap, boot, kernel, storage, gaming)")]
pub struct UnknownTweakKind(pub String);

impl FromStr for TweakKind {
    type Err = UnknownTweakKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        TweakKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownTweakKind(s.to_string()))
    }
}

/// One operation's undo record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(rename = "type")]
    pub kind: TweakKind,
    pub timestamp: String,
    #[serde(default)]
    pub actions: Vec<String>,
    /// Parameter name -> value before the operation
    #[serde(default)]
    pub original_values: BTreeMap<String, String>,
    /// Config file path -> backup path
    #[serde(default)]
    pub original_files: BTreeMap<String, String>,
    #[serde(default)]
    pub disabled_services: Vec<String>,
    /// Control surface of each entry in `original_values`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameter_kinds: BTreeMap<String, ParameterKind>,
}

impl JournalEntry {
    pub fn new(kind: TweakKind, timestamp: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: timestamp.into(),
            actions: Vec::new(),
            original_values: BTreeMap::new(),
            original_files: BTreeMap::new(),
            disabled_services: Vec::new(),
            parameter_kinds: BTreeMap::new(),
        }
    }

    /// Stored kind for `name`, classified from the name for entries without one
    pub fn kind_of(&self, name: &str) -> ParameterKind {
        self.parameter_kinds
            .get(name)
            .cloned()
            .unwrap_or_else(|| ParameterKind::classify(name))
    }

    /// Whether reverting this entry would do nothing
    pub fn is_noop(&self) -> bool {
        self.original_values.is_empty() && self.original_files.is_empty() && self.disabled_services.is_empty()
    }
}

/// One row of the history listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSummary {
    /// 1-based position in the journal
    pub index: usize,
    pub timestamp: String,
    pub kind: TweakKind,
    pub action_count: usize,
}

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("journal I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialize journal: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What was found on disk
enum Loaded {
    Absent,
    Entries(Vec<JournalEntry>),
    /// Present but not a journal
    Corrupt(String),
    /// Present but could not be read
    Unreadable(io::Error),
}

/// File-backed journal
#[derive(Debug, Clone)]
pub struct JournalStore {
    path: PathBuf,
}

impl JournalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Loaded {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Loaded::Absent,
            Err(e) => return Loaded::Unreadable(e),
        };

        if content.trim().is_empty() {
            return Loaded::Entries(Vec::new());
        }

        match serde_json::from_str(&content) {
            Ok(entries) => Loaded::Entries(entries),
            Err(e) => Loaded::Corrupt(e.to_string()),
        }
    }

    /// Every entry, oldest first; absent or corrupt journals read as empty
    pub fn list_all(&self) -> Vec<JournalEntry> {
        match self.load() {
            Loaded::Absent => Vec::new(),
            Loaded::Entries(entries) => entries,
            Loaded::Corrupt(reason) => {
                warn!("Journal {} is corrupt, treating as empty: {}", self.path.display(), reason);
                Vec::new()
            }
            Loaded::Unreadable(e) => {
                warn!("Journal {} unreadable, treating as empty: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Append `entry` after every existing entry
    pub fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        let mut entries = match self.load() {
            Loaded::Absent => Vec::new(),
            Loaded::Entries(entries) => entries,
            Loaded::Unreadable(e) => return Err(self.io_error(e)),
            Loaded::Corrupt(reason) => {
                let moved = self.quarantine()?;
                warn!(
                    "Journal {} corrupt ({}), moved aside to {}",
                    self.path.display(),
                    reason,
                    moved.display()
                );
                Vec::new()
            }
        };

        info!("Journal: recording {} ({} action(s))", entry.kind, entry.actions.len());
        entries.push(entry);
        self.write(&entries)
    }

    /// Remove every entry for which `predicate(index, entry)` holds
    ///
    /// Survivors keep their relative order. Returns the removed entries.
    pub fn remove<F>(&self, mut predicate: F) -> Result<Vec<JournalEntry>, JournalError>
    where
        F: FnMut(usize, &JournalEntry) -> bool,
    {
        let entries = match self.load() {
            Loaded::Entries(entries) => entries,
            Loaded::Absent | Loaded::Corrupt(_) => Vec::new(),
            Loaded::Unreadable(e) => return Err(self.io_error(e)),
        };
        let (removed, kept): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .enumerate()
            .partition(|(index, entry)| predicate(*index, entry));

        if removed.is_empty() {
            return Ok(Vec::new());
        }

        let kept: Vec<JournalEntry> = kept.into_iter().map(|(_, entry)| entry).collect();
        self.write(&kept)?;
        debug!("Journal: removed {} entr(ies), {} left", removed.len(), kept.len());
        Ok(removed.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Backup files that entries still in the journal restore from
    pub fn referenced_backups(&self) -> BTreeSet<PathBuf> {
        self.list_all()
            .into_iter()
            .flat_map(|entry| entry.original_files.into_values())
            .map(PathBuf::from)
            .collect()
    }

    pub fn summaries(&self) -> Vec<JournalSummary> {
        self.list_all()
            .iter()
            .enumerate()
            .map(|(i, entry)| JournalSummary {
                index: i + 1,
                timestamp: entry.timestamp.clone(),
                kind: entry.kind,
                action_count: entry.actions.len(),
            })
            .collect()
    }

    fn io_error(&self, source: io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Move an unreadable journal out of the way instead of overwriting it
    fn quarantine(&self) -> Result<PathBuf, JournalError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut raw = self.path.as_os_str().to_os_string();
        raw.push(format!(".corrupt-{}", secs));
        let target = PathBuf::from(raw);
        fs::rename(&self.path, &target).map_err(|e| self.io_error(e))?;
        Ok(target)
    }

    /// Temp file in the same directory, fsync, then rename over the journal
    fn write(&self, entries: &[JournalEntry]) -> Result<(), JournalError> {
        let json = serde_json::to_string_pretty(entries)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let result = (|| -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_error(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(kind: TweakKind, actions: usize) -> JournalEntry {
        let mut e = JournalEntry::new(kind, "2024-01-01 12:00:00");
        e.actions = (0..actions).map(|i| format!("action {}", i)).collect();
        e
    }

    #[test]
    fn test_tweak_kind_parse() {
        assert_eq!("ram_swap".parse::<TweakKind>().unwrap(), TweakKind::RamSwap);
        assert_eq!("ram-swap".parse::<TweakKind>().unwrap(), TweakKind::RamSwap);
        assert_eq!("Gaming".parse::<TweakKind>().unwrap(), TweakKind::Gaming);
        assert!("turbo".parse::<TweakKind>().is_err());
    }

    #[test]
    fn test_absent_journal_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::new(dir.path().join("journal.json"));
        assert!(store.list_all().is_empty());
        assert!(store.summaries().is_empty());
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::new(dir.path().join("nested/journal.json"));
        store.append(entry(TweakKind::Kernel, 2)).unwrap();
        store.append(entry(TweakKind::Boot, 0)).unwrap();
        store.append(entry(TweakKind::Gaming, 1)).unwrap();

        let kinds: Vec<TweakKind> = store.list_all().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![TweakKind::Kernel, TweakKind::Boot, TweakKind::Gaming]);

        let summaries = store.summaries();
        assert_eq!(summaries[0].index, 1);
        assert_eq!(summaries[0].action_count, 2);
        assert_eq!(summaries[2].kind, TweakKind::Gaming);
        assert!(!dir.path().join("nested/journal.json.tmp").exists());
    }

    #[test]
    fn test_persisted_layout_uses_type_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.json");
        let store = JournalStore::new(&path);
        let mut e = entry(TweakKind::RamSwap, 1);
        e.original_values.insert("vm.swappiness".to_string(), "60".to_string());
        store.append(e).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let first = &raw[0];
        assert_eq!(first["type"], "ram_swap");
        assert_eq!(first["original_values"]["vm.swappiness"], "60");
        assert!(first["disabled_services"].as_array().unwrap().is_empty());
        assert!(first.get("parameter_kinds").is_none());
    }

    #[test]
    fn test_reads_entries_without_optional_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.json");
        fs::write(
            &path,
            r#"[{"type":"kernel","timestamp":"2023-05-01 10:00:00","actions":["x"],
                "original_values":{"sda_scheduler":"mq-deadline"}}]"#,
        )
        .unwrap();

        let entries = JournalStore::new(&path).list_all();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].original_files.is_empty());
        assert_eq!(
            entries[0].kind_of("sda_scheduler"),
            ParameterKind::DiskScheduler {
                disk: "sda".to_string()
            }
        );
    }

    #[test]
    fn test_corrupt_journal_reads_empty_and_is_quarantined_on_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JournalStore::new(&path);

        assert!(store.list_all().is_empty());
        store.append(entry(TweakKind::Cleanup, 1)).unwrap();
        assert_eq!(store.list_all().len(), 1);

        let quarantined: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("journal.json.corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(fs::read_to_string(quarantined[0].path()).unwrap(), "{ not json");
    }

    #[test]
    fn test_unreadable_journal_is_left_in_place() {
        let dir = TempDir::new().unwrap();
        // A directory where the journal should be fails to read without being corrupt
        let path = dir.path().join("journal.json");
        fs::create_dir(&path).unwrap();
        let store = JournalStore::new(&path);

        assert!(store.list_all().is_empty());
        let err = store.append(entry(TweakKind::Cleanup, 1)).unwrap_err();
        assert!(matches!(err, JournalError::Io { .. }));
        assert!(store.remove(|_, _| true).is_err());

        assert!(path.is_dir());
        let moved = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(!moved);
    }

    #[test]
    fn test_referenced_backups() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::new(dir.path().join("journal.json"));
        let mut first = entry(TweakKind::RamSwap, 1);
        first
            .original_files
            .insert("/etc/sysctl.conf".to_string(), "/etc/sysctl.conf.autotweak.bak".to_string());
        let mut second = entry(TweakKind::Storage, 1);
        second
            .original_files
            .insert("/etc/fstab".to_string(), "/etc/fstab.autotweak.bak".to_string());
        store.append(first).unwrap();
        store.append(second).unwrap();
        store.append(entry(TweakKind::Cleanup, 1)).unwrap();

        let held = store.referenced_backups();
        assert_eq!(held.len(), 2);
        assert!(held.contains(&PathBuf::from("/etc/fstab.autotweak.bak")));
    }

    #[test]
    fn test_remove_keeps_relative_order() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::new(dir.path().join("journal.json"));
        for kind in [TweakKind::Cleanup, TweakKind::Boot, TweakKind::Kernel, TweakKind::Storage] {
            store.append(entry(kind, 0)).unwrap();
        }

        let removed = store.remove(|i, _| i == 1).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].kind, TweakKind::Boot);

        let kinds: Vec<TweakKind> = store.list_all().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![TweakKind::Cleanup, TweakKind::Kernel, TweakKind::Storage]);
    }

    #[test]
    fn test_remove_nothing_does_not_touch_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.json");
        let store = JournalStore::new(&path);
        assert!(store.remove(|_, _| true).unwrap().is_empty());
        assert!(!path.exists());
    }
}
