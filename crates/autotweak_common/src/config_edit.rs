//! Config-File Line Editor
//!
//! Idempotent line-level edits of text config files:
//! - Upsert: replace matching live lines in place, else append
//! - Rewrite: per-line transformation for structured lines (fstab, lvm.conf)
//!
//! Comment lines (`#` or `;` after leading whitespace) never match, so a
//! commented-out default is never overwritten as live config.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from reading or writing a config file
#[derive(Error, Debug)]
pub enum ConfigEditError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Predicate deciding whether a raw config line is the one to replace
pub trait LineMatcher {
    fn matches(&self, line: &str) -> bool;
}

impl<F> LineMatcher for F
where
    F: Fn(&str) -> bool,
{
    fn matches(&self, line: &str) -> bool {
        self(line)
    }
}

/// Matches `key`, `key=...`, `key = ...`, `key: ...` and `key value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatcher {
    key: String,
}

impl KeyMatcher {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl LineMatcher for KeyMatcher {
    fn matches(&self, line: &str) -> bool {
        match line.trim_start().strip_prefix(self.key.as_str()) {
            Some(rest) => match rest.chars().next() {
                None => true,
                Some(c) => c == '=' || c == ':' || c.is_whitespace(),
            },
            None => false,
        }
    }
}

/// Whether a line is a comment
pub fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') || trimmed.starts_with(';')
}

/// Result of the pure upsert transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub content: String,
    /// Number of live lines replaced
    pub replaced: usize,
    /// Whether the line was appended because nothing matched
    pub appended: bool,
}

/// Outcome of an upsert against a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Every line of the file before the edit
    pub prior_lines: Vec<String>,
    /// Whether the file content changed
    pub changed: bool,
    pub replaced: usize,
    pub appended: bool,
}

/// Outcome of a per-line rewrite against a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub prior_lines: Vec<String>,
    pub changed: bool,
    /// Number of lines the rewrite function replaced with different text
    pub rewritten: usize,
}

/// Split a raw line into body and terminator (`\n`, `\r\n` or nothing)
fn split_terminator(raw: &str) -> (&str, &str) {
    let body = raw.strip_suffix('\n').unwrap_or(raw);
    let body = body.strip_suffix('\r').unwrap_or(body);
    (body, &raw[body.len()..])
}

/// Replace every live line matching `matcher` with `new_line`, or append it
pub fn upsert_content(content: &str, matcher: &dyn LineMatcher, new_line: &str) -> Upserted {
    let mut out = String::with_capacity(content.len() + new_line.len() + 2);
    let mut replaced = 0;

    for raw in content.split_inclusive('\n') {
        let (body, terminator) = split_terminator(raw);
        if !is_comment(body) && matcher.matches(body) {
            out.push_str(new_line);
            out.push_str(terminator);
            replaced += 1;
        } else {
            out.push_str(raw);
        }
    }

    let appended = replaced == 0;
    if appended {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(new_line);
        out.push('\n');
    }

    Upserted {
        content: out,
        replaced,
        appended,
    }
}

/// Upsert `new_line` into the file at `path`
///
/// The file is only written when its content actually changes, so a
/// second call with the same arguments is a no-op.
pub fn upsert_line(
    path: &Path,
    matcher: &dyn LineMatcher,
    new_line: &str,
) -> Result<UpsertOutcome, ConfigEditError> {
    if is_comment(new_line) || !matcher.matches(new_line) {
        warn!(
            "Line '{}' does not satisfy its own matcher; repeated upserts will append again",
            new_line
        );
    }

    let content = read_config(path)?;
    let upserted = upsert_content(&content, matcher, new_line);
    let changed = upserted.content != content;

    if changed {
        write_config(path, &upserted.content)?;
        debug!(
            "Upserted '{}' into {} (replaced {}, appended {})",
            new_line,
            path.display(),
            upserted.replaced,
            upserted.appended
        );
    }

    Ok(UpsertOutcome {
        prior_lines: content.lines().map(str::to_string).collect(),
        changed,
        replaced: upserted.replaced,
        appended: upserted.appended,
    })
}

/// Apply `rewrite` to every line of the file at `path`
///
/// Returning `Some(text)` replaces the line body; the terminator is kept.
pub fn rewrite_lines<F>(path: &Path, mut rewrite: F) -> Result<RewriteOutcome, ConfigEditError>
where
    F: FnMut(&str) -> Option<String>,
{
    let content = read_config(path)?;
    let mut out = String::with_capacity(content.len());
    let mut rewritten = 0;

    for raw in content.split_inclusive('\n') {
        let (body, terminator) = split_terminator(raw);
        match rewrite(body) {
            Some(new_body) if new_body != body => {
                out.push_str(&new_body);
                out.push_str(terminator);
                rewritten += 1;
            }
            _ => out.push_str(raw),
        }
    }

    let changed = out != content;
    if changed {
        write_config(path, &out)?;
        debug!("Rewrote {} line(s) in {}", rewritten, path.display());
    }

    Ok(RewriteOutcome {
        prior_lines: content.lines().map(str::to_string).collect(),
        changed,
        rewritten,
    })
}

fn read_config(path: &Path) -> Result<String, ConfigEditError> {
    fs::read_to_string(path).map_err(|source| ConfigEditError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn write_config(path: &Path, content: &str) -> Result<(), ConfigEditError> {
    // Truncate in place so ownership and mode of /etc files are kept
    fs::write(path, content).map_err(|source| ConfigEditError::Unwritable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(k: &str) -> KeyMatcher {
        KeyMatcher::new(k)
    }

    #[test]
    fn test_key_matcher_boundaries() {
        let m = key("vm.dirty_ratio");
        assert!(m.matches("vm.dirty_ratio=20"));
        assert!(m.matches("vm.dirty_ratio = 20"));
        assert!(m.matches("  vm.dirty_ratio\t20"));
        assert!(m.matches("vm.dirty_ratio"));
        assert!(!m.matches("vm.dirty_ratio_extra=1"));
        assert!(!m.matches("vm.dirty_background_ratio=5"));
    }

    #[test]
    fn test_replace_in_place() {
        let out = upsert_content("vm.dirty_ratio=20\n", &key("vm.dirty_ratio"), "vm.dirty_ratio=10");
        assert_eq!(out.content, "vm.dirty_ratio=10\n");
        assert_eq!(out.replaced, 1);
        assert!(!out.appended);
    }

    #[test]
    fn test_append_when_missing() {
        let out = upsert_content("fs.file-max=100\n", &key("vm.dirty_ratio"), "vm.dirty_ratio=10");
        assert_eq!(out.content, "fs.file-max=100\nvm.dirty_ratio=10\n");
        assert!(out.appended);
    }

    #[test]
    fn test_append_adds_missing_newline() {
        let out = upsert_content("a=1", &key("b"), "b=2");
        assert_eq!(out.content, "a=1\nb=2\n");
    }

    #[test]
    fn test_append_to_empty_content() {
        let out = upsert_content("", &key("b"), "b=2");
        assert_eq!(out.content, "b=2\n");
    }

    #[test]
    fn test_comment_never_replaced() {
        let content = "# vm.swappiness=60\n#vm.swappiness=30\n";
        let out = upsert_content(content, &key("vm.swappiness"), "vm.swappiness=10");
        assert_eq!(
            out.content,
            "# vm.swappiness=60\n#vm.swappiness=30\nvm.swappiness=10\n"
        );
    }

    #[test]
    fn test_comment_ignored_even_for_closure_matcher() {
        let contains = |line: &str| line.contains("vm.swappiness");
        let out = upsert_content("#vm.swappiness=60\nvm.swappiness=60\n", &contains, "vm.swappiness=10");
        assert_eq!(out.content, "#vm.swappiness=60\nvm.swappiness=10\n");
    }

    #[test]
    fn test_preserves_other_lines_and_order() {
        let content = "a=1\r\n\nvm.swappiness=60\n  # note\nz=9";
        let out = upsert_content(content, &key("vm.swappiness"), "vm.swappiness=10");
        assert_eq!(out.content, "a=1\r\n\nvm.swappiness=10\n  # note\nz=9");
    }

    #[test]
    fn test_replaces_every_live_match() {
        let content = "k=1\nother\nk=2\n";
        let out = upsert_content(content, &key("k"), "k=3");
        assert_eq!(out.content, "k=3\nother\nk=3\n");
        assert_eq!(out.replaced, 2);
    }

    #[test]
    fn test_upsert_line_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sysctl.conf");
        fs::write(&path, "kernel.pid_max=4194304\n").unwrap();

        let first = upsert_line(&path, &key("vm.dirty_ratio"), "vm.dirty_ratio=10").unwrap();
        assert!(first.changed);
        assert_eq!(first.prior_lines, vec!["kernel.pid_max=4194304".to_string()]);
        let after_first = fs::read_to_string(&path).unwrap();

        let second = upsert_line(&path, &key("vm.dirty_ratio"), "vm.dirty_ratio=10").unwrap();
        assert!(!second.changed);
        assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
        assert_eq!(after_first, "kernel.pid_max=4194304\nvm.dirty_ratio=10\n");
    }

    #[test]
    fn test_upsert_line_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.conf");
        let err = upsert_line(&path, &key("a"), "a=1").unwrap_err();
        assert!(matches!(err, ConfigEditError::Unreadable { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_rewrite_lines_keeps_terminators() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lvm.conf");
        fs::write(&path, "devices {\n\tissue_discards = 0\n}\n").unwrap();

        let outcome = rewrite_lines(&path, |line| {
            key("issue_discards")
                .matches(line)
                .then(|| "\tissue_discards = 1".to_string())
        })
        .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.rewritten, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "devices {\n\tissue_discards = 1\n}\n"
        );
        assert_eq!(outcome.prior_lines[1], "\tissue_discards = 0");
    }

    #[test]
    fn test_rewrite_lines_noop_does_not_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.conf");
        fs::write(&path, "same\n").unwrap();
        let outcome = rewrite_lines(&path, |line| Some(line.to_string())).unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.rewritten, 0);
    }
}
