//! Shared engine for AutoTweak components.
//!
//! Applies reversible system tunings: every live parameter write, config
//! file edit and service change goes through a session that records the
//! prior state, and the journal replays that record on revert.

pub mod backup_store;
pub mod command_exec;
pub mod config;
pub mod config_edit;
pub mod host;
pub mod journal;
pub mod logging;
pub mod parameter;
pub mod recorder;
pub mod revert;
pub mod session;

pub use backup_store::{backup_path_for, BackupError, BackupStore, DEFAULT_BACKUP_SUFFIX};
pub use command_exec::{run_command, run_program, CommandMode, CommandResult, ExecutionStatus};
pub use config::{AutoTweakConfig, ConfigError};
pub use config_edit::{rewrite_lines, upsert_line, ConfigEditError, KeyMatcher, LineMatcher};
pub use host::{BlockDevice, HostError, LiveHost, MemoryHost, SystemHost};
pub use journal::{JournalEntry, JournalError, JournalStore, JournalSummary, TweakKind, UnknownTweakKind};
pub use parameter::ParameterKind;
pub use recorder::MutationRecorder;
pub use revert::{EntryRevert, RevertEngine, RevertError, RevertReport, RevertSelection, RevertStep, StepKind};
pub use session::{apply_operation, OperationReport, StepOutcome, TweakSession};
