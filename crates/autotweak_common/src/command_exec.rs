//! Command Runner
//!
//! Single command execution layer that:
//! - Executes an external program, directly or through `sh -c`
//! - Captures exit code, stdout, stderr and duration
//! - Returns a structured result, never an error
//!
//! Pipes, redirection and globbing only work in `CommandMode::Shell`.
//! `CommandMode::Direct` splits on whitespace and runs the program as-is.

use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Maximum output length to capture per stream
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// How a command line is handed to the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// Split on whitespace, no interpreter
    Direct,
    /// Route through `sh -c`
    Shell,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Command ran successfully (exit code 0)
    Success,
    /// Command ran but returned non-zero exit code
    NonZeroExit,
    /// Program not found on system
    CommandNotFound,
    /// Permission denied while spawning
    PermissionDenied,
    /// Other OS error while spawning
    OsError,
    /// Nothing to run
    EmptyCommand,
}

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Full command that was executed
    pub command: String,
    /// Whether the command exited with status 0
    pub ok: bool,
    /// stdout on success, stderr on failure
    pub output: String,
    /// Raw stdout (truncated if too long)
    pub stdout: String,
    /// Raw stderr (truncated if too long)
    pub stderr: String,
    /// Exit code, if the process ran and was not killed by a signal
    pub exit_code: Option<i32>,
    /// Execution duration
    pub duration_ms: u64,
    pub status: ExecutionStatus,
}

impl CommandResult {
    /// First line of `output`, trimmed
    pub fn first_line(&self) -> &str {
        self.output.lines().next().unwrap_or("").trim()
    }

    fn spawn_failure(command: &str, status: ExecutionStatus, message: String, start: Instant) -> Self {
        Self {
            command: command.to_string(),
            ok: false,
            output: message.clone(),
            stdout: String::new(),
            stderr: message,
            exit_code: None,
            duration_ms: start.elapsed().as_millis() as u64,
            status,
        }
    }
}

/// Run a command line in the given mode
pub fn run_command(command: &str, mode: CommandMode) -> CommandResult {
    match mode {
        CommandMode::Shell => {
            info!("Running: {}", command);
            execute(command, Command::new("sh").arg("-c").arg(command))
        }
        CommandMode::Direct => {
            let mut parts = command.split_whitespace();
            match parts.next() {
                Some(program) => {
                    let args: Vec<&str> = parts.collect();
                    run_program(program, &args)
                }
                None => CommandResult::spawn_failure(
                    command,
                    ExecutionStatus::EmptyCommand,
                    "empty command".to_string(),
                    Instant::now(),
                ),
            }
        }
    }
}

/// Run a program with an explicit argument vector
pub fn run_program(program: &str, args: &[&str]) -> CommandResult {
    let command_line = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };
    info!("Running: {}", command_line);
    execute(&command_line, Command::new(program).args(args))
}

fn execute(command_line: &str, command: &mut Command) -> CommandResult {
    let start = Instant::now();
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            let status = match e.kind() {
                std::io::ErrorKind::NotFound => ExecutionStatus::CommandNotFound,
                std::io::ErrorKind::PermissionDenied => ExecutionStatus::PermissionDenied,
                _ => ExecutionStatus::OsError,
            };
            warn!("Failed to spawn {}: {}", command_line, e);
            return CommandResult::spawn_failure(command_line, status, format!("OS error: {}", e), start);
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout = truncate_output(&output.stdout);
    let stderr = truncate_output(&output.stderr);
    let exit_code = output.status.code();
    let ok = output.status.success();

    let (status, text) = if ok {
        debug!("Command succeeded: {} ({}ms)", command_line, duration_ms);
        (ExecutionStatus::Success, stdout.clone())
    } else {
        warn!("Command failed: {}: {}", command_line, stderr.trim());
        let text = if stderr.trim().is_empty() {
            match exit_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            stderr.clone()
        };
        (ExecutionStatus::NonZeroExit, text)
    };

    CommandResult {
        command: command_line.to_string(),
        ok,
        output: text,
        stdout,
        stderr,
        exit_code,
        duration_ms,
        status,
    }
}

/// Convert captured bytes to a string, capped at MAX_OUTPUT_BYTES
fn truncate_output(bytes: &[u8]) -> String {
    let slice = if bytes.len() > MAX_OUTPUT_BYTES {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };
    String::from_utf8_lossy(slice).to_string()
}
