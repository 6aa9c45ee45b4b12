//! Command handlers for autotweak.

use crate::Outcome;
use anyhow::{bail, Result};
use autotweak_common::config::AutoTweakConfig;
use autotweak_common::{
    apply_operation, JournalStore, LiveHost, OperationReport, RevertEngine, RevertError, RevertReport,
    RevertSelection,
};
use autotweakctl::prompt::Confirm;
use autotweakctl::system_info::{self, format_gib};
use autotweakctl::{run_recipe, select_kinds, RecipeContext, RecipePaths, TerminalPrompt};
use owo_colors::OwoColorize;

const HR: &str = "------------------------------------------------------------";

pub struct App {
    config: AutoTweakConfig,
    host: LiveHost,
    journal: JournalStore,
    prompt: TerminalPrompt,
}

fn require_root() -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        bail!("this command changes system settings and must be run as root (try sudo)");
    }
    Ok(())
}

fn print_header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", HR.dimmed());
}

fn print_kv(key: &str, value: &str) {
    println!("{:16} {}", key, value);
}

impl App {
    pub fn new(config: AutoTweakConfig, assume_yes: bool) -> Self {
        let host = LiveHost::new(config.system.sysfs_root.clone());
        let journal = JournalStore::new(config.journal.path.clone());
        Self {
            config,
            host,
            journal,
            prompt: TerminalPrompt::new(assume_yes),
        }
    }

    pub fn apply(&self, args: &[String], include_gaming: bool) -> Result<Outcome> {
        let kinds = select_kinds(args, include_gaming)?;
        require_root()?;

        let ctx = RecipeContext::new(RecipePaths::default(), &self.prompt);
        let mut outcome = Outcome::Success;

        for kind in kinds {
            print_header(kind.label());
            let report = apply_operation(&self.host, &self.journal, kind, &self.config.backup.suffix, |session| {
                run_recipe(session, &ctx)
            });
            print_operation(&report);
            if !report.ok() {
                outcome = Outcome::Partial;
            }
        }

        Ok(outcome)
    }

    pub fn history(&self) -> Result<Outcome> {
        let summaries = self.journal.summaries();
        if summaries.is_empty() {
            println!("No changes recorded.");
            return Ok(Outcome::Success);
        }

        print_header("Applied operations");
        println!("{:>4}  {:19}  {:22}  {}", "#", "timestamp", "operation", "actions");
        for s in summaries {
            println!(
                "{:>4}  {:19}  {:22}  {}",
                s.index,
                s.timestamp,
                s.kind.label(),
                s.action_count
            );
        }
        Ok(Outcome::Success)
    }

    pub fn revert(&self, selection: &str) -> Result<Outcome> {
        let selection = RevertSelection::parse(selection)?;
        require_root()?;

        let question = match selection {
            RevertSelection::All => "Revert every recorded operation?".to_string(),
            RevertSelection::Index(i) => format!("Revert operation {}?", i + 1),
        };
        if !self.prompt.confirm(&question) {
            println!("Nothing reverted.");
            return Ok(Outcome::Success);
        }

        match RevertEngine::new(&self.host, &self.journal).revert(selection) {
            Ok(report) => {
                print_revert(&report);
                Ok(if report.ok() { Outcome::Success } else { Outcome::Partial })
            }
            Err(RevertError::NothingToRevert) => {
                println!("No changes to revert.");
                Ok(Outcome::Success)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn info(&self) -> Result<Outcome> {
        let report = system_info::collect(&self.host);

        print_header("System information");
        print_kv("OS", &report.os);
        print_kv("Kernel", &report.kernel);
        print_kv("Hostname", &report.hostname);
        print_kv("CPU", &format!("{} ({} threads)", report.cpu_model, report.cpu_threads));
        print_kv(
            "Memory",
            &format!(
                "{} used of {}",
                format_gib(report.memory_used_bytes),
                format_gib(report.memory_total_bytes)
            ),
        );
        print_kv("Swap", &format_gib(report.swap_total_bytes));
        if let Some(n) = report.running_services {
            print_kv("Services", &format!("{} running", n));
        }
        if let Some(boot) = &report.boot_time {
            print_kv("Boot", boot);
        }

        if !report.disks.is_empty() {
            print_header("Disks");
            for d in &report.disks {
                println!(
                    "{:16} {:20} {:8} {} free of {}",
                    d.name,
                    d.mount_point,
                    d.kind,
                    format_gib(d.available_bytes),
                    format_gib(d.total_bytes)
                );
            }
        }
        Ok(Outcome::Success)
    }
}

fn print_operation(report: &OperationReport) {
    for action in &report.entry.actions {
        println!("  {} {}", "*".green(), action);
    }

    let summary = format!("{} of {} tunings applied", report.succeeded, report.attempted);
    if report.succeeded == report.attempted {
        println!("{}", summary.bright_green());
    } else {
        println!("{} (see log for failures)", summary.yellow());
    }

    if let Some(err) = &report.persist_error {
        println!("{} {}", "[WARNING]".bright_red(), err);
        println!("This operation was applied but is not recorded and cannot be reverted.");
    }
}

fn print_revert(report: &RevertReport) {
    for entry in &report.entries {
        print_header(&format!("Reverting #{} {} ({})", entry.index, entry.kind.label(), entry.timestamp));
        if entry.steps.is_empty() {
            println!("  nothing to restore");
        }
        for step in &entry.steps {
            let mark = if step.ok {
                "[OK]".bright_green().to_string()
            } else {
                "[FAILED]".bright_red().to_string()
            };
            println!("  {} {} {}: {}", mark, step.kind, step.target, step.detail);
        }
    }

    println!();
    println!(
        "{} of {} restore steps succeeded",
        report.steps_succeeded(),
        report.steps_total()
    );
    if let Some(err) = &report.journal_error {
        println!("{} journal not updated: {}", "[WARNING]".bright_red(), err);
    }
}
