//! `fln apply`: apply a message's proposal with backups and rollback.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tabled::{Table, Tabled};
use tracing::{info, instrument, warn};

use crate::cli::{AppContext, ApplyArgs, OutputFormat};
use crate::cli_ext::common::{load_message, workspace_config, workspace_root};
use crate::cli_ext::plan_cmd::{plan_message, print_issues, print_operations};
use crate::core::apply_engine::{
    ApplyEngine, ApplyObserver, ApplyPhase, ApplyProgress, ApplyResult, BatchApplyResult, CancellationToken,
};
use crate::core::backup::BackupManager;
use crate::core::clock::SystemClock;
use crate::core::conflict::ConflictInfo;
use crate::core::undo::{FileChangeRecord, UndoManager};

/// Drives an indicatif bar from apply callbacks.
pub struct ProgressObserver
{
    bar: ProgressBar,
    force: bool,
    /// Conflicts seen during the run, for the summary
    pub conflicts: Vec<ConflictInfo>,
    pub undoable: Vec<FileChangeRecord>,
}

impl ProgressObserver
{
    pub fn new(
        total: usize,
        quiet: bool,
        force: bool,
    ) -> Self
    {
        let bar = if quiet
        {
            ProgressBar::hidden()
        }
        else
        {
            let pb = ProgressBar::new(total as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        };
        Self { bar, force, conflicts: Vec::new(), undoable: Vec::new() }
    }

    pub fn finish(&self)
    {
        self.bar
            .finish_and_clear();
    }
}

impl ApplyObserver for ProgressObserver
{
    fn on_progress(
        &mut self,
        progress: &ApplyProgress,
    )
    {
        let phase = match progress.phase
        {
            ApplyPhase::Validating => "validating",
            ApplyPhase::CreatingBackups => "backing up",
            ApplyPhase::CreatingDirectories => "creating directories",
            ApplyPhase::WritingFiles => "writing",
            ApplyPhase::Finalizing => "finalizing",
            ApplyPhase::Completed => "done",
            ApplyPhase::RollingBack => "rolling back",
        };
        let msg = match &progress.path
        {
            Some(p) => format!("{phase} {p}"),
            None => phase.to_string(),
        };
        self.bar
            .set_message(msg);
        if progress.phase == ApplyPhase::WritingFiles
        {
            self.bar
                .set_position(progress.current as u64);
        }
    }

    fn on_file_change_failed(
        &mut self,
        result: &ApplyResult,
    )
    {
        warn!(path = %result.path, kind = ?result.result_type, "file change failed");
    }

    fn on_conflict(
        &mut self,
        conflict: &ConflictInfo,
    ) -> bool
    {
        self.conflicts
            .push(conflict.clone());
        self.force
    }

    fn on_undo_available(
        &mut self,
        record: &FileChangeRecord,
    )
    {
        self.undoable
            .push(record.clone());
    }
}

#[derive(Tabled)]
struct ResultRow
{
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "+")]
    added: usize,
    #[tabled(rename = "-")]
    removed: usize,
    #[tabled(rename = "~")]
    modified: usize,
    #[tabled(rename = "Backup")]
    backup: String,
}

fn confirm(count: usize) -> Result<bool>
{
    if !std::io::stdin().is_terminal()
    {
        bail!("refusing to apply without --yes on a non-interactive stdin");
    }
    print!("Apply {count} operation(s)? [y/N] ");
    std::io::stdout()
        .flush()
        .context("flush stdout")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("read confirmation")?;
    Ok(matches!(
        answer
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "y" | "yes"
    ))
}

fn print_results(
    batch: &BatchApplyResult,
    ctx: &AppContext,
)
{
    let rows: Vec<ResultRow> = batch
        .results
        .values()
        .map(|r| ResultRow {
            path: match &r.new_path
            {
                Some(n) => format!("{} -> {n}", r.path),
                None => r
                    .path
                    .clone(),
            },
            result: if r.rolled_back { "RolledBack".to_string() } else { format!("{:?}", r.result_type) },
            added: r
                .stats
                .lines_added,
            removed: r
                .stats
                .lines_removed,
            modified: r
                .stats
                .lines_modified,
            backup: r
                .backup
                .as_ref()
                .map(|b| b.id.clone())
                .unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(rows));

    for r in batch
        .results
        .values()
        .filter(|r| !r.success)
    {
        let msg = r
            .message
            .clone()
            .unwrap_or_else(|| format!("{:?}", r.result_type));
        if ctx.no_color
        {
            println!("failed: {}: {msg}", r.path);
        }
        else
        {
            println!("{} {}: {msg}", "failed:".red().bold(), r.path);
        }
    }

    let summary = format!(
        "{} succeeded, {} failed, {} skipped in {} ms",
        batch.succeeded, batch.failed, batch.skipped, batch.duration_ms
    );
    if ctx.no_color || !batch.all_succeeded()
    {
        println!("{summary}");
    }
    else
    {
        println!("{}", summary.green());
    }
    if batch.was_rolled_back
    {
        println!("Batch was rolled back; the workspace is unchanged.");
    }
}

#[instrument(skip_all, fields(input = %args.message.input.display()))]
pub fn run(
    args: ApplyArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let root = workspace_root(&args.root)?;
    let cfg = workspace_config(&root)?;
    let msg = load_message(&args.message)?;
    let mut proposal = plan_message(&root, &cfg, &msg)?;

    if !proposal
        .validation
        .is_valid()
    {
        print_issues(&proposal.validation, ctx);
        bail!("proposal for {} is not valid; nothing applied", msg.id);
    }

    let selected = proposal
        .files
        .selected()
        .count();
    if selected == 0
    {
        if !ctx.quiet
        {
            println!("No operations selected.");
        }
        return Ok(());
    }

    if ctx.dry_run
    {
        print_operations(&proposal.files.operations);
        print_issues(&proposal.validation, ctx);
        println!("dry-run: {selected} operation(s) would be applied");
        return Ok(());
    }

    if !args.yes
    {
        print_operations(&proposal.files.operations);
        if !confirm(selected)?
        {
            println!("Aborted.");
            return Ok(());
        }
    }

    let mut options = cfg
        .apply
        .clone();
    if args.no_backup
    {
        options.create_backup = false;
    }
    if args.no_rollback
    {
        options.rollback_on_failure = false;
    }

    let backups = Arc::new(BackupManager::open(&root, cfg.backup.clone())?);
    let undo = Arc::new(UndoManager::new(cfg.undo.clone(), backups.clone(), Arc::new(SystemClock)));
    let engine = ApplyEngine::new(&root, options, backups).with_undo(undo);

    let quiet = ctx.quiet || matches!(args.format, OutputFormat::Json);
    let mut observer = ProgressObserver::new(selected, quiet, args.force);
    let batch = engine.apply_proposal(&mut proposal.files, &mut observer, &CancellationToken::new());
    observer.finish();

    info!(
        succeeded = batch.succeeded,
        failed = batch.failed,
        rolled_back = batch.was_rolled_back,
        "apply finished"
    );

    if matches!(args.format, OutputFormat::Json)
    {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    }
    else
    {
        print_results(&batch, ctx);
        if !ctx.quiet && !observer.undoable.is_empty()
        {
            println!(
                "{} change(s) backed up; restore with `fln backup restore <id>`",
                observer
                    .undoable
                    .iter()
                    .filter(|r| r.backup_id.is_some())
                    .count()
            );
        }
        if !observer
            .conflicts
            .is_empty()
            && !args.force
        {
            println!("Re-run with --force to overwrite files changed outside fenceline.");
        }
    }

    if !batch.all_succeeded()
    {
        bail!("{} of {} operation(s) failed", batch.failed, batch.selected);
    }
    Ok(())
}
