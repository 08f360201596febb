//! Apply engine for file-operation batches
//!
//! Runs a batch through fixed phases:
//! Validating → CreatingBackups → CreatingDirectories → WritingFiles →
//! Finalizing → Completed. A fatal failure switches to RollingBack, which
//! restores every already-applied operation from its backup.
//!
//! Cancellation is cooperative and only observed between operations, so a
//! file is never left half-written.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use similar::{DiffOp, TextDiff};
use tracing::{debug, info, warn};

use crate::core::backup::{self, BackupInfo, BackupManager};
use crate::core::block::LineRange;
use crate::core::clock::{Clock, SystemClock};
use crate::core::conflict::{ConflictDetector, ConflictInfo};
use crate::core::proposal::{FileOperation, FileTreeProposal, OperationKind, OperationStatus};
use crate::core::undo::{ChangeType, FileChangeRecord, UndoManager};
use crate::infra::config::ApplyOptions;
use crate::infra::io::{self, LineEnding, TextEncoding, TextLayout};
use crate::infra::utils::PathUtils;

/// Outcome code; success family below 10, failure family from 10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum ApplyResultType
{
    Success = 0,
    SuccessWithWarnings = 1,
    Skipped = 2,
    NoChanges = 3,
    Conflict = 10,
    FileNotFound = 11,
    PermissionDenied = 12,
    ValidationFailed = 13,
    Cancelled = 14,
    FileLocked = 15,
    DiskFull = 16,
    PathOutsideWorkspace = 17,
    Error = 18,
}

impl ApplyResultType
{
    pub fn code(self) -> i32
    {
        self as i32
    }

    pub fn is_success(self) -> bool
    {
        self.code() < 10
    }

    pub fn is_retryable(self) -> bool
    {
        matches!(
            self,
            ApplyResultType::Conflict | ApplyResultType::FileLocked | ApplyResultType::PermissionDenied
        )
    }

    pub fn from_io(err: &std::io::Error) -> Self
    {
        use std::io::ErrorKind;

        match err.kind()
        {
            ErrorKind::NotFound => return ApplyResultType::FileNotFound,
            ErrorKind::PermissionDenied => return ApplyResultType::PermissionDenied,
            ErrorKind::StorageFull => return ApplyResultType::DiskFull,
            ErrorKind::ResourceBusy => return ApplyResultType::FileLocked,
            _ =>
            {}
        }

        #[cfg(unix)]
        if err.raw_os_error() == Some(libc::ENOSPC)
        {
            return ApplyResultType::DiskFull;
        }
        // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
        #[cfg(windows)]
        if matches!(err.raw_os_error(), Some(32 | 33))
        {
            return ApplyResultType::FileLocked;
        }

        ApplyResultType::Error
    }
}

/// Failure family of `ApplyResultType`, one variant each
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError
{
    #[error("conflict on {path}: {description}")]
    Conflict
    {
        path: String, description: String
    },
    #[error("{0}: file not found")]
    FileNotFound(String),
    #[error("{0}: permission denied")]
    PermissionDenied(String),
    #[error("{path}: {reason}")]
    ValidationFailed
    {
        path: String, reason: String
    },
    #[error("cancelled before {0} was applied")]
    Cancelled(String),
    #[error("{0}: file is locked by another process")]
    FileLocked(String),
    #[error("{0}: disk full")]
    DiskFull(String),
    #[error("{0}: path is outside the workspace")]
    PathOutsideWorkspace(String),
    #[error("{path}: {message}")]
    Other
    {
        path: String, message: String
    },
}

impl ApplyError
{
    pub fn result_type(&self) -> ApplyResultType
    {
        match self
        {
            ApplyError::Conflict { .. } => ApplyResultType::Conflict,
            ApplyError::FileNotFound(_) => ApplyResultType::FileNotFound,
            ApplyError::PermissionDenied(_) => ApplyResultType::PermissionDenied,
            ApplyError::ValidationFailed { .. } => ApplyResultType::ValidationFailed,
            ApplyError::Cancelled(_) => ApplyResultType::Cancelled,
            ApplyError::FileLocked(_) => ApplyResultType::FileLocked,
            ApplyError::DiskFull(_) => ApplyResultType::DiskFull,
            ApplyError::PathOutsideWorkspace(_) => ApplyResultType::PathOutsideWorkspace,
            ApplyError::Other { .. } => ApplyResultType::Error,
        }
    }

    /// Classify an anyhow chain by the first `io::Error` inside it.
    pub fn from_anyhow(
        path: &str,
        err: &anyhow::Error,
    ) -> Self
    {
        let io_kind = err
            .chain()
            .find_map(|e| e.downcast_ref::<std::io::Error>())
            .map(ApplyResultType::from_io);
        let path = path.to_string();
        match io_kind
        {
            Some(ApplyResultType::FileNotFound) => ApplyError::FileNotFound(path),
            Some(ApplyResultType::PermissionDenied) => ApplyError::PermissionDenied(path),
            Some(ApplyResultType::DiskFull) => ApplyError::DiskFull(path),
            Some(ApplyResultType::FileLocked) => ApplyError::FileLocked(path),
            _ => ApplyError::Other { path, message: format!("{err:#}") },
        }
    }

    fn validation(
        path: &str,
        reason: impl Into<String>,
    ) -> Self
    {
        ApplyError::ValidationFailed { path: path.to_string(), reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats
{
    pub lines_added: usize,
    pub lines_removed: usize,
    /// Deleted lines paired with inserted lines in the same hunk
    pub lines_modified: usize,
}

impl DiffStats
{
    pub fn between(
        old: &str,
        new: &str,
    ) -> Self
    {
        let diff = TextDiff::from_lines(old, new);
        let mut stats = DiffStats::default();
        for op in diff.ops()
        {
            match *op
            {
                DiffOp::Equal { .. } =>
                {}
                DiffOp::Insert { new_len, .. } => stats.lines_added += new_len,
                DiffOp::Delete { old_len, .. } => stats.lines_removed += old_len,
                DiffOp::Replace { old_len, new_len, .. } =>
                {
                    let paired = old_len.min(new_len);
                    stats.lines_modified += paired;
                    stats.lines_added += new_len - paired;
                    stats.lines_removed += old_len - paired;
                }
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult
{
    pub success: bool,
    pub result_type: ApplyResultType,
    pub path: String,
    pub new_path: Option<String>,
    pub kind: OperationKind,
    pub stats: DiffStats,
    pub backup: Option<BackupInfo>,
    pub undo_available: bool,
    pub change_id: Option<String>,
    pub conflict: Option<ConflictInfo>,
    pub message: Option<String>,
    pub warnings: Vec<String>,
    pub rolled_back: bool,
}

impl ApplyResult
{
    fn new(
        op: &FileOperation,
        result_type: ApplyResultType,
    ) -> Self
    {
        Self {
            success: result_type.is_success(),
            result_type,
            path: op.path.clone(),
            new_path: op.new_path.clone(),
            kind: op.kind,
            stats: DiffStats::default(),
            backup: None,
            undo_available: false,
            change_id: None,
            conflict: None,
            message: None,
            warnings: Vec::new(),
            rolled_back: false,
        }
    }

    fn failed(
        op: &FileOperation,
        err: &ApplyError,
    ) -> Self
    {
        let mut r = Self::new(op, err.result_type());
        r.message = Some(err.to_string());
        r
    }

    fn skipped(
        op: &FileOperation,
        why: &str,
    ) -> Self
    {
        let mut r = Self::new(op, ApplyResultType::Skipped);
        r.message = Some(why.to_string());
        r
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyPhase
{
    Validating,
    CreatingBackups,
    CreatingDirectories,
    WritingFiles,
    Finalizing,
    Completed,
    RollingBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyProgress
{
    pub phase: ApplyPhase,
    pub current: usize,
    pub total: usize,
    pub path: Option<String>,
}

impl ApplyProgress
{
    pub fn percent(&self) -> f32
    {
        if self.total == 0
        {
            return 100.0;
        }
        self.current as f32 * 100.0 / self.total as f32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchApplyResult
{
    /// Keyed by index into the submitted operations, in execution order
    pub results: IndexMap<usize, ApplyResult>,
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub was_rolled_back: bool,
    pub was_cancelled: bool,
    pub final_phase: ApplyPhase,
    pub duration_ms: u128,
}

impl BatchApplyResult
{
    /// Every selected operation ran and succeeded
    pub fn all_succeeded(&self) -> bool
    {
        !self.was_rolled_back
            && !self.was_cancelled
            && self.results.len() == self.selected
            && self
                .results
                .values()
                .all(|r| r.success)
    }

    /// First result for `path`
    pub fn get(
        &self,
        path: &str,
    ) -> Option<&ApplyResult>
    {
        self.results
            .values()
            .find(|r| r.path == path)
    }

    /// Every result for `path`, in execution order
    pub fn for_path<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Iterator<Item = &'a ApplyResult> + 'a
    {
        self.results
            .values()
            .filter(move |r| r.path == path)
    }

    /// Result of the operation at `index` in the submitted slice
    pub fn at(
        &self,
        index: usize,
    ) -> Option<&ApplyResult>
    {
        self.results
            .get(&index)
    }

    fn tally(&mut self)
    {
        self.succeeded = 0;
        self.failed = 0;
        self.skipped = 0;
        for r in self.results.values()
        {
            match r.result_type
            {
                ApplyResultType::Skipped | ApplyResultType::Cancelled => self.skipped += 1,
                t if t.is_success() && r.success => self.succeeded += 1,
                _ => self.failed += 1,
            }
        }
    }
}

/// Callbacks from a running batch. All methods default to no-ops.
pub trait ApplyObserver
{
    fn on_progress(
        &mut self,
        _progress: &ApplyProgress,
    )
    {
    }

    fn on_file_changed(
        &mut self,
        _result: &ApplyResult,
    )
    {
    }

    fn on_file_change_failed(
        &mut self,
        _result: &ApplyResult,
    )
    {
    }

    /// Return true to authorize overwriting the conflicting file.
    fn on_conflict(
        &mut self,
        _conflict: &ConflictInfo,
    ) -> bool
    {
        false
    }

    fn on_undo_available(
        &mut self,
        _record: &FileChangeRecord,
    )
    {
    }
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl ApplyObserver for NoopObserver {}

/// Shared flag checked between operations
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn cancel(&self)
    {
        self.0
            .store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool
    {
        self.0
            .load(Ordering::SeqCst)
    }
}

/// Per-operation working state for one batch run
#[derive(Debug)]
struct Planned
{
    /// Position in the submitted slice
    index: usize,
    op: FileOperation,
    abs: PathBuf,
    new_abs: Option<PathBuf>,
    existed: bool,
    overwrite_authorized: bool,
    backup: Option<BackupInfo>,
    /// Pre-image kept in memory when no backup was taken
    preimage: Option<Vec<u8>>,
    /// An earlier operation in the batch writes the same path first
    backup_deferred: bool,
    applied: Option<Written>,
}

#[derive(Debug, Clone)]
struct Written
{
    before_hash: Option<String>,
    after_hash: Option<String>,
    before_size: u64,
    after_size: u64,
    stats: DiffStats,
    no_changes: bool,
}

#[derive(Debug)]
pub struct ApplyEngine
{
    root: PathBuf,
    options: ApplyOptions,
    detector: ConflictDetector,
    backups: Arc<BackupManager>,
    undo: Option<Arc<UndoManager>>,
    clock: Arc<dyn Clock>,
    conversation_id: Option<String>,
}

impl ApplyEngine
{
    pub fn new(
        root: impl Into<PathBuf>,
        options: ApplyOptions,
        backups: Arc<BackupManager>,
    ) -> Self
    {
        let root = root.into();
        Self {
            detector: ConflictDetector::new(&root),
            root,
            options,
            backups,
            undo: None,
            clock: Arc::new(SystemClock),
            conversation_id: None,
        }
    }

    pub fn with_undo(
        mut self,
        undo: Arc<UndoManager>,
    ) -> Self
    {
        self.undo = Some(undo);
        self
    }

    pub fn with_clock(
        mut self,
        clock: Arc<dyn Clock>,
    ) -> Self
    {
        self.detector = ConflictDetector::with_clock(&self.root, clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_conversation(
        mut self,
        id: impl Into<String>,
    ) -> Self
    {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn options(&self) -> &ApplyOptions
    {
        &self.options
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    /// Apply one operation as a batch of one.
    pub fn apply_one(
        &self,
        op: &FileOperation,
        observer: &mut dyn ApplyObserver,
    ) -> ApplyResult
    {
        let batch = self.apply_batch(std::slice::from_ref(op), observer, &CancellationToken::new());
        match batch
            .results
            .into_values()
            .next()
        {
            Some(r) => r,
            None => ApplyResult::skipped(op, "operation not selected"),
        }
    }

    /// Apply a proposal's selected operations and write statuses back.
    pub fn apply_proposal(
        &self,
        proposal: &mut FileTreeProposal,
        observer: &mut dyn ApplyObserver,
        cancel: &CancellationToken,
    ) -> BatchApplyResult
    {
        let batch = self.apply_batch(&proposal.operations, observer, cancel);
        for i in 0..proposal
            .operations
            .len()
        {
            let op = &proposal.operations[i];
            if !op.selected
            {
                continue;
            }
            let status = match batch.at(i)
            {
                Some(r) if r.rolled_back => OperationStatus::Skipped,
                Some(r) if r.success => OperationStatus::Applied,
                Some(r) if r.result_type == ApplyResultType::Conflict => OperationStatus::Conflict,
                Some(r) if matches!(r.result_type, ApplyResultType::Skipped | ApplyResultType::Cancelled) =>
                {
                    OperationStatus::Skipped
                }
                Some(_) => OperationStatus::Failed,
                None => OperationStatus::Pending,
            };
            proposal.set_status(i, status);
        }
        proposal.recompute_status();
        batch
    }

    /// Run the selected operations through every phase.
    #[tracing::instrument(level = "debug", skip_all, fields(ops = ops.len()))]
    pub fn apply_batch(
        &self,
        ops: &[FileOperation],
        observer: &mut dyn ApplyObserver,
        cancel: &CancellationToken,
    ) -> BatchApplyResult
    {
        let started = Instant::now();
        let mut selected: Vec<(usize, FileOperation)> = ops
            .iter()
            .enumerate()
            .filter(|(_, o)| o.selected)
            .map(|(i, o)| (i, o.clone()))
            .collect();
        selected.sort_by_key(|(_, o)| o.order);
        let total = selected.len();

        let mut batch = BatchApplyResult {
            results: IndexMap::new(),
            selected: total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            was_rolled_back: false,
            was_cancelled: false,
            final_phase: ApplyPhase::Validating,
            duration_ms: 0,
        };

        // Validating
        self.phase(observer, &mut batch, ApplyPhase::Validating, total);
        let mut plans = Vec::with_capacity(total);
        let mut invalid = false;
        let mkdirs: Vec<String> = selected
            .iter()
            .filter(|(_, o)| o.kind == OperationKind::Mkdir)
            .map(|(_, o)| o.path.clone())
            .collect();
        let mut touched: HashSet<String> = HashSet::new();
        for (index, op) in selected
        {
            match self.validate(op.clone(), &mkdirs, observer)
            {
                Ok(mut plan) =>
                {
                    plan.index = index;
                    plan.backup_deferred = plan.op.kind != OperationKind::Mkdir && !touched.insert(plan.op.path.clone());
                    plans.push(plan);
                }
                Err((err, conflict)) =>
                {
                    invalid = true;
                    let mut result = ApplyResult::failed(&op, &err);
                    result.conflict = conflict;
                    warn!(path = %op.path, error = %err, "operation failed validation");
                    observer.on_file_change_failed(&result);
                    batch
                        .results
                        .insert(index, result);
                }
            }
        }
        if invalid && self.options.rollback_on_failure
        {
            for plan in &plans
            {
                batch
                    .results
                    .insert(plan.index, ApplyResult::skipped(&plan.op, "batch failed validation"));
            }
            return self.finish(batch, started);
        }

        // CreatingBackups
        self.phase(observer, &mut batch, ApplyPhase::CreatingBackups, total);
        let mut idx = 0;
        while idx < plans.len()
        {
            if cancel.is_cancelled()
            {
                return self.cancel_rest(batch, &plans, 0, started);
            }
            if plans[idx].backup_deferred
            {
                idx += 1;
                continue;
            }
            if let Err(err) = self.take_backup(&mut plans[idx])
            {
                let plan = plans.remove(idx);
                let result = ApplyResult::failed(&plan.op, &err);
                observer.on_file_change_failed(&result);
                batch
                    .results
                    .insert(plan.index, result);
                if self.options.rollback_on_failure
                {
                    for p in &plans
                    {
                        batch
                            .results
                            .insert(p.index, ApplyResult::skipped(&p.op, "batch aborted"));
                    }
                    return self.finish(batch, started);
                }
                continue;
            }
            idx += 1;
        }

        // CreatingDirectories
        self.phase(observer, &mut batch, ApplyPhase::CreatingDirectories, total);
        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut fatal = false;
        for plan in plans
            .iter_mut()
            .filter(|p| p.op.kind == OperationKind::Mkdir)
        {
            match create_dirs(&plan.abs, &mut created_dirs)
            {
                Ok(()) =>
                {
                    plan.applied = Some(Written {
                        before_hash: None,
                        after_hash: None,
                        before_size: 0,
                        after_size: 0,
                        stats: DiffStats::default(),
                        no_changes: false,
                    });
                    let result = ApplyResult::new(&plan.op, ApplyResultType::Success);
                    observer.on_file_changed(&result);
                    batch
                        .results
                        .insert(plan.index, result);
                }
                Err(e) =>
                {
                    let err = ApplyError::from_anyhow(&plan.op.path, &e);
                    let result = ApplyResult::failed(&plan.op, &err);
                    observer.on_file_change_failed(&result);
                    batch
                        .results
                        .insert(plan.index, result);
                    fatal = self.options.rollback_on_failure;
                    if fatal
                    {
                        break;
                    }
                }
            }
        }

        // WritingFiles
        if !fatal
        {
            self.phase(observer, &mut batch, ApplyPhase::WritingFiles, total);
            let write_idx: Vec<usize> = (0..plans.len())
                .filter(|&i| plans[i].op.kind != OperationKind::Mkdir)
                .collect();
            // Line-count changes from range edits already written, per path
            let mut shifts: HashMap<String, Vec<(LineRange, isize)>> = HashMap::new();
            for (n, &i) in write_idx
                .iter()
                .enumerate()
            {
                if cancel.is_cancelled()
                {
                    batch.was_cancelled = true;
                    for &j in &write_idx[n..]
                    {
                        let op = &plans[j].op;
                        let err = ApplyError::Cancelled(op.path.clone());
                        batch
                            .results
                            .insert(plans[j].index, ApplyResult::failed(op, &err));
                    }
                    info!(remaining = write_idx.len() - n, "batch cancelled");
                    break;
                }

                let range = plans[i]
                    .op
                    .line_range;
                let outcome = match self.prepare_repeat_write(&mut plans[i], &shifts)
                {
                    Ok(()) => self.write_one(&mut plans[i], &mut created_dirs, observer),
                    Err(err) => Err((err, None)),
                };
                match outcome
                {
                    Ok(result) =>
                    {
                        observer.on_file_changed(&result);
                        record_shift(&plans[i], range, &mut shifts);
                        // Later edits to this path must expect what was just written
                        let fresh = self
                            .detector
                            .snapshot(&plans[i].op.path)
                            .ok();
                        for &j in &write_idx[n + 1..]
                        {
                            if plans[j].op.path == plans[i].op.path
                            {
                                plans[j]
                                    .op
                                    .snapshot = fresh.clone();
                            }
                        }
                        batch
                            .results
                            .insert(plans[i].index, result);
                    }
                    Err((err, conflict)) =>
                    {
                        let mut result = ApplyResult::failed(&plans[i].op, &err);
                        result.conflict = conflict;
                        warn!(path = %plans[i].op.path, error = %err, "write failed");
                        observer.on_file_change_failed(&result);
                        batch
                            .results
                            .insert(plans[i].index, result);
                        if self.options.rollback_on_failure
                        {
                            for &j in &write_idx[n + 1..]
                            {
                                let op = &plans[j].op;
                                batch
                                    .results
                                    .insert(plans[j].index, ApplyResult::skipped(op, "batch aborted"));
                            }
                            fatal = true;
                            break;
                        }
                    }
                }
                observer.on_progress(&ApplyProgress {
                    phase: ApplyPhase::WritingFiles,
                    current: n + 1,
                    total: write_idx.len(),
                    path: Some(plans[i].op.path.clone()),
                });
            }
        }

        if fatal
        {
            self.phase(observer, &mut batch, ApplyPhase::RollingBack, total);
            self.rollback(&mut plans, &created_dirs, &mut batch);
            return self.finish(batch, started);
        }

        // Finalizing
        self.phase(observer, &mut batch, ApplyPhase::Finalizing, total);
        self.finalize(&plans, &mut batch, observer);
        if !batch.was_cancelled
        {
            self.phase(observer, &mut batch, ApplyPhase::Completed, total);
        }
        self.finish(batch, started)
    }

    fn phase(
        &self,
        observer: &mut dyn ApplyObserver,
        batch: &mut BatchApplyResult,
        phase: ApplyPhase,
        total: usize,
    )
    {
        debug!(?phase, "apply phase");
        batch.final_phase = phase;
        let current = if phase == ApplyPhase::Completed { total } else { 0 };
        observer.on_progress(&ApplyProgress { phase, current, total, path: None });
    }

    fn finish(
        &self,
        mut batch: BatchApplyResult,
        started: Instant,
    ) -> BatchApplyResult
    {
        batch.tally();
        batch.duration_ms = started
            .elapsed()
            .as_millis();
        info!(
            succeeded = batch.succeeded,
            failed = batch.failed,
            skipped = batch.skipped,
            rolled_back = batch.was_rolled_back,
            "batch finished"
        );
        batch
    }

    fn cancel_rest(
        &self,
        mut batch: BatchApplyResult,
        plans: &[Planned],
        from: usize,
        started: Instant,
    ) -> BatchApplyResult
    {
        batch.was_cancelled = true;
        for plan in &plans[from..]
        {
            let err = ApplyError::Cancelled(plan.op.path.clone());
            batch
                .results
                .insert(plan.index, ApplyResult::failed(&plan.op, &err));
        }
        self.finish(batch, started)
    }

    fn resolve(
        &self,
        rel: &str,
    ) -> Result<PathBuf, ApplyError>
    {
        PathUtils::resolve_in(&self.root, rel).ok_or_else(|| ApplyError::PathOutsideWorkspace(rel.to_string()))
    }

    /// Static checks plus the first conflict check.
    fn validate(
        &self,
        op: FileOperation,
        mkdirs: &[String],
        observer: &mut dyn ApplyObserver,
    ) -> Result<Planned, (ApplyError, Option<ConflictInfo>)>
    {
        let plain = |e: ApplyError| -> (ApplyError, Option<ConflictInfo>) { (e, None) };
        let path = op
            .path
            .clone();
        let abs = self
            .resolve(&path)
            .map_err(plain)?;
        let meta = fs::metadata(&abs).ok();
        let existed = meta
            .as_ref()
            .is_some_and(|m| m.is_file());

        if meta
            .as_ref()
            .is_some_and(|m| m.is_dir())
            && op.kind != OperationKind::Mkdir
        {
            return Err(plain(ApplyError::validation(&path, "target is a directory")));
        }

        let mut new_abs = None;
        match op.kind
        {
            OperationKind::Unknown =>
            {
                return Err(plain(ApplyError::validation(&path, "operation kind is unknown")));
            }
            OperationKind::Mkdir =>
            {}
            OperationKind::Create | OperationKind::Modify =>
            {
                let content = op
                    .content
                    .as_deref()
                    .unwrap_or("");
                if content.len() as u64 > self.options.max_file_size_bytes
                {
                    return Err(plain(ApplyError::validation(&path, "content exceeds the maximum file size")));
                }
                if op.kind == OperationKind::Modify && !existed
                {
                    return Err(plain(ApplyError::FileNotFound(path)));
                }
                if let Some(m) = &meta
                    && m.len() > self.options.max_file_size_bytes
                {
                    return Err(plain(ApplyError::validation(&path, "existing file exceeds the maximum file size")));
                }
                if !self.options.create_parent_directories
                    && let Some(parent) = abs.parent()
                    && !parent.is_dir()
                    && !PathUtils::parent(&path).is_some_and(|p| covered_by_mkdir(p, mkdirs))
                {
                    return Err(plain(ApplyError::validation(&path, "parent directory does not exist")));
                }
            }
            OperationKind::Delete =>
            {
                if !existed
                {
                    return Err(plain(ApplyError::FileNotFound(path)));
                }
            }
            OperationKind::Rename | OperationKind::Move =>
            {
                if !existed
                {
                    return Err(plain(ApplyError::FileNotFound(path)));
                }
                let Some(target) = op
                    .new_path
                    .as_deref()
                else
                {
                    return Err(plain(ApplyError::validation(&path, "relocation has no target path")));
                };
                let target_abs = self
                    .resolve(target)
                    .map_err(plain)?;
                if target_abs.exists()
                {
                    return Err(plain(ApplyError::validation(&path, format!("destination {target} already exists"))));
                }
                new_abs = Some(target_abs);
            }
        }

        let mut overwrite_authorized = self.options.allow_conflict_overwrite;
        if self.options.check_for_conflicts && op.kind != OperationKind::Mkdir
        {
            let proposed = match (&op.content, op.line_range) {
                (Some(c), None) => Some(io::sha256_bytes(c.as_bytes())),
                _ => None,
            };
            let check = self
                .detector
                .check(op.snapshot.as_ref(), &path, op.kind, proposed.as_deref(), overwrite_authorized)
                .map_err(|e| plain(ApplyError::from_anyhow(&path, &e)))?;
            if check.is_blocking()
            {
                if observer.on_conflict(&check.info)
                {
                    info!(path = %path, "conflict overwrite authorized");
                    overwrite_authorized = true;
                }
                else
                {
                    let err = ApplyError::Conflict { path, description: check.info.description.clone() };
                    return Err((err, Some(check.info)));
                }
            }
        }

        Ok(Planned {
            index: 0,
            op,
            abs,
            new_abs,
            existed,
            overwrite_authorized,
            backup: None,
            preimage: None,
            backup_deferred: false,
            applied: None,
        })
    }

    fn take_backup(
        &self,
        plan: &mut Planned,
    ) -> Result<(), ApplyError>
    {
        let destructive = matches!(
            plan.op.kind,
            OperationKind::Create | OperationKind::Modify | OperationKind::Delete
        );
        if !destructive || !plan.existed
        {
            return Ok(());
        }

        if self.options.create_backup
        {
            let info = self
                .backups
                .backup_file(&plan.op.path)
                .map_err(|e| ApplyError::from_anyhow(&plan.op.path, &e))?;
            plan.backup = Some(info);
        }
        else if self.options.rollback_on_failure
        {
            let bytes = fs::read(&plan.abs).map_err(|e| ApplyError::from_anyhow(&plan.op.path, &anyhow::Error::new(e)))?;
            plan.preimage = Some(bytes);
        }
        Ok(())
    }

    /// Sequence a write behind earlier writes to the same path: shift its
    /// line range and back up the intermediate content.
    fn prepare_repeat_write(
        &self,
        plan: &mut Planned,
        shifts: &HashMap<String, Vec<(LineRange, isize)>>,
    ) -> Result<(), ApplyError>
    {
        if !plan.backup_deferred
        {
            return Ok(());
        }
        if let Some(range) = plan.op.line_range
            && let Some(earlier) = shifts.get(&plan.op.path)
        {
            plan.op.line_range = Some(shift_range(range, earlier).map_err(|m| ApplyError::validation(&plan.op.path, m))?);
        }
        plan.existed = plan
            .abs
            .is_file();
        plan.backup_deferred = false;
        self.take_backup(plan)
    }

    fn write_one(
        &self,
        plan: &mut Planned,
        created_dirs: &mut Vec<PathBuf>,
        observer: &mut dyn ApplyObserver,
    ) -> Result<ApplyResult, (ApplyError, Option<ConflictInfo>)>
    {
        let path = plan
            .op
            .path
            .clone();
        let fail = |e: anyhow::Error| -> (ApplyError, Option<ConflictInfo>) { (ApplyError::from_anyhow(&path, &e), None) };

        let (written, warnings) = match plan.op.kind
        {
            OperationKind::Create | OperationKind::Modify =>
            {
                let rendered = self
                    .render(plan)
                    .map_err(|e| (e, None))?;
                self.recheck(plan, Some(&rendered.hash), observer)?;

                let no_changes = rendered
                    .old_bytes
                    .as_deref()
                    == Some(rendered.bytes.as_slice());
                if !no_changes
                {
                    if let Some(parent) = plan.abs.parent()
                    {
                        create_dirs(parent, created_dirs).map_err(fail)?;
                    }
                    io::write_atomic(&plan.abs, &rendered.bytes).map_err(fail)?;
                    if self.options.verify_after_write
                    {
                        let actual = io::sha256_file(&plan.abs).map_err(fail)?;
                        if actual != rendered.hash
                        {
                            return Err((
                                ApplyError::Other { path: path.clone(), message: "content verification failed after write".into() },
                                None,
                            ));
                        }
                    }
                }
                let written = Written {
                    before_hash: rendered
                        .old_bytes
                        .as_deref()
                        .map(io::sha256_bytes),
                    after_hash: Some(rendered.hash),
                    before_size: rendered
                        .old_bytes
                        .as_ref()
                        .map_or(0, |b| b.len() as u64),
                    after_size: rendered.bytes.len() as u64,
                    stats: DiffStats::between(&rendered.old_text, &rendered.new_text),
                    no_changes,
                };
                (written, rendered.warnings)
            }
            OperationKind::Delete =>
            {
                self.recheck(plan, None, observer)?;
                let bytes = fs::read(&plan.abs)
                    .map_err(|e| fail(anyhow::Error::new(e).context(format!("read {}", plan.abs.display()))))?;
                let old_text = String::from_utf8_lossy(&bytes).into_owned();
                fs::remove_file(&plan.abs)
                    .map_err(|e| fail(anyhow::Error::new(e).context(format!("remove {}", plan.abs.display()))))?;
                let written = Written {
                    before_hash: Some(io::sha256_bytes(&bytes)),
                    after_hash: None,
                    before_size: bytes.len() as u64,
                    after_size: 0,
                    stats: DiffStats::between(&old_text, ""),
                    no_changes: false,
                };
                (written, Vec::new())
            }
            OperationKind::Rename | OperationKind::Move =>
            {
                self.recheck(plan, None, observer)?;
                let Some(target) = plan.new_abs.clone()
                else
                {
                    return Err((ApplyError::validation(&path, "relocation has no target path"), None));
                };
                if target.exists()
                {
                    let dest = plan
                        .op
                        .new_path
                        .clone()
                        .unwrap_or_default();
                    return Err((
                        ApplyError::Conflict { path: dest.clone(), description: format!("{dest} appeared before the move") },
                        None,
                    ));
                }
                if let Some(parent) = target.parent()
                {
                    create_dirs(parent, created_dirs).map_err(fail)?;
                }
                let hash = io::sha256_file(&plan.abs).map_err(fail)?;
                let size = fs::metadata(&plan.abs).map_or(0, |m| m.len());
                fs::rename(&plan.abs, &target).map_err(|e| {
                    fail(anyhow::Error::new(e).context(format!("rename {} to {}", plan.abs.display(), target.display())))
                })?;
                let written = Written {
                    before_hash: Some(hash.clone()),
                    after_hash: Some(hash),
                    before_size: size,
                    after_size: size,
                    stats: DiffStats::default(),
                    no_changes: false,
                };
                (written, Vec::new())
            }
            OperationKind::Mkdir | OperationKind::Unknown =>
            {
                return Err((ApplyError::validation(&path, "not a file write"), None));
            }
        };

        let result_type = if written.no_changes
        {
            ApplyResultType::NoChanges
        }
        else if warnings.is_empty()
        {
            ApplyResultType::Success
        }
        else
        {
            ApplyResultType::SuccessWithWarnings
        };
        let mut result = ApplyResult::new(&plan.op, result_type);
        result.stats = written.stats;
        result.backup = plan
            .backup
            .clone();
        result.warnings = warnings;
        info!(path = %path, kind = ?plan.op.kind, added = written.stats.lines_added, removed = written.stats.lines_removed, "file applied");
        plan.applied = Some(written);
        Ok(result)
    }

    /// Conflict check as the last step before touching the file.
    fn recheck(
        &self,
        plan: &Planned,
        proposed_hash: Option<&str>,
        observer: &mut dyn ApplyObserver,
    ) -> Result<(), (ApplyError, Option<ConflictInfo>)>
    {
        if !self.options.check_for_conflicts
        {
            return Ok(());
        }
        let check = self
            .detector
            .check(plan.op.snapshot.as_ref(), &plan.op.path, plan.op.kind, proposed_hash, plan.overwrite_authorized)
            .map_err(|e| (ApplyError::from_anyhow(&plan.op.path, &e), None))?;
        if check.is_blocking() && !observer.on_conflict(&check.info)
        {
            let err = ApplyError::Conflict { path: plan.op.path.clone(), description: check.info.description.clone() };
            return Err((err, Some(check.info)));
        }
        Ok(())
    }

    /// Final bytes for a create/modify, keeping the existing layout.
    fn render(
        &self,
        plan: &Planned,
    ) -> Result<Rendered, ApplyError>
    {
        let path = &plan.op.path;
        let content = plan
            .op
            .content
            .as_deref()
            .unwrap_or("");
        let mut warnings = Vec::new();

        let (old_bytes, old_text, layout) = if plan.abs.is_file()
        {
            let bytes = fs::read(&plan.abs).map_err(|e| ApplyError::from_anyhow(path, &anyhow::Error::new(e)))?;
            if self.options.validate_text_file && !io::is_probably_text(&bytes)
            {
                return Err(ApplyError::validation(path, "existing file is not a text file"));
            }
            let encoding = TextEncoding::detect(&bytes);
            let text = encoding
                .decode(&bytes)
                .map_err(|e| ApplyError::validation(path, format!("{e:#}")))?;
            let layout = TextLayout::detect(&bytes, &text);
            (Some(bytes), text, layout)
        }
        else
        {
            (None, String::new(), TextLayout::fresh())
        };

        let old_lf = LineEnding::Lf.apply(&old_text);
        let body = match (plan.op.line_range, old_bytes.is_some())
        {
            (Some(range), true) => splice_lines(&old_lf, range, content).map_err(|e| ApplyError::validation(path, e))?,
            (Some(_), false) =>
            {
                warnings.push("line range ignored for a new file".to_string());
                LineEnding::Lf.apply(content)
            }
            (None, _) => LineEnding::Lf.apply(content),
        };

        let fresh = TextLayout::fresh();
        let encoding = if self.options.preserve_encoding { layout.encoding } else { fresh.encoding };
        let (line_ending, final_newline) = if self.options.preserve_line_endings
        {
            (layout.line_ending, layout.final_newline)
        }
        else
        {
            (fresh.line_ending, fresh.final_newline)
        };
        let final_newline = final_newline || old_bytes.is_none() || old_text.is_empty();

        let mut new_lf = body.trim_end_matches('\n').to_string();
        if final_newline && !new_lf.is_empty()
        {
            new_lf.push('\n');
        }
        let text = line_ending.apply(&new_lf);
        let bytes = encoding.encode(&text);
        if bytes.len() as u64 > self.options.max_file_size_bytes
        {
            return Err(ApplyError::validation(path, "result exceeds the maximum file size"));
        }

        Ok(Rendered {
            hash: io::sha256_bytes(&bytes),
            bytes,
            old_bytes,
            old_text: old_lf,
            new_text: new_lf,
            warnings,
        })
    }

    fn finalize(
        &self,
        plans: &[Planned],
        batch: &mut BatchApplyResult,
        observer: &mut dyn ApplyObserver,
    )
    {
        let now = self
            .clock
            .now();
        for plan in plans
        {
            let Some(written) = &plan.applied
            else
            {
                continue;
            };
            if written.no_changes || plan.op.kind == OperationKind::Mkdir
            {
                continue;
            }
            let record = self.change_record(plan, written, now);
            let undoable = match record.change_type
            {
                ChangeType::Modified | ChangeType::Deleted => record
                    .backup_id
                    .is_some(),
                ChangeType::Created => !plan.existed || record
                    .backup_id
                    .is_some(),
                ChangeType::Renamed | ChangeType::Moved => true,
            };

            if let Some(result) = batch
                .results
                .get_mut(&plan.index)
            {
                result.change_id = Some(record.id.clone());
            }

            if self.options.track_for_undo
                && undoable
                && let Some(undo) = &self.undo
            {
                undo.register(record.clone());
                observer.on_undo_available(&record);
                if let Some(result) = batch
                    .results
                    .get_mut(&plan.index)
                {
                    result.undo_available = true;
                }
            }
        }

        let pinned = self
            .undo
            .as_ref()
            .map(|u| u.pinned_backups())
            .unwrap_or_default();
        if let Err(e) = self
            .backups
            .enforce_retention_except(&pinned)
        {
            warn!(error = %format!("{e:#}"), "backup retention failed");
        }
    }

    fn change_record(
        &self,
        plan: &Planned,
        written: &Written,
        now: DateTime<Utc>,
    ) -> FileChangeRecord
    {
        let change_type = match plan.op.kind
        {
            OperationKind::Create if !plan.existed => ChangeType::Created,
            OperationKind::Create | OperationKind::Modify => ChangeType::Modified,
            OperationKind::Delete => ChangeType::Deleted,
            OperationKind::Rename => ChangeType::Renamed,
            OperationKind::Move => ChangeType::Moved,
            OperationKind::Mkdir | OperationKind::Unknown => ChangeType::Created,
        };
        FileChangeRecord {
            id: backup::generate_id(now),
            block_id: plan
                .op
                .source_block
                .clone(),
            message_id: plan
                .op
                .message_id
                .clone(),
            conversation_id: self
                .conversation_id
                .clone(),
            change_type,
            path: plan
                .op
                .path
                .clone(),
            new_path: plan
                .op
                .new_path
                .clone(),
            before_hash: written
                .before_hash
                .clone(),
            after_hash: written
                .after_hash
                .clone(),
            before_size: written.before_size,
            after_size: written.after_size,
            lines_added: written.stats.lines_added + written.stats.lines_modified,
            lines_removed: written.stats.lines_removed + written.stats.lines_modified,
            backup_id: plan
                .backup
                .as_ref()
                .map(|b| b.id.clone()),
            backup_path: plan
                .backup
                .as_ref()
                .map(|b| self.backups.path_of(b)),
            applied_at: now,
            undone: false,
            undone_at: None,
        }
    }

    /// Undo every applied operation in reverse order.
    fn rollback(
        &self,
        plans: &mut [Planned],
        created_dirs: &[PathBuf],
        batch: &mut BatchApplyResult,
    )
    {
        warn!("rolling back batch");
        batch.was_rolled_back = true;

        for plan in plans
            .iter_mut()
            .rev()
        {
            let Some(written) = plan
                .applied
                .take()
            else
            {
                continue;
            };
            let outcome = match plan.op.kind
            {
                OperationKind::Mkdir => Ok(()),
                _ if written.no_changes => Ok(()),
                OperationKind::Rename | OperationKind::Move => match &plan.new_abs
                {
                    Some(target) => fs::rename(target, &plan.abs).map_err(anyhow::Error::from),
                    None => Ok(()),
                },
                OperationKind::Create if !plan.existed => match fs::remove_file(&plan.abs)
                {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                    _ => Ok(()),
                },
                _ => self.restore_preimage(plan),
            };

            match outcome
            {
                Ok(()) => debug!(path = %plan.op.path, "rolled back"),
                Err(e) => warn!(path = %plan.op.path, error = %format!("{e:#}"), "rollback step failed"),
            }
            if let Some(result) = batch
                .results
                .get_mut(&plan.index)
            {
                result.rolled_back = true;
                result.success = false;
                result.undo_available = false;
            }
        }

        // Deepest first; only directories this batch created and left empty
        for dir in created_dirs
            .iter()
            .rev()
        {
            let _ = fs::remove_dir(dir);
        }
    }

    fn restore_preimage(
        &self,
        plan: &Planned,
    ) -> anyhow::Result<()>
    {
        if let Some(backup) = &plan.backup
        {
            self.backups
                .restore(&backup.id)?;
            return Ok(());
        }
        match &plan.preimage
        {
            Some(bytes) =>
            {
                if let Some(parent) = plan
                    .abs
                    .parent()
                {
                    fs::create_dir_all(parent)?;
                }
                io::write_atomic(&plan.abs, bytes)
            }
            None => anyhow::bail!("no backup or pre-image for {}", plan.op.path),
        }
    }
}

struct Rendered
{
    bytes: Vec<u8>,
    hash: String,
    old_bytes: Option<Vec<u8>>,
    old_text: String,
    new_text: String,
    warnings: Vec<String>,
}

/// Replace 1-based inclusive `range` of `old` with `replacement`.
fn splice_lines(
    old: &str,
    range: LineRange,
    replacement: &str,
) -> Result<String, String>
{
    let lines: Vec<&str> = old
        .lines()
        .collect();
    if range.start == 0 || range.start > lines.len() + 1
    {
        return Err(format!("line range {}-{} is outside the file ({} lines)", range.start, range.end, lines.len()));
    }
    let end = range
        .end
        .min(lines.len());

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..range.start - 1]);
    out.extend(
        replacement
            .trim_end_matches('\n')
            .lines(),
    );
    if end >= range.start - 1
    {
        out.extend_from_slice(&lines[end.max(range.start - 1)..]);
    }

    let mut joined = out.join("\n");
    if old.ends_with('\n')
    {
        joined.push('\n');
    }
    Ok(joined)
}

/// Remember the line-count change of a range edit that was just written,
/// under the range it was submitted with.
fn record_shift(
    plan: &Planned,
    submitted: Option<LineRange>,
    shifts: &mut HashMap<String, Vec<(LineRange, isize)>>,
)
{
    let (Some(range), Some(written)) = (submitted, &plan.applied)
    else
    {
        return;
    };
    let delta = written.stats.lines_added as isize - written.stats.lines_removed as isize;
    shifts
        .entry(plan.op.path.clone())
        .or_default()
        .push((range, delta));
}

/// Move `range` past the line-count changes of `earlier` edits that sit
/// above it. Ranges are in the coordinates of the file before the batch.
fn shift_range(
    range: LineRange,
    earlier: &[(LineRange, isize)],
) -> Result<LineRange, String>
{
    let mut offset = 0isize;
    for (prev, delta) in earlier
    {
        if prev.end < range.start
        {
            offset += delta;
        }
        else if prev.start <= range.end
        {
            return Err(format!(
                "line range {}-{} overlaps an earlier edit to lines {}-{}",
                range.start, range.end, prev.start, prev.end
            ));
        }
    }
    let start = range.start as isize + offset;
    let end = range.end as isize + offset;
    if start < 1
    {
        return Err(format!("line range {}-{} no longer exists after earlier edits", range.start, range.end));
    }
    LineRange::new(start as usize, end as usize).ok_or_else(|| format!("line range {}-{} is invalid", range.start, range.end))
}

fn covered_by_mkdir(
    dir: &str,
    mkdirs: &[String],
) -> bool
{
    mkdirs
        .iter()
        .any(|m| m == dir || m.starts_with(&format!("{dir}/")))
}

/// `create_dir_all`, remembering which levels did not exist before.
fn create_dirs(
    dir: &Path,
    created: &mut Vec<PathBuf>,
) -> anyhow::Result<()>
{
    use anyhow::Context;

    let mut missing: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|p| !p.exists())
        .map(Path::to_path_buf)
        .collect();
    if missing.is_empty()
    {
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    missing.reverse();
    let known: HashSet<PathBuf> = created
        .iter()
        .cloned()
        .collect();
    created.extend(
        missing
            .into_iter()
            .filter(|p| !known.contains(p)),
    );
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::proposal::FileOperation;
    use crate::infra::config::BackupOptions;
    use tempfile::TempDir;

    fn engine(tmp: &TempDir) -> ApplyEngine
    {
        let backups = Arc::new(BackupManager::open(tmp.path(), BackupOptions::default()).unwrap());
        ApplyEngine::new(tmp.path(), ApplyOptions::default(), backups)
    }

    #[test]
    fn result_type_families()
    {
        assert!(ApplyResultType::NoChanges.is_success());
        assert!(!ApplyResultType::Conflict.is_success());
        assert!(ApplyResultType::FileLocked.is_retryable());
        assert!(!ApplyResultType::DiskFull.is_retryable());
        assert_eq!(ApplyResultType::PathOutsideWorkspace.code(), 17);

        let e = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(ApplyResultType::from_io(&e), ApplyResultType::FileNotFound);
    }

    #[test]
    fn diff_stats_pair_replacements()
    {
        let s = DiffStats::between("a\nb\nc\n", "a\nB\nc\nd\n");
        assert_eq!(s.lines_modified, 1);
        assert_eq!(s.lines_added, 1);
        assert_eq!(s.lines_removed, 0);
    }

    #[test]
    fn splices_inclusive_ranges()
    {
        let out = splice_lines("1\n2\n3\n4\n", LineRange::new(2, 3).unwrap(), "x\ny\nz").unwrap();
        assert_eq!(out, "1\nx\ny\nz\n4\n");
        assert!(splice_lines("1\n", LineRange::new(5, 6).unwrap(), "x").is_err());
    }

    #[test]
    fn later_ranges_follow_earlier_edits()
    {
        let r = |a, b| LineRange::new(a, b).unwrap();
        let earlier = [(r(2, 2), 2isize)];
        assert_eq!(shift_range(r(5, 5), &earlier).unwrap(), r(7, 7));
        assert_eq!(shift_range(r(1, 1), &earlier).unwrap(), r(1, 1));
        assert!(shift_range(r(1, 3), &earlier).is_err());
    }

    #[test]
    fn create_writes_file_and_parents()
    {
        let tmp = TempDir::new().unwrap();
        let op = FileOperation::new("src/deep/a.rs", OperationKind::Create).with_content("fn a() {}");
        let r = engine(&tmp).apply_one(&op, &mut NoopObserver);
        assert_eq!(r.result_type, ApplyResultType::Success);
        assert_eq!(fs::read_to_string(tmp.path().join("src/deep/a.rs")).unwrap(), "fn a() {}\n");
        assert_eq!(r.stats.lines_added, 1);
    }

    #[test]
    fn modify_keeps_crlf_and_bom()
    {
        let tmp = TempDir::new().unwrap();
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"one\r\ntwo\r\n");
        fs::write(tmp.path().join("a.txt"), &bytes).unwrap();

        let op = FileOperation::new("a.txt", OperationKind::Modify).with_content("one\nthree\n");
        let r = engine(&tmp).apply_one(&op, &mut NoopObserver);
        assert!(r.success, "{:?}", r.message);
        assert!(r.backup.is_some());

        let mut expected = vec![0xEF, 0xBB, 0xBF];
        expected.extend_from_slice(b"one\r\nthree\r\n");
        assert_eq!(fs::read(tmp.path().join("a.txt")).unwrap(), expected);
    }

    #[test]
    fn escaping_path_is_rejected()
    {
        let tmp = TempDir::new().unwrap();
        let op = FileOperation {
            path: "../evil.rs".into(),
            ..FileOperation::new("x", OperationKind::Create).with_content("x")
        };
        let r = engine(&tmp).apply_one(&op, &mut NoopObserver);
        assert_eq!(r.result_type, ApplyResultType::PathOutsideWorkspace);
    }

    #[test]
    fn identical_content_is_no_change()
    {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "same\n").unwrap();
        let op = FileOperation::new("a.txt", OperationKind::Modify).with_content("same\n");
        let r = engine(&tmp).apply_one(&op, &mut NoopObserver);
        assert_eq!(r.result_type, ApplyResultType::NoChanges);
    }
}
