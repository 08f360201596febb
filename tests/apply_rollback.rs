//! Batch apply: rollback restores every touched file byte-for-byte, and
//! creates never clobber files that appeared after the proposal.

use std::{fs, path::Path, sync::Arc};

use fenceline::core::apply_engine::{
    ApplyEngine, ApplyObserver, ApplyResult, ApplyResultType, CancellationToken, NoopObserver,
};
use fenceline::core::backup::BackupManager;
use fenceline::core::block::LineRange;
use fenceline::core::conflict::{ConflictDetector, ConflictInfo};
use fenceline::core::proposal::{FileOperation, OperationKind};
use fenceline::infra::config::{ApplyOptions, BackupOptions};
use tempfile::TempDir;

fn write_file(
    root: &Path,
    rel: &str,
    body: &[u8],
)
{
    let p = root.join(rel);
    if let Some(parent) = p.parent()
    {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(p, body).unwrap();
}

fn engine(
    root: &Path,
    options: ApplyOptions,
) -> ApplyEngine
{
    let backups = Arc::new(BackupManager::open(root, BackupOptions::default()).unwrap());
    ApplyEngine::new(root, options, backups)
}

/// Operation with a snapshot taken now, in the given order.
fn op(
    root: &Path,
    rel: &str,
    kind: OperationKind,
    content: Option<&str>,
    order: usize,
) -> FileOperation
{
    let mut o = FileOperation::new(rel, kind);
    if let Some(c) = content
    {
        o = o.with_content(c);
    }
    o.order = order;
    o.snapshot = ConflictDetector::new(root)
        .snapshot(rel)
        .ok();
    o
}

/// Edits `victim` on disk right after `trigger` has been written.
struct MeddlingObserver
{
    root: std::path::PathBuf,
    trigger: String,
    victim: String,
    conflicts: Vec<ConflictInfo>,
}

impl ApplyObserver for MeddlingObserver
{
    fn on_file_changed(
        &mut self,
        result: &ApplyResult,
    )
    {
        if result.path == self.trigger
        {
            fs::write(self.root.join(&self.victim), b"edited by someone else\n").unwrap();
        }
    }

    fn on_conflict(
        &mut self,
        conflict: &ConflictInfo,
    ) -> bool
    {
        self.conflicts
            .push(conflict.clone());
        false
    }
}

#[test]
fn mid_batch_conflict_rolls_back_to_identical_bytes()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let a_before = b"\xEF\xBB\xBFfirst\r\nsecond\r\n".to_vec();
    write_file(root, "src/a.txt", &a_before);
    write_file(root, "src/b.txt", b"beta\n");

    let ops = vec![
        op(root, "src/a.txt", OperationKind::Modify, Some("FIRST\nsecond\n"), 0),
        op(root, "src/new/c.txt", OperationKind::Create, Some("gamma\n"), 1),
        op(root, "src/b.txt", OperationKind::Modify, Some("BETA\n"), 2),
    ];

    let mut observer = MeddlingObserver {
        root: root.to_path_buf(),
        trigger: "src/new/c.txt".into(),
        victim: "src/b.txt".into(),
        conflicts: Vec::new(),
    };
    let batch = engine(root, ApplyOptions::batch()).apply_batch(&ops, &mut observer, &CancellationToken::new());

    assert!(batch.was_rolled_back);
    assert!(!batch.all_succeeded());
    assert_eq!(
        batch
            .get("src/b.txt")
            .unwrap()
            .result_type,
        ApplyResultType::Conflict
    );
    assert_eq!(observer.conflicts.len(), 1);

    assert_eq!(fs::read(root.join("src/a.txt")).unwrap(), a_before);
    assert!(!root.join("src/new/c.txt").exists());
    assert!(!root.join("src/new").exists());
    assert_eq!(fs::read(root.join("src/b.txt")).unwrap(), b"edited by someone else\n");
}

#[test]
fn create_never_overwrites_a_file_that_appeared_later()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let create = op(root, "late.txt", OperationKind::Create, Some("from the model\n"), 0);

    write_file(root, "late.txt", b"written by the user\n");

    let result = engine(root, ApplyOptions::default()).apply_one(&create, &mut NoopObserver);
    assert!(!result.success);
    assert_eq!(result.result_type, ApplyResultType::Conflict);
    assert_eq!(fs::read(root.join("late.txt")).unwrap(), b"written by the user\n");
}

#[test]
fn create_onto_unchanged_existing_file_is_a_conflict()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "a.txt", b"old\n");
    let create = op(root, "a.txt", OperationKind::Create, Some("new\n"), 0);

    let batch = engine(root, ApplyOptions::batch()).apply_batch(&[create], &mut NoopObserver, &CancellationToken::new());

    let result = batch
        .get("a.txt")
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.result_type, ApplyResultType::Conflict);
    assert_eq!(fs::read(root.join("a.txt")).unwrap(), b"old\n");
}

#[test]
fn authorized_overwrite_backs_up_the_late_file()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let create = op(root, "late.txt", OperationKind::Create, Some("from the model\n"), 0);
    write_file(root, "late.txt", b"written by the user\n");

    let options = ApplyOptions { allow_conflict_overwrite: true, ..ApplyOptions::default() };
    let result = engine(root, options).apply_one(&create, &mut NoopObserver);

    assert!(result.success);
    let backup = result
        .backup
        .expect("overwritten file is backed up");
    assert_eq!(backup.original_path, "late.txt");
    assert_eq!(fs::read_to_string(root.join("late.txt")).unwrap(), "from the model\n");
}

#[test]
fn failed_validation_aborts_whole_batch_when_rolling_back()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "keep.txt", b"keep\n");

    let ops = vec![
        op(root, "keep.txt", OperationKind::Modify, Some("changed\n"), 0),
        op(root, "missing.txt", OperationKind::Modify, Some("x\n"), 1),
    ];
    let batch = engine(root, ApplyOptions::batch()).apply_batch(&ops, &mut NoopObserver, &CancellationToken::new());

    assert_eq!(
        batch
            .get("missing.txt")
            .unwrap()
            .result_type,
        ApplyResultType::FileNotFound
    );
    assert_eq!(
        batch
            .get("keep.txt")
            .unwrap()
            .result_type,
        ApplyResultType::Skipped
    );
    assert_eq!(fs::read_to_string(root.join("keep.txt")).unwrap(), "keep\n");
}

#[test]
fn without_rollback_valid_operations_still_apply()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "keep.txt", b"keep\n");

    let ops = vec![
        op(root, "keep.txt", OperationKind::Modify, Some("changed\n"), 0),
        op(root, "missing.txt", OperationKind::Delete, None, 1),
    ];
    let options = ApplyOptions { rollback_on_failure: false, ..ApplyOptions::default() };
    let batch = engine(root, options).apply_batch(&ops, &mut NoopObserver, &CancellationToken::new());

    assert_eq!(batch.succeeded, 1);
    assert_eq!(batch.failed, 1);
    assert!(!batch.was_rolled_back);
    assert_eq!(fs::read_to_string(root.join("keep.txt")).unwrap(), "changed\n");
}

#[test]
fn cancelled_batch_leaves_remaining_files_untouched()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let ops = vec![op(root, "a.txt", OperationKind::Create, Some("a\n"), 0)];
    let batch = engine(root, ApplyOptions::default()).apply_batch(&ops, &mut NoopObserver, &cancel);

    assert!(batch.was_cancelled);
    assert_eq!(
        batch
            .get("a.txt")
            .unwrap()
            .result_type,
        ApplyResultType::Cancelled
    );
    assert!(!root.join("a.txt").exists());
}

const SIX_LINES: &str = "l1\nl2\nl3\nl4\nl5\nl6\n";

fn range_edit(
    root: &Path,
    start: usize,
    end: usize,
    content: &str,
    order: usize,
) -> FileOperation
{
    let mut o = op(root, "lib.rs", OperationKind::Modify, Some(content), order);
    o.line_range = LineRange::new(start, end);
    o
}

#[test]
fn two_range_edits_to_one_file_both_apply()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "lib.rs", SIX_LINES.as_bytes());

    let ops = vec![range_edit(root, 2, 2, "two a\ntwo b", 0), range_edit(root, 5, 5, "FIVE", 1)];
    let batch = engine(root, ApplyOptions::batch()).apply_batch(&ops, &mut NoopObserver, &CancellationToken::new());

    assert!(!batch.was_rolled_back);
    assert_eq!(batch.results.len(), 2);
    assert!(batch.all_succeeded());
    assert_eq!(
        batch
            .for_path("lib.rs")
            .count(),
        2
    );
    assert!(
        batch
            .at(1)
            .unwrap()
            .backup
            .is_some()
    );
    assert_eq!(
        fs::read_to_string(root.join("lib.rs")).unwrap(),
        "l1\ntwo a\ntwo b\nl3\nl4\nFIVE\nl6\n"
    );
}

#[test]
fn range_edits_to_one_file_roll_back_together()
{
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "lib.rs", SIX_LINES.as_bytes());
    write_file(root, "other.txt", b"other\n");

    let ops = vec![
        range_edit(root, 5, 5, "FIVE", 0),
        range_edit(root, 2, 3, "", 1),
        op(root, "other.txt", OperationKind::Modify, Some("OTHER\n"), 2),
    ];
    let mut observer = MeddlingObserver {
        root: root.to_path_buf(),
        trigger: "lib.rs".into(),
        victim: "other.txt".into(),
        conflicts: Vec::new(),
    };
    let batch = engine(root, ApplyOptions::batch()).apply_batch(&ops, &mut observer, &CancellationToken::new());

    assert!(batch.was_rolled_back);
    assert_eq!(batch.results.len(), 3);
    assert_eq!(
        batch
            .at(2)
            .unwrap()
            .result_type,
        ApplyResultType::Conflict
    );
    assert_eq!(fs::read_to_string(root.join("lib.rs")).unwrap(), SIX_LINES);
}
