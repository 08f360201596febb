//! Integration tests for backup retention, cleanup and restore flows.

use std::{fs, path::Path, sync::Arc, time::Duration};

use chrono::{TimeDelta, TimeZone, Utc};
use fenceline::core::backup::BackupManager;
use fenceline::core::backup_ops::{
    CleanupRequest, ListRequest, StorageHealth, cleanup_backups, list_backups_filtered, resolve_backup_id,
    storage_report,
};
use fenceline::core::clock::{Clock, ManualClock};
use fenceline::infra::config::BackupOptions;
use tempfile::tempdir;

/// Create a simple text file under the workspace root.
fn write_file(
    root: &Path,
    rel: &str,
    body: &str,
)
{
    let p = root.join(rel);
    if let Some(parent) = p.parent()
    {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(p, body.as_bytes()).unwrap();
}

fn manager(
    root: &Path,
    options: BackupOptions,
) -> (BackupManager, Arc<ManualClock>)
{
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (BackupManager::open_with_clock(root, options, dyn_clock).unwrap(), clock)
}

/// Back up `rel` `n` times, one minute apart, with distinct content.
fn backup_versions(
    m: &BackupManager,
    clock: &ManualClock,
    rel: &str,
    n: usize,
)
{
    for i in 0..n
    {
        write_file(m.workspace_root(), rel, &format!("version {i}\n"));
        m.backup_file(rel).unwrap();
        clock.advance(TimeDelta::minutes(1));
    }
}

#[test]
fn per_file_ceiling_keeps_newest()
{
    let tmp = tempdir().unwrap();
    let opts = BackupOptions { max_backups_per_file: 3, ..BackupOptions::default() };
    let (m, clock) = manager(tmp.path(), opts);

    backup_versions(&m, &clock, "src/a.rs", 5);
    backup_versions(&m, &clock, "src/b.rs", 2);

    let evicted = m
        .enforce_retention()
        .unwrap();
    assert_eq!(evicted.len(), 2);

    let remaining: Vec<String> = m
        .list_for("src/a.rs")
        .into_iter()
        .map(|b| String::from_utf8(m.read_backup(&b.id).unwrap()).unwrap())
        .collect();
    assert_eq!(remaining, vec!["version 4\n", "version 3\n", "version 2\n"]);
    assert_eq!(m.list_for("src/b.rs").len(), 2);
}

#[test]
fn age_and_size_ceilings_apply_independently()
{
    let tmp = tempdir().unwrap();
    let opts = BackupOptions {
        max_backups_per_file: 0,
        max_backup_age: Duration::from_secs(3 * 60),
        max_total_storage_bytes: 0,
        ..BackupOptions::default()
    };
    let (m, clock) = manager(tmp.path(), opts);

    backup_versions(&m, &clock, "notes.md", 6);
    let evicted = m
        .enforce_retention()
        .unwrap();
    // Clock is at +6m; backups from +0m..+2m are older than 3 minutes
    assert_eq!(evicted.len(), 3);
    assert_eq!(m.list().len(), 3);
}

#[test]
fn cleanup_keep_latest_and_dry_run()
{
    let tmp = tempdir().unwrap();
    let (m, clock) = manager(tmp.path(), BackupOptions::default());
    backup_versions(&m, &clock, "x.txt", 4);

    let dry = cleanup_backups(&m, CleanupRequest { keep_latest: Some(1), dry_run: true, ..Default::default() }).unwrap();
    assert_eq!(dry.removed.len(), 3);
    assert_eq!(m.list().len(), 4);

    let real = cleanup_backups(&m, CleanupRequest { keep_latest: Some(1), ..Default::default() }).unwrap();
    assert_eq!(real.removed, dry.removed);
    assert!(real.errors.is_empty());
    assert_eq!(m.list().len(), 1);
}

#[test]
fn listing_filters_and_restore_by_latest()
{
    let tmp = tempdir().unwrap();
    let (m, clock) = manager(tmp.path(), BackupOptions::default());
    backup_versions(&m, &clock, "a.txt", 3);
    backup_versions(&m, &clock, "b.txt", 1);

    let recent = list_backups_filtered(
        &m,
        ListRequest { since: Some("2m".into()), limit: 10, sort_desc: true, ..Default::default() },
    )
    .unwrap();
    assert_eq!(
        recent
            .iter()
            .map(|b| b.original_path.as_str())
            .collect::<Vec<_>>(),
        vec!["b.txt", "a.txt"]
    );

    write_file(tmp.path(), "b.txt", "clobbered\n");
    let id = resolve_backup_id(&m, "latest").unwrap();
    let info = m
        .restore(&id)
        .unwrap();
    assert_eq!(info.original_path, "b.txt");
    assert_eq!(fs::read_to_string(tmp.path().join("b.txt")).unwrap(), "version 0\n");
}

#[test]
fn health_reports_orphans_and_corruption()
{
    let tmp = tempdir().unwrap();
    let (m, clock) = manager(tmp.path(), BackupOptions::default());
    backup_versions(&m, &clock, "a.txt", 1);
    assert_eq!(storage_report(&m).backup_count, 1);

    let info = &m.list()[0];
    fs::write(m.path_of(info), "tampered").unwrap();
    fs::write(
        m.store_dir()
            .join("stray.bak"),
        "?",
    )
    .unwrap();

    let report = storage_report(&m);
    assert_eq!(report.health, StorageHealth::Critical);
    assert_eq!(report.corrupted, vec![info.id.clone()]);
    assert_eq!(report.orphaned.len(), 1);
}
