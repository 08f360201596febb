//! `fln backup`: list, health, restore and cleanup for the backup store.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde_json::json;

use crate::cli::{
    AppContext, BackupArgs, BackupCleanupArgs, BackupHealthArgs, BackupListArgs, BackupRestoreArgs,
    BackupSubcommand,
};
use crate::cli_ext::common::{workspace_config, workspace_root};
use crate::core::backup::{BackupInfo, BackupManager};
use crate::core::backup_ops::{
    CleanupRequest, ListRequest, StorageHealth, cleanup_backups, list_backups_filtered, resolve_backup_id,
    storage_report,
};

pub fn backup_run(args: BackupArgs, ctx: &AppContext) -> Result<()> {
    let root = workspace_root(&args.root)?;
    let cfg = workspace_config(&root)?;
    let manager = BackupManager::open(&root, cfg.backup)?;

    match args.command {
        BackupSubcommand::List(a) => backup_list(&manager, &a, ctx),
        BackupSubcommand::Health(a) => backup_health(&manager, &a, ctx),
        BackupSubcommand::Restore(a) => backup_restore(&manager, &a, ctx),
        BackupSubcommand::Cleanup(a) => backup_cleanup(&manager, &a, ctx),
    }
}

fn backup_list(manager: &BackupManager, a: &BackupListArgs, ctx: &AppContext) -> Result<()> {
    let req = ListRequest {
        path: a.path.clone(),
        since: a.since.clone(),
        limit: a.limit,
        sort_desc: !a.sort.eq_ignore_ascii_case("asc"),
    };
    let backups = list_backups_filtered(manager, req)?;

    if a.json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }

    if backups.is_empty() {
        if !ctx.quiet {
            println!("No backups found.");
        }
        return Ok(());
    }

    for b in &backups {
        print_backup_line(b);
    }
    Ok(())
}

fn print_backup_line(b: &BackupInfo) {
    let verified = if b.verified { "verified" } else { "unverified" };
    println!(
        "{timestamp:<19} {id:<30} {size:>9}B {verified:<10} {path}",
        timestamp = b.created_at.format("%Y-%m-%d %H:%M:%S"),
        id = b.id,
        size = b.size,
        verified = verified,
        path = b.original_path
    );
}

fn backup_health(manager: &BackupManager, a: &BackupHealthArgs, ctx: &AppContext) -> Result<()> {
    let report = storage_report(manager);

    if a.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let label = format!("{:?}", report.health);
    let label = if ctx.no_color {
        label
    } else {
        match report.health {
            StorageHealth::Healthy => label.green().to_string(),
            StorageHealth::Warning => label.yellow().to_string(),
            StorageHealth::Critical | StorageHealth::Unavailable => label.red().bold().to_string(),
        }
    };
    println!("health: {label}");
    println!("store: {}", report.store.display());
    println!("backups: {}", report.backup_count);
    println!("total_bytes: {}", report.total_bytes);
    if let Some(free) = report.free_bytes {
        println!("free_bytes: {free}");
    }
    if !report.orphaned.is_empty() {
        println!("orphaned files: {}", report.orphaned.len());
        for p in report.orphaned.iter().take(5) {
            println!("  - {}", p.display());
        }
    }
    if !report.corrupted.is_empty() {
        println!("corrupted backups: {}", report.corrupted.join(", "));
    }
    for m in &report.messages {
        println!("note: {m}");
    }
    Ok(())
}

fn backup_restore(manager: &BackupManager, a: &BackupRestoreArgs, ctx: &AppContext) -> Result<()> {
    let id = resolve_backup_id(manager, &a.id)?;

    if ctx.dry_run {
        let target = manager
            .get(&id)
            .map(|b| b.original_path)
            .unwrap_or_default();
        if a.json {
            println!("{}", serde_json::to_string_pretty(&json!({ "id": id, "path": target, "dry_run": true }))?);
        } else {
            println!("dry-run: would restore {id} over {target}");
        }
        return Ok(());
    }

    let info = manager.restore(&id)?;
    if a.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else if !ctx.quiet {
        println!("Restored {} from {}", info.original_path, info.id);
    }
    Ok(())
}

fn backup_cleanup(manager: &BackupManager, a: &BackupCleanupArgs, ctx: &AppContext) -> Result<()> {
    let req = CleanupRequest {
        older_than: a.older_than.clone(),
        keep_latest: a.keep_latest,
        dry_run: ctx.dry_run,
    };
    let result = cleanup_backups(manager, req)?;

    if a.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let verb = if ctx.dry_run { "Would remove" } else { "Removed" };
    println!("{verb} {} backup(s), {} bytes", result.removed.len(), result.bytes_freed);
    for e in &result.errors {
        eprintln!("error: {e}");
    }
    Ok(())
}

