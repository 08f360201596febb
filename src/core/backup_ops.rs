//! Backup store maintenance
//!
//! Retention planning, storage health, and the filtered listing / cleanup
//! operations behind `fln backup`. Eviction planning is pure so the
//! ceilings can be tested without touching disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::core::backup::{BackupInfo, BackupManager};
use crate::core::clock::{self, to_delta};
use crate::infra::config::BackupOptions;

/// Pick backups to evict, oldest first.
///
/// Three independent ceilings; a value of zero disables that ceiling:
/// - per original file, keep the newest `max_backups_per_file`
/// - drop anything older than `max_backup_age`
/// - then drop oldest until the total fits `max_total_storage_bytes`
///
/// Ids in `pinned` are never evicted; they still count toward the totals.
pub fn plan_evictions(
    entries: &[BackupInfo],
    options: &BackupOptions,
    now: DateTime<Utc>,
    pinned: &HashSet<String>,
) -> Vec<String> {
    let mut sorted: Vec<&BackupInfo> = entries.iter().collect();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut evict = vec![false; sorted.len()];

    if !options.max_backup_age.is_zero() {
        let cutoff = clock::sub_saturating(now, to_delta(options.max_backup_age));
        for (i, b) in sorted.iter().enumerate() {
            if b.created_at < cutoff {
                evict[i] = true;
            }
        }
    }

    if options.max_backups_per_file > 0 {
        let per_file = (0..sorted.len()).into_group_map_by(|&i| sorted[i].original_path.as_str());
        for idxs in per_file.values() {
            let surplus = idxs.len().saturating_sub(options.max_backups_per_file);
            for &i in &idxs[..surplus] {
                evict[i] = true;
            }
        }
    }

    for (i, b) in sorted.iter().enumerate() {
        if pinned.contains(&b.id) {
            evict[i] = false;
        }
    }

    if options.max_total_storage_bytes > 0 {
        let mut total: u64 = sorted
            .iter()
            .zip(&evict)
            .filter(|(_, e)| !**e)
            .map(|(b, _)| b.size)
            .sum();
        for (i, b) in sorted.iter().enumerate() {
            if total <= options.max_total_storage_bytes {
                break;
            }
            if !evict[i] && !pinned.contains(&b.id) {
                evict[i] = true;
                total -= b.size;
            }
        }
    }

    sorted
        .iter()
        .zip(evict)
        .filter(|(_, e)| *e)
        .map(|(b, _)| b.id.clone())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageHealth {
    Healthy,
    Warning,
    Critical,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageReport {
    pub health: StorageHealth,
    pub store: PathBuf,
    pub backup_count: usize,
    pub total_bytes: u64,
    pub free_bytes: Option<u64>,
    pub orphaned: Vec<PathBuf>,
    pub corrupted: Vec<String>,
    pub messages: Vec<String>,
}

/// Summarize the store: corrupted backups or critically low disk space are
/// Critical; orphans or low disk space are Warning.
pub fn storage_report(manager: &BackupManager) -> StorageReport {
    let options = manager.options();
    let store = manager.store_dir().to_path_buf();
    let mut messages = Vec::new();

    let (orphaned, corrupted) = match (manager.find_orphans(), manager.find_corrupted()) {
        (Ok(o), Ok(c)) => (o, c.into_iter().map(|b| b.id).collect::<Vec<_>>()),
        (Err(e), _) | (_, Err(e)) => {
            return StorageReport {
                health: StorageHealth::Unavailable,
                store,
                backup_count: 0,
                total_bytes: 0,
                free_bytes: None,
                orphaned: Vec::new(),
                corrupted: Vec::new(),
                messages: vec![format!("backup store unreadable: {e:#}")],
            };
        }
    };

    let free_bytes = free_space(&store);
    let mut health = StorageHealth::Healthy;

    if !corrupted.is_empty() {
        messages.push(format!("{} backup(s) missing or failing verification", corrupted.len()));
        health = StorageHealth::Critical;
    }
    if let Some(free) = free_bytes {
        if free < options.critical_free_space_bytes {
            messages.push(format!("only {free} bytes free on the backup volume"));
            health = StorageHealth::Critical;
        } else if free < options.warning_free_space_bytes {
            messages.push(format!("{free} bytes free on the backup volume"));
            health = worst(health, StorageHealth::Warning);
        }
    }
    if !orphaned.is_empty() {
        messages.push(format!("{} orphaned backup file(s)", orphaned.len()));
        health = worst(health, StorageHealth::Warning);
    }

    StorageReport {
        health,
        store,
        backup_count: manager.list().len(),
        total_bytes: manager.total_bytes(),
        free_bytes,
        orphaned,
        corrupted,
        messages,
    }
}

fn worst(a: StorageHealth, b: StorageHealth) -> StorageHealth {
    let rank = |h| match h {
        StorageHealth::Healthy => 0,
        StorageHealth::Warning => 1,
        StorageHealth::Critical => 2,
        StorageHealth::Unavailable => 3,
    };
    if rank(b) > rank(a) { b } else { a }
}

/// Bytes available to unprivileged users on the volume holding `path`.
#[cfg(unix)]
pub fn free_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    // SAFETY: statvfs only writes into the zeroed struct we own.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    #[allow(clippy::unnecessary_cast)]
    Some(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn free_space(_path: &Path) -> Option<u64> {
    None
}

/// Request structure for listing backups
#[derive(Debug, Default)]
pub struct ListRequest {
    pub path: Option<String>,
    pub since: Option<String>,
    pub limit: usize,
    pub sort_desc: bool,
}

pub fn list_backups_filtered(manager: &BackupManager, req: ListRequest) -> Result<Vec<BackupInfo>> {
    let since = req
        .since
        .as_deref()
        .map(|s| parse_relative_age(s, manager.now()))
        .transpose()?;

    let mut entries = match &req.path {
        Some(p) => manager.list_for(p),
        None => manager.list(),
    };
    if let Some(since) = since {
        entries.retain(|b| b.created_at >= since);
    }

    entries.sort_by(|a, b| {
        let ord = a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id));
        if req.sort_desc { ord.reverse() } else { ord }
    });
    if req.limit > 0 && entries.len() > req.limit {
        entries.truncate(req.limit);
    }
    Ok(entries)
}

/// Resolve an id: exact, `latest`, or a unique prefix/suffix of at least 6 chars.
pub fn resolve_backup_id(manager: &BackupManager, query: &str) -> Result<String> {
    let all = manager.list();
    if query == "latest" {
        return match all.last() {
            Some(b) => Ok(b.id.clone()),
            None => bail!("No backups recorded"),
        };
    }
    if let Some(b) = all.iter().find(|b| b.id == query) {
        return Ok(b.id.clone());
    }
    if query.len() < 6 {
        bail!("No backup found matching '{}'", query);
    }

    let matches: Vec<&str> = all
        .iter()
        .filter(|b| b.id.starts_with(query) || b.id.ends_with(query))
        .map(|b| b.id.as_str())
        .collect();
    match matches.as_slice() {
        [] => bail!("No backup found matching '{}'", query),
        [one] => Ok(one.to_string()),
        many => bail!("Ambiguous backup ID '{}'. Matches: {}", query, many.join(", ")),
    }
}

/// Request structure for cleanup operations
#[derive(Debug, Default)]
pub struct CleanupRequest {
    pub older_than: Option<String>,
    pub keep_latest: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CleanupResult {
    pub removed: Vec<String>,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

/// Remove backups by explicit age / keep-count, or by the configured
/// retention policy when neither is given.
pub fn cleanup_backups(manager: &BackupManager, req: CleanupRequest) -> Result<CleanupResult> {
    let now = manager.now();
    let entries = manager.list();

    let targets: Vec<String> = if req.older_than.is_none() && req.keep_latest.is_none() {
        plan_evictions(&entries, manager.options(), now, &HashSet::new())
    } else {
        let cutoff = req
            .older_than
            .as_deref()
            .map(|s| parse_relative_age(s, now))
            .transpose()?;
        let keep_from = req
            .keep_latest
            .map(|k| entries.len().saturating_sub(k))
            .unwrap_or(entries.len());
        entries
            .iter()
            .enumerate()
            .filter(|(i, b)| {
                let too_old = cutoff.is_some_and(|c| b.created_at < c);
                let beyond_keep = req.keep_latest.is_some() && *i < keep_from;
                match (cutoff.is_some(), req.keep_latest.is_some()) {
                    (true, true) => too_old && beyond_keep,
                    (true, false) => too_old,
                    _ => beyond_keep,
                }
            })
            .map(|(_, b)| b.id.clone())
            .collect()
    };

    let mut result = CleanupResult::default();
    for id in targets {
        let Some(info) = entries.iter().find(|b| b.id == id) else {
            continue;
        };
        if req.dry_run {
            result.bytes_freed += info.size;
            result.removed.push(id);
            continue;
        }
        match manager.delete(&id) {
            Ok(true) => {
                result.bytes_freed += info.size;
                result.removed.push(id);
            }
            Ok(false) => {}
            Err(e) => result.errors.push(format!("{id}: {e:#}")),
        }
    }
    Ok(result)
}

/// Parse `7d`, `12h`, `30m`, `45s` into the instant that long before `now`.
pub fn parse_relative_age(spec: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let spec = spec.trim();
    let Some(unit) = spec.chars().last() else {
        bail!("Empty time specification");
    };
    if !matches!(unit, 'd' | 'h' | 'm' | 's') {
        bail!("Invalid time unit in '{}'. Use d, h, m, or s", spec);
    }

    let number_str = &spec[..spec.len() - 1];
    let number: i64 = number_str
        .parse()
        .with_context(|| format!("Invalid number '{}' in time specification", number_str))?;
    if number < 0 {
        bail!("Negative durations are not allowed: '{}'", spec);
    }

    let duration = match unit {
        'd' => Duration::try_days(number),
        'h' => Duration::try_hours(number),
        'm' => Duration::try_minutes(number),
        _ => Duration::try_seconds(number),
    };
    match duration.and_then(|d| now.checked_sub_signed(d)) {
        Some(at) => Ok(at),
        None => bail!("Time specification '{}' is out of range", spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn info(id: &str, path: &str, age_secs: i64, size: u64, now: DateTime<Utc>) -> BackupInfo {
        BackupInfo {
            id: id.to_string(),
            backup_path: format!("{path}.{id}.bak"),
            original_path: path.to_string(),
            created_at: now - TimeDelta::seconds(age_secs),
            size,
            content_hash: None,
            verified: false,
        }
    }

    #[test]
    fn each_ceiling_evicts_oldest_first() {
        let now = Utc::now();
        let none = HashSet::new();
        let entries = vec![
            info("a1", "a.rs", 30, 10, now),
            info("a2", "a.rs", 20, 10, now),
            info("a3", "a.rs", 10, 10, now),
            info("b1", "b.rs", 5, 10, now),
        ];

        let per_file = BackupOptions {
            max_backups_per_file: 2,
            max_total_storage_bytes: 0,
            max_backup_age: std::time::Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(plan_evictions(&entries, &per_file, now, &none), vec!["a1"]);

        let by_age = BackupOptions {
            max_backups_per_file: 0,
            max_total_storage_bytes: 0,
            max_backup_age: std::time::Duration::from_secs(15),
            ..Default::default()
        };
        assert_eq!(plan_evictions(&entries, &by_age, now, &none), vec!["a1", "a2"]);

        let by_size = BackupOptions {
            max_backups_per_file: 0,
            max_total_storage_bytes: 25,
            max_backup_age: std::time::Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(plan_evictions(&entries, &by_size, now, &none), vec!["a1", "a2"]);
    }

    #[test]
    fn pinned_backups_survive_every_ceiling() {
        let now = Utc::now();
        let entries = vec![
            info("a1", "a.rs", 30, 10, now),
            info("a2", "a.rs", 20, 10, now),
            info("a3", "a.rs", 10, 10, now),
        ];
        let pinned: HashSet<String> = ["a1".to_string()].into();
        let opts = BackupOptions {
            max_backups_per_file: 1,
            max_total_storage_bytes: 15,
            max_backup_age: std::time::Duration::from_secs(25),
            ..Default::default()
        };
        assert_eq!(plan_evictions(&entries, &opts, now, &pinned), vec!["a2", "a3"]);
    }

    #[test]
    fn huge_age_ceiling_keeps_everything() {
        let now = Utc::now();
        let none = HashSet::new();
        let entries = vec![info("a1", "a.rs", 86_400 * 365, 10, now)];
        let opts = BackupOptions {
            max_backup_age: std::time::Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert!(plan_evictions(&entries, &opts, now, &none).is_empty());
    }

    #[test]
    fn within_limits_evicts_nothing() {
        let now = Utc::now();
        let none = HashSet::new();
        let entries = vec![info("a1", "a.rs", 1, 10, now)];
        assert!(plan_evictions(&entries, &BackupOptions::default(), now, &none).is_empty());
    }

    #[test]
    fn relative_age_parsing() {
        let now = Utc::now();
        assert_eq!(parse_relative_age("7d", now).unwrap(), now - Duration::days(7));
        assert_eq!(parse_relative_age(" 30m ", now).unwrap(), now - Duration::minutes(30));
        assert!(parse_relative_age("", now).is_err());
        assert!(parse_relative_age("5w", now).is_err());
        assert!(parse_relative_age("-1d", now).is_err());
        assert!(parse_relative_age("xd", now).is_err());
        assert!(parse_relative_age("100000000d", now).is_err());
        assert!(parse_relative_age("9999999999999999s", now).is_err());
    }

    #[test]
    fn health_of_fresh_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let opts = BackupOptions {
            warning_free_space_bytes: 0,
            critical_free_space_bytes: 0,
            ..Default::default()
        };
        let m = BackupManager::open(tmp.path(), opts).unwrap();
        let report = storage_report(&m);
        assert_eq!(report.health, StorageHealth::Healthy);
        assert_eq!(report.backup_count, 0);
    }
}
