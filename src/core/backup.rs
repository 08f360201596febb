//! Backup store
//!
//! Copies a file's current bytes into `.fln/backups` before it is overwritten
//! or deleted. Layout:
//!
//! ```text
//! .fln/backups/
//!   index.jsonl               one BackupInfo per line, append-only
//!   .lock                     fd-lock guard for the index
//!   src/lib.rs.20261017T101500123Z_a8Kq2x.bak
//! ```
//!
//! The backup tree mirrors the workspace's relative directories. Inserts
//! append to the index; deletions and retention sweeps rewrite it atomically.
//! All mutation happens under the in-process mutex and the on-disk lock.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::backup_ops;
use crate::core::clock::{Clock, SystemClock};
use crate::infra::config::BackupOptions;
use crate::infra::io;
use crate::infra::utils::PathUtils;

const INDEX_FILE: &str = "index.jsonl";
const LOCK_FILE: &str = ".lock";

/// One retained backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub id: String,
    /// Path of the backup file, relative to the store directory
    pub backup_path: String,
    /// Workspace-relative path of the file that was copied
    pub original_path: String,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    pub content_hash: Option<String>,
    pub verified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup {0} not found")]
    NotFound(String),
    #[error("cannot back up {0}: not a regular file")]
    NotAFile(String),
    #[error("path {0} escapes the workspace")]
    OutsideWorkspace(String),
    #[error("backup of {path} failed verification: expected {expected}, found {actual}")]
    VerificationFailed {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("backup file {0} is missing from the store")]
    Missing(String),
}

#[derive(Debug)]
pub struct BackupManager {
    root: PathBuf,
    dir: PathBuf,
    options: BackupOptions,
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<BackupInfo>>,
}

impl BackupManager {
    /// Open (or create) the store for workspace `root`.
    pub fn open(root: impl Into<PathBuf>, options: BackupOptions) -> Result<Self> {
        Self::open_with_clock(root, options, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        root: impl Into<PathBuf>,
        options: BackupOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let root = root.into();
        let dir = if options.backup_dir.is_absolute() {
            options.backup_dir.clone()
        } else {
            root.join(&options.backup_dir)
        };
        fs::create_dir_all(&dir).with_context(|| format!("create backup store {}", dir.display()))?;

        let entries = read_index(&dir.join(INDEX_FILE))?;
        debug!(store = %dir.display(), count = entries.len(), "backup store opened");
        Ok(Self {
            root,
            dir,
            options,
            clock,
            entries: Mutex::new(entries),
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.dir
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Absolute location of a backup file
    pub fn path_of(&self, info: &BackupInfo) -> PathBuf {
        self.dir.join(&info.backup_path)
    }

    fn state(&self) -> MutexGuard<'_, Vec<BackupInfo>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy the current bytes of `rel` into the store.
    pub fn backup_file(&self, rel: &str) -> Result<BackupInfo> {
        let rel = PathUtils::normalize(rel);
        let abs = PathUtils::resolve_in(&self.root, &rel)
            .ok_or_else(|| BackupError::OutsideWorkspace(rel.clone()))?;
        let meta = fs::metadata(&abs).with_context(|| format!("stat {}", abs.display()))?;
        if !meta.is_file() {
            bail!(BackupError::NotAFile(rel));
        }

        let created_at = self.clock.now();
        let id = generate_id(created_at);
        let file_name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let backup_rel = match PathUtils::parent(&rel) {
            Some(parent) if !parent.is_empty() => format!("{parent}/{file_name}.{id}.bak"),
            _ => format!("{file_name}.{id}.bak"),
        };
        let dest = self.dir.join(&backup_rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }

        let bytes = fs::read(&abs).with_context(|| format!("read {}", abs.display()))?;
        let want_hash = self.options.compute_hash || self.options.verify_after_write;
        let source_hash = want_hash.then(|| io::sha256_bytes(&bytes));

        {
            let mut f = File::create(&dest).with_context(|| format!("create {}", dest.display()))?;
            f.write_all(&bytes)
                .with_context(|| format!("write {}", dest.display()))?;
            f.sync_all().ok();
        }

        let mut verified = false;
        if self.options.verify_after_write
            && let Some(expected) = &source_hash
        {
            let actual = io::sha256_file(&dest)?;
            if &actual != expected {
                let _ = fs::remove_file(&dest);
                bail!(BackupError::VerificationFailed {
                    path: rel,
                    expected: expected.clone(),
                    actual,
                });
            }
            verified = true;
        }

        let info = BackupInfo {
            id,
            backup_path: backup_rel,
            original_path: rel,
            created_at,
            size: bytes.len() as u64,
            content_hash: if self.options.compute_hash { source_hash } else { None },
            verified,
        };

        let mut entries = self.state();
        self.with_index_lock(|| append_index(&self.dir.join(INDEX_FILE), &info))?;
        entries.push(info.clone());
        drop(entries);

        info!(path = %info.original_path, id = %info.id, size = info.size, "backup created");
        Ok(info)
    }

    pub fn get(&self, id: &str) -> Option<BackupInfo> {
        self.state().iter().find(|b| b.id == id).cloned()
    }

    /// Every backup, oldest first
    pub fn list(&self) -> Vec<BackupInfo> {
        let mut out = self.state().clone();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Backups of one original path, newest first
    pub fn list_for(&self, rel: &str) -> Vec<BackupInfo> {
        let rel = PathUtils::normalize(rel);
        let mut out: Vec<_> = self
            .state()
            .iter()
            .filter(|b| b.original_path == rel)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        out
    }

    pub fn total_bytes(&self) -> u64 {
        self.state().iter().map(|b| b.size).sum()
    }

    pub fn read_backup(&self, id: &str) -> Result<Vec<u8>> {
        let info = self.get(id).ok_or_else(|| BackupError::NotFound(id.to_string()))?;
        let path = self.path_of(&info);
        if !path.exists() {
            bail!(BackupError::Missing(info.backup_path));
        }
        fs::read(&path).with_context(|| format!("read backup {}", path.display()))
    }

    /// Re-hash the backup file and compare with the recorded hash.
    ///
    /// Backups stored without a hash verify as long as the file exists.
    pub fn verify(&self, id: &str) -> Result<bool> {
        let info = self.get(id).ok_or_else(|| BackupError::NotFound(id.to_string()))?;
        let path = self.path_of(&info);
        if !path.exists() {
            return Ok(false);
        }
        match &info.content_hash {
            Some(expected) => Ok(&io::sha256_file(&path)? == expected),
            None => Ok(true),
        }
    }

    /// Write the backup's bytes back to its original path.
    pub fn restore(&self, id: &str) -> Result<BackupInfo> {
        let info = self.get(id).ok_or_else(|| BackupError::NotFound(id.to_string()))?;
        let bytes = self.read_backup(id)?;
        if let Some(expected) = &info.content_hash {
            let actual = io::sha256_bytes(&bytes);
            if &actual != expected {
                bail!(BackupError::VerificationFailed {
                    path: info.original_path.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let dest = PathUtils::resolve_in(&self.root, &info.original_path)
            .ok_or_else(|| BackupError::OutsideWorkspace(info.original_path.clone()))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        io::write_atomic(&dest, &bytes)?;
        info!(path = %info.original_path, id = %info.id, "restored from backup");
        Ok(info)
    }

    /// Remove one backup and its index entry. Returns false if unknown.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut entries = self.state();
        let Some(pos) = entries.iter().position(|b| b.id == id) else {
            return Ok(false);
        };
        let removed = entries.remove(pos);
        self.with_index_lock(|| {
            remove_backup_file(&self.dir.join(&removed.backup_path));
            rewrite_index(&self.dir.join(INDEX_FILE), &entries)
        })?;
        debug!(id, "backup deleted");
        Ok(true)
    }

    /// Apply the count, age and size ceilings. Returns the evicted backups.
    pub fn enforce_retention(&self) -> Result<Vec<BackupInfo>> {
        self.enforce_retention_except(&HashSet::new())
    }

    /// Retention that leaves `pinned` ids in place, such as backups a live
    /// undo still needs.
    pub fn enforce_retention_except(&self, pinned: &HashSet<String>) -> Result<Vec<BackupInfo>> {
        let now = self.clock.now();
        let mut entries = self.state();
        let evict = backup_ops::plan_evictions(&entries, &self.options, now, pinned);
        if evict.is_empty() {
            return Ok(Vec::new());
        }

        let mut evicted = Vec::with_capacity(evict.len());
        for id in &evict {
            if let Some(pos) = entries.iter().position(|b| &b.id == id) {
                evicted.push(entries.remove(pos));
            }
        }
        self.with_index_lock(|| {
            for info in &evicted {
                remove_backup_file(&self.dir.join(&info.backup_path));
            }
            rewrite_index(&self.dir.join(INDEX_FILE), &entries)
        })?;
        info!(count = evicted.len(), "retention evicted backups");
        Ok(evicted)
    }

    /// Files under the store that no index entry points at.
    pub fn find_orphans(&self) -> Result<Vec<PathBuf>> {
        let known: HashSet<PathBuf> =
            self.state().iter().map(|b| self.path_of(b)).collect();
        let mut out = Vec::new();
        collect_bak_files(&self.dir, &mut out)?;
        out.retain(|p| !known.contains(p));
        out.sort();
        Ok(out)
    }

    /// Indexed backups whose file is missing or whose hash no longer matches.
    pub fn find_corrupted(&self) -> Result<Vec<BackupInfo>> {
        let mut out = Vec::new();
        for info in self.list() {
            if !self.verify(&info.id)? {
                out.push(info);
            }
        }
        Ok(out)
    }

    fn with_index_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock_path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open lock {}", lock_path.display()))?;
        let mut lock = fd_lock::RwLock::new(file);
        let _guard = lock
            .write()
            .with_context(|| format!("lock {}", lock_path.display()))?;
        f()
    }
}

fn read_index(path: &Path) -> Result<Vec<BackupInfo>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("open index {}", path.display()))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read index line {}", i + 1))?;
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        match serde_json::from_str::<BackupInfo>(t) {
            Ok(e) => out.push(e),
            Err(e) => warn!(line = i + 1, error = %e, "skipping malformed backup index line"),
        }
    }
    Ok(out)
}

fn append_index(path: &Path, info: &BackupInfo) -> Result<()> {
    let line = serde_json::to_string(info).context("serialize backup entry")?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open index {}", path.display()))?;
    writeln!(f, "{line}").context("append index")?;
    f.sync_all().ok();
    Ok(())
}

fn rewrite_index(path: &Path, entries: &[BackupInfo]) -> Result<()> {
    let mut buf = String::new();
    for e in entries {
        buf.push_str(&serde_json::to_string(e).context("serialize backup entry")?);
        buf.push('\n');
    }
    io::write_atomic(path, buf.as_bytes())
}

fn remove_backup_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove backup file"),
    }
}

fn collect_bak_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("read {}", dir.display())),
    };
    for entry in rd {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let ft = entry.file_type()?;
        if ft.is_dir() {
            collect_bak_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "bak") {
            out.push(path);
        }
    }
    Ok(())
}

/// Sortable, filesystem-safe id: `20261017T101500123Z_a8Kq2x`
pub(crate) fn generate_id(at: DateTime<Utc>) -> String {
    let ts = at.format("%Y%m%dT%H%M%S%3fZ");
    let alphabet = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect();
    format!("{ts}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> BackupManager {
        BackupManager::open(tmp.path(), BackupOptions::default()).unwrap()
    }

    #[test]
    fn backup_and_restore_round_trip() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/lib.rs"), "pub fn a() {}\n").unwrap();
        let m = manager(&tmp);

        let info = m.backup_file("src/lib.rs").unwrap();
        assert!(info.verified);
        assert!(info.backup_path.starts_with("src/lib.rs."));
        assert!(info.backup_path.ends_with(".bak"));
        assert_eq!(info.content_hash, Some(io::sha256_bytes(b"pub fn a() {}\n")));

        fs::write(tmp.path().join("src/lib.rs"), "changed").unwrap();
        m.restore(&info.id).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("src/lib.rs")).unwrap(), "pub fn a() {}\n");
    }

    #[test]
    fn index_survives_reopen_and_tolerates_garbage() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let id = manager(&tmp).backup_file("a.txt").unwrap().id;

        let index = tmp.path().join(".fln/backups/index.jsonl");
        let mut f = OpenOptions::new().append(true).open(&index).unwrap();
        writeln!(f, "{{not json").unwrap();

        let m = manager(&tmp);
        assert_eq!(m.list().len(), 1);
        assert!(m.get(&id).is_some());
    }

    #[test]
    fn per_file_ceiling_evicts_oldest() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let opts = BackupOptions {
            max_backups_per_file: 2,
            ..Default::default()
        };
        let m = BackupManager::open_with_clock(tmp.path(), opts, clock.clone()).unwrap();

        let first = m.backup_file("a.txt").unwrap();
        clock.advance(TimeDelta::seconds(1));
        m.backup_file("a.txt").unwrap();
        clock.advance(TimeDelta::seconds(1));
        m.backup_file("a.txt").unwrap();

        let evicted = m.enforce_retention().unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, first.id);
        assert!(!m.path_of(&first).exists());
        assert_eq!(m.list_for("a.txt").len(), 2);
    }

    #[test]
    fn orphans_and_corruption_are_reported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let m = manager(&tmp);
        let info = m.backup_file("a.txt").unwrap();

        fs::write(m.store_dir().join("stray.txt.x.bak"), "?").unwrap();
        fs::write(m.path_of(&info), "tampered").unwrap();

        assert_eq!(m.find_orphans().unwrap().len(), 1);
        let corrupted = m.find_corrupted().unwrap();
        assert_eq!(corrupted.len(), 1);
        assert!(m.restore(&info.id).is_err());
    }

    #[test]
    fn rejects_directories_and_escapes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("dir")).unwrap();
        let m = manager(&tmp);
        assert!(m.backup_file("dir").is_err());
        assert!(m.backup_file("../x").is_err());
        assert!(!m.delete("nope").unwrap());
    }
}
