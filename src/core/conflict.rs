//! External-edit conflict detection
//!
//! Fingerprints each target when a proposal is built and compares the
//! fingerprint again right before the write:
//! - Missing file at snapshot time is recorded as `existed = false`
//! - Content is compared by SHA-256, never by mtime alone
//! - Read-only flips are reported separately from content changes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::clock::{Clock, SystemClock};
use crate::core::proposal::OperationKind;
use crate::infra::io;
use crate::infra::utils::PathUtils;

/// Fingerprint of one path at proposal time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: String,
    pub existed: bool,
    pub content_hash: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub size: u64,
    pub readonly: bool,
    pub taken_at: DateTime<Utc>,
}

/// Why the current file no longer matches the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    /// Nothing changed since the snapshot
    None,
    /// No snapshot was taken; existing content is unverified
    NoSnapshot,
    /// Path was absent at snapshot time and exists now
    FileCreated,
    /// Path existed at snapshot time and is gone now
    FileDeleted,
    /// Hash mismatch
    ContentModified,
    /// A create targets a file that exists with different content
    AlreadyExists,
    /// Read-only flag changed
    PermissionChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictInfo {
    pub path: String,
    pub reason: ConflictReason,
    pub snapshot_taken_at: Option<DateTime<Utc>>,
    pub current_modified_at: Option<DateTime<Utc>>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
    pub description: String,
    pub overwrite_authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictCheckResult {
    pub info: ConflictInfo,
    /// The operation must not proceed
    pub blocking: bool,
}

impl ConflictCheckResult {
    pub fn has_conflict(&self) -> bool {
        self.info.reason != ConflictReason::None
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }
}

#[derive(Debug, Clone)]
struct Fingerprint {
    exists: bool,
    hash: Option<String>,
    modified_at: Option<DateTime<Utc>>,
    size: u64,
    readonly: bool,
}

#[derive(Debug, Clone)]
pub struct ConflictDetector {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ConflictDetector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        PathUtils::resolve_in(&self.root, rel)
            .ok_or_else(|| anyhow!("path {rel} escapes workspace {}", self.root.display()))
    }

    /// Capture the current state of `rel`.
    pub fn snapshot(&self, rel: &str) -> Result<FileSnapshot> {
        let abs = self.resolve(rel)?;
        let fp = fingerprint(&abs)?;
        Ok(FileSnapshot {
            path: PathUtils::normalize(rel),
            existed: fp.exists,
            content_hash: fp.hash,
            modified_at: fp.modified_at,
            size: fp.size,
            readonly: fp.readonly,
            taken_at: self.clock.now(),
        })
    }

    /// Compare the snapshot with the file as it is now.
    ///
    /// `proposed_hash` is the hash of the content about to be written; a
    /// file that already holds exactly that content never conflicts.
    pub fn check(
        &self,
        snapshot: Option<&FileSnapshot>,
        rel: &str,
        kind: OperationKind,
        proposed_hash: Option<&str>,
        allow_overwrite: bool,
    ) -> Result<ConflictCheckResult> {
        let abs = self.resolve(rel)?;
        let now = fingerprint(&abs)?;

        let reason = if kind == OperationKind::Mkdir {
            ConflictReason::None
        } else if now.exists && proposed_hash.is_some() && now.hash.as_deref() == proposed_hash {
            ConflictReason::None
        } else {
            classify(snapshot, &now, kind)
        };

        let blocking = !allow_overwrite && blocks(kind, reason);
        let info = ConflictInfo {
            path: PathUtils::normalize(rel),
            reason,
            snapshot_taken_at: snapshot.map(|s| s.taken_at),
            current_modified_at: now.modified_at,
            expected_hash: snapshot.and_then(|s| s.content_hash.clone()),
            actual_hash: now.hash.clone(),
            description: describe(reason, rel),
            overwrite_authorized: allow_overwrite && reason != ConflictReason::None,
        };
        if info.reason != ConflictReason::None {
            warn!(path = %info.path, reason = ?info.reason, blocking, "conflict detected");
        }
        Ok(ConflictCheckResult { info, blocking })
    }
}

fn fingerprint(abs: &Path) -> Result<Fingerprint> {
    let meta = match std::fs::metadata(abs) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Fingerprint {
                exists: false,
                hash: None,
                modified_at: None,
                size: 0,
                readonly: false,
            });
        }
        Err(e) => return Err(e).with_context(|| format!("stat {}", abs.display())),
    };

    let hash = if meta.is_file() {
        Some(io::sha256_file(abs)?)
    } else {
        None
    };
    Ok(Fingerprint {
        exists: true,
        hash,
        modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
        size: meta.len(),
        readonly: meta.permissions().readonly(),
    })
}

fn classify(snapshot: Option<&FileSnapshot>, now: &Fingerprint, kind: OperationKind) -> ConflictReason {
    let Some(snap) = snapshot else {
        return match (now.exists, kind) {
            (false, _) => ConflictReason::None,
            (true, OperationKind::Create) => ConflictReason::FileCreated,
            (true, _) => ConflictReason::NoSnapshot,
        };
    };

    match (snap.existed, now.exists) {
        (false, false) => ConflictReason::None,
        (false, true) => ConflictReason::FileCreated,
        (true, false) => ConflictReason::FileDeleted,
        (true, true) if snap.content_hash != now.hash => ConflictReason::ContentModified,
        (true, true) if kind == OperationKind::Create => ConflictReason::AlreadyExists,
        (true, true) if snap.readonly != now.readonly => ConflictReason::PermissionChanged,
        (true, true) => ConflictReason::None,
    }
}

/// Which reasons stop which operations
fn blocks(kind: OperationKind, reason: ConflictReason) -> bool {
    use ConflictReason as R;
    use OperationKind as K;
    match reason {
        R::None | R::NoSnapshot => false,
        R::FileCreated => matches!(kind, K::Create | K::Rename | K::Move),
        R::FileDeleted => matches!(kind, K::Modify | K::Delete | K::Rename | K::Move),
        R::ContentModified => matches!(kind, K::Create | K::Modify | K::Delete | K::Rename | K::Move),
        R::AlreadyExists => kind == K::Create,
        R::PermissionChanged => matches!(kind, K::Modify | K::Delete),
    }
}

fn describe(reason: ConflictReason, rel: &str) -> String {
    match reason {
        ConflictReason::None => format!("{rel} is unchanged"),
        ConflictReason::NoSnapshot => format!("{rel} exists but was never snapshotted"),
        ConflictReason::FileCreated => format!("{rel} was created after the proposal was made"),
        ConflictReason::FileDeleted => format!("{rel} was deleted after the proposal was made"),
        ConflictReason::ContentModified => format!("{rel} was modified after the proposal was made"),
        ConflictReason::PermissionChanged => format!("{rel} changed permissions after the proposal was made"),
        ConflictReason::AlreadyExists => format!("{rel} already exists with different content"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unchanged_file_has_no_conflict() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "one").unwrap();
        let d = ConflictDetector::new(tmp.path());
        let snap = d.snapshot("a.txt").unwrap();
        let r = d.check(Some(&snap), "a.txt", OperationKind::Modify, None, false).unwrap();
        assert!(!r.has_conflict());
        assert!(!r.is_blocking());
    }

    #[test]
    fn external_edit_blocks_modify_unless_authorized() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "one").unwrap();
        let d = ConflictDetector::new(tmp.path());
        let snap = d.snapshot("a.txt").unwrap();
        fs::write(tmp.path().join("a.txt"), "two").unwrap();

        let r = d.check(Some(&snap), "a.txt", OperationKind::Modify, None, false).unwrap();
        assert_eq!(r.info.reason, ConflictReason::ContentModified);
        assert!(r.is_blocking());
        assert_ne!(r.info.expected_hash, r.info.actual_hash);

        let r = d.check(Some(&snap), "a.txt", OperationKind::Modify, None, true).unwrap();
        assert!(!r.is_blocking());
        assert!(r.info.overwrite_authorized);
    }

    #[test]
    fn created_and_deleted_since_snapshot() {
        let tmp = TempDir::new().unwrap();
        let d = ConflictDetector::new(tmp.path());

        let snap = d.snapshot("new.txt").unwrap();
        assert!(!snap.existed);
        fs::write(tmp.path().join("new.txt"), "x").unwrap();
        let r = d.check(Some(&snap), "new.txt", OperationKind::Create, None, false).unwrap();
        assert_eq!(r.info.reason, ConflictReason::FileCreated);
        assert!(r.is_blocking());

        let snap = d.snapshot("new.txt").unwrap();
        fs::remove_file(tmp.path().join("new.txt")).unwrap();
        let r = d.check(Some(&snap), "new.txt", OperationKind::Delete, None, false).unwrap();
        assert_eq!(r.info.reason, ConflictReason::FileDeleted);
    }

    #[test]
    fn identical_content_is_not_a_conflict() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "same").unwrap();
        let d = ConflictDetector::new(tmp.path());
        let hash = io::sha256_bytes(b"same");
        let r = d
            .check(None, "a.txt", OperationKind::Create, Some(&hash), false)
            .unwrap();
        assert!(!r.has_conflict());
    }

    #[test]
    fn create_onto_unchanged_existing_file_blocks() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "old\n").unwrap();
        let d = ConflictDetector::new(tmp.path());
        let snap = d.snapshot("a.txt").unwrap();
        let hash = io::sha256_bytes(b"new\n");

        let r = d
            .check(Some(&snap), "a.txt", OperationKind::Create, Some(&hash), false)
            .unwrap();
        assert_eq!(r.info.reason, ConflictReason::AlreadyExists);
        assert!(r.is_blocking());

        let r = d
            .check(Some(&snap), "a.txt", OperationKind::Modify, Some(&hash), false)
            .unwrap();
        assert!(!r.has_conflict());
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let d = ConflictDetector::new(tmp.path());
        assert!(d.snapshot("../outside.txt").is_err());
    }
}
