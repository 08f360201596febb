//! Time-windowed undo for applied file changes
//!
//! Every applied mutation becomes a `FileChangeRecord`; the manager wraps it
//! in an `UndoState` countdown. Countdowns are driven by `tick(now)` from the
//! host instead of an internal timer thread.
//!
//! Effective deadline = raw expiry + accumulated pause + granted extension,
//! plus the running pause while paused. `time_remaining` is therefore frozen
//! during a pause and resumes exactly where it stopped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::backup::BackupManager;
use crate::core::clock::{self, Clock, to_delta};
use crate::infra::config::UndoOptions;
use crate::infra::io;
use crate::infra::utils::PathUtils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
    Moved,
}

/// Durable record of one applied mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeRecord {
    pub id: String,
    pub block_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub change_type: ChangeType,
    pub path: String,
    /// Destination of a rename or move
    pub new_path: Option<String>,
    pub before_hash: Option<String>,
    pub after_hash: Option<String>,
    pub before_size: u64,
    pub after_size: u64,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub backup_id: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub applied_at: DateTime<Utc>,
    pub undone: bool,
    pub undone_at: Option<DateTime<Utc>>,
}

impl FileChangeRecord {
    /// Path the change currently lives at
    pub fn current_path(&self) -> &str {
        self.new_path.as_deref().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoState {
    pub record: FileChangeRecord,
    pub created_at: DateTime<Utc>,
    /// Deadline before any pause or extension
    pub expires_at: DateTime<Utc>,
    pub is_paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
    /// Sum of completed pauses
    #[serde(with = "clock::serde_delta")]
    pub paused_total: TimeDelta,
    /// Sum of granted extensions
    #[serde(with = "clock::serde_delta")]
    pub extension: TimeDelta,
}

impl UndoState {
    pub fn new(record: FileChangeRecord, created_at: DateTime<Utc>, window: TimeDelta) -> Self {
        Self {
            record,
            created_at,
            expires_at: clock::add_saturating(created_at, window),
            is_paused: false,
            paused_at: None,
            paused_total: TimeDelta::zero(),
            extension: TimeDelta::zero(),
        }
    }

    pub fn effective_expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let running = match (self.is_paused, self.paused_at) {
            (true, Some(at)) if now > at => now - at,
            _ => TimeDelta::zero(),
        };
        [self.paused_total, self.extension, running]
            .into_iter()
            .fold(self.expires_at, clock::add_saturating)
    }

    /// Never negative
    pub fn time_remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.effective_expires_at(now) - now).max(TimeDelta::zero())
    }

    /// Always false while paused
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_paused && !self.record.undone && now >= self.effective_expires_at(now)
    }

    /// Returns false if already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paused {
            return false;
        }
        self.is_paused = true;
        self.paused_at = Some(now);
        true
    }

    /// Returns false if not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_paused {
            return false;
        }
        if let Some(at) = self.paused_at.take()
            && now > at
        {
            self.paused_total = self.paused_total.checked_add(&(now - at)).unwrap_or(TimeDelta::MAX);
        }
        self.is_paused = false;
        true
    }
}

/// Remaining-time view of one live state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoSnapshot {
    pub id: String,
    pub path: String,
    pub remaining_ms: i64,
    pub is_paused: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoEvent {
    Available {
        id: String,
        path: String,
        expires_at: DateTime<Utc>,
    },
    Expired {
        id: String,
        path: String,
    },
    TimeRemainingChanged(Vec<UndoSnapshot>),
    Completed(FileChangeRecord),
}

#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    #[error("no live undo record {0}")]
    NotFound(String),
    #[error("undo window for {0} has expired")]
    Expired(String),
    #[error("{path} changed since the edit was applied")]
    Modified { path: String },
    #[error("no backup recorded for {0}")]
    NoBackup(String),
    #[error("extending undo time is disabled")]
    ExtensionNotAllowed,
    #[error("extension exceeds the remaining allowance of {remaining_secs}s")]
    ExtensionLimit { remaining_secs: i64 },
    #[error("restoring {path} failed: {message}")]
    RestoreFailed { path: String, message: String },
    #[error("restored {path} does not match its original hash")]
    VerificationFailed { path: String },
}

#[derive(Debug)]
struct Inner {
    states: IndexMap<String, UndoState>,
    last_cleanup: DateTime<Utc>,
    last_update: DateTime<Utc>,
}

#[derive(Debug)]
pub struct UndoManager {
    options: UndoOptions,
    backups: Arc<BackupManager>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl UndoManager {
    pub fn new(options: UndoOptions, backups: Arc<BackupManager>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            options,
            backups,
            clock,
            inner: Mutex::new(Inner {
                states: IndexMap::new(),
                last_cleanup: now,
                last_update: now,
            }),
        }
    }

    pub fn options(&self) -> &UndoOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a countdown for `record`. Older records for the same file
    /// beyond `max_undo_per_file` are dropped in the same critical section.
    pub fn register(&self, record: FileChangeRecord) -> Vec<UndoEvent> {
        let now = self.clock.now();
        let state = UndoState::new(record, now, to_delta(self.options.undo_window));
        let id = state.record.id.clone();
        let path = state.record.current_path().to_string();
        let expires_at = state.expires_at;

        let mut inner = self.lock();
        inner.states.insert(id.clone(), state);

        let mut events = Vec::new();
        if self.options.max_undo_per_file > 0 {
            let same_file: Vec<String> = inner
                .states
                .values()
                .filter(|s| s.record.current_path() == path || s.record.path == path)
                .map(|s| s.record.id.clone())
                .collect();
            let surplus = same_file.len().saturating_sub(self.options.max_undo_per_file);
            for old in &same_file[..surplus] {
                if let Some(s) = inner.states.shift_remove(old) {
                    debug!(id = %old, path = %s.record.path, "undo slot evicted");
                    events.push(UndoEvent::Expired {
                        id: old.clone(),
                        path: s.record.current_path().to_string(),
                    });
                }
            }
        }
        drop(inner);

        debug!(id = %id, path = %path, "undo available");
        events.insert(0, UndoEvent::Available { id, path, expires_at });
        events
    }

    pub fn get(&self, id: &str) -> Option<UndoState> {
        self.lock().states.get(id).cloned()
    }

    /// Live states in registration order
    pub fn live(&self) -> Vec<UndoState> {
        self.lock().states.values().cloned().collect()
    }

    /// Backup ids that unexpired states still need for their undo
    pub fn pinned_backups(&self) -> HashSet<String> {
        let now = self.clock.now();
        self.lock()
            .states
            .values()
            .filter(|s| !s.is_expired(now))
            .filter_map(|s| s.record.backup_id.clone())
            .collect()
    }

    /// Newest live state touching `path`
    pub fn latest_for(&self, path: &str) -> Option<UndoState> {
        let path = PathUtils::normalize(path);
        self.lock()
            .states
            .values()
            .rev()
            .find(|s| s.record.current_path() == path)
            .cloned()
    }

    pub fn time_remaining(&self, id: &str) -> Option<TimeDelta> {
        let now = self.clock.now();
        self.lock().states.get(id).map(|s| s.time_remaining(now))
    }

    pub fn pause(&self, id: &str) -> Result<bool, UndoError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let state = inner
            .states
            .get_mut(id)
            .ok_or_else(|| UndoError::NotFound(id.to_string()))?;
        Ok(state.pause(now))
    }

    pub fn resume(&self, id: &str) -> Result<bool, UndoError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let state = inner
            .states
            .get_mut(id)
            .ok_or_else(|| UndoError::NotFound(id.to_string()))?;
        Ok(state.resume(now))
    }

    pub fn pause_all(&self) -> usize {
        let now = self.clock.now();
        self.lock().states.values_mut().map(|s| s.pause(now)).filter(|&p| p).count()
    }

    pub fn resume_all(&self) -> usize {
        let now = self.clock.now();
        self.lock().states.values_mut().map(|s| s.resume(now)).filter(|&r| r).count()
    }

    /// Push the deadline out by `by`, within `max_extension` in total.
    pub fn extend(&self, id: &str, by: std::time::Duration) -> Result<DateTime<Utc>, UndoError> {
        if !self.options.allow_extend_time {
            return Err(UndoError::ExtensionNotAllowed);
        }
        let now = self.clock.now();
        let mut inner = self.lock();
        let state = inner
            .states
            .get_mut(id)
            .ok_or_else(|| UndoError::NotFound(id.to_string()))?;
        if state.is_expired(now) {
            return Err(UndoError::Expired(state.record.path.clone()));
        }

        let max = to_delta(self.options.max_extension);
        let granted = state
            .extension
            .checked_add(&to_delta(by))
            .filter(|total| *total <= max);
        let Some(granted) = granted else {
            return Err(UndoError::ExtensionLimit {
                remaining_secs: (max - state.extension).num_seconds(),
            });
        };
        state.extension = granted;
        Ok(state.effective_expires_at(now))
    }

    /// Reverse the change. Irreversible once it succeeds.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn undo(&self, id: &str) -> Result<UndoEvent, UndoError> {
        let now = self.clock.now();
        let state = {
            let inner = self.lock();
            let state = inner
                .states
                .get(id)
                .ok_or_else(|| UndoError::NotFound(id.to_string()))?;
            if state.is_expired(now) {
                return Err(UndoError::Expired(state.record.path.clone()));
            }
            state.clone()
        };

        self.reverse(&state.record)?;

        let mut record = state.record;
        record.undone = true;
        record.undone_at = Some(now);
        self.lock().states.shift_remove(id);
        info!(id, path = %record.path, "change undone");
        Ok(UndoEvent::Completed(record))
    }

    fn reverse(&self, record: &FileChangeRecord) -> Result<(), UndoError> {
        let root = self.backups.workspace_root();
        let resolve = |rel: &str| {
            PathUtils::resolve_in(root, rel).ok_or_else(|| UndoError::RestoreFailed {
                path: rel.to_string(),
                message: "path escapes the workspace".to_string(),
            })
        };
        let failed = |path: &str, e: anyhow::Error| UndoError::RestoreFailed {
            path: path.to_string(),
            message: format!("{e:#}"),
        };

        match record.change_type {
            ChangeType::Created => {
                let abs = resolve(&record.path)?;
                self.ensure_unchanged(record, &abs)?;
                match &record.backup_id {
                    // The create replaced an existing file
                    Some(backup) => {
                        self.backups.restore(backup).map_err(|e| failed(&record.path, e))?;
                    }
                    None => {
                        if abs.exists() {
                            std::fs::remove_file(&abs)
                                .with_context(|| format!("remove {}", abs.display()))
                                .map_err(|e| failed(&record.path, e))?;
                        }
                    }
                }
            }
            ChangeType::Modified | ChangeType::Deleted => {
                let abs = resolve(&record.path)?;
                if record.change_type == ChangeType::Modified {
                    self.ensure_unchanged(record, &abs)?;
                } else if abs.exists() {
                    return Err(UndoError::Modified { path: record.path.clone() });
                }
                let backup = record
                    .backup_id
                    .as_deref()
                    .ok_or_else(|| UndoError::NoBackup(record.path.clone()))?;
                self.backups.restore(backup).map_err(|e| failed(&record.path, e))?;
            }
            ChangeType::Renamed | ChangeType::Moved => {
                let to = record
                    .new_path
                    .as_deref()
                    .ok_or_else(|| UndoError::NotFound(record.id.clone()))?;
                let from_abs = resolve(to)?;
                let back_abs = resolve(&record.path)?;
                self.ensure_unchanged(record, &from_abs)?;
                if back_abs.exists() {
                    return Err(UndoError::Modified { path: record.path.clone() });
                }
                if let Some(parent) = back_abs.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))
                        .map_err(|e| failed(&record.path, e))?;
                }
                std::fs::rename(&from_abs, &back_abs)
                    .with_context(|| format!("rename {} back", from_abs.display()))
                    .map_err(|e| failed(&record.path, e))?;
            }
        }

        if self.options.verify_restoration && record.change_type != ChangeType::Created {
            let abs = resolve(&record.path)?;
            if let Some(expected) = &record.before_hash {
                let actual = io::sha256_file(&abs).map_err(|e| failed(&record.path, e))?;
                if &actual != expected {
                    warn!(path = %record.path, "restored content hash mismatch");
                    return Err(UndoError::VerificationFailed { path: record.path.clone() });
                }
            }
        }
        Ok(())
    }

    /// The file must still hold what the apply wrote.
    fn ensure_unchanged(&self, record: &FileChangeRecord, abs: &std::path::Path) -> Result<(), UndoError> {
        let Some(expected) = &record.after_hash else {
            return Ok(());
        };
        let actual = if abs.is_file() {
            io::sha256_file(abs).ok()
        } else {
            None
        };
        if actual.as_ref() != Some(expected) {
            return Err(UndoError::Modified {
                path: record.current_path().to_string(),
            });
        }
        Ok(())
    }

    /// Drop every state past its deadline, one `Expired` event each.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<UndoEvent> {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .states
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.record.id.clone())
            .collect();
        let mut events = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(s) = inner.states.shift_remove(&id) {
                debug!(id = %id, path = %s.record.path, "undo expired");
                events.push(UndoEvent::Expired {
                    id,
                    path: s.record.current_path().to_string(),
                });
            }
        }
        events
    }

    /// Host timer entry point; gated by the cleanup and update intervals.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<UndoEvent> {
        let (do_cleanup, do_update) = {
            let mut inner = self.lock();
            let cleanup = now - inner.last_cleanup >= to_delta(self.options.cleanup_interval);
            let update = now - inner.last_update >= to_delta(self.options.update_interval);
            if cleanup {
                inner.last_cleanup = now;
            }
            if update {
                inner.last_update = now;
            }
            (cleanup, update)
        };

        let mut events = if do_cleanup {
            self.sweep_expired(now)
        } else {
            Vec::new()
        };
        if do_update {
            let snapshot: Vec<UndoSnapshot> = self
                .lock()
                .states
                .values()
                .map(|s| UndoSnapshot {
                    id: s.record.id.clone(),
                    path: s.record.current_path().to_string(),
                    remaining_ms: s.time_remaining(now).num_milliseconds(),
                    is_paused: s.is_paused,
                })
                .collect();
            if !snapshot.is_empty() {
                events.push(UndoEvent::TimeRemainingChanged(snapshot));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::infra::config::BackupOptions;
    use std::fs;
    use tempfile::TempDir;

    fn record(id: &str, path: &str) -> FileChangeRecord {
        FileChangeRecord {
            id: id.to_string(),
            block_id: None,
            message_id: None,
            conversation_id: None,
            change_type: ChangeType::Created,
            path: path.to_string(),
            new_path: None,
            before_hash: None,
            after_hash: None,
            before_size: 0,
            after_size: 0,
            lines_added: 0,
            lines_removed: 0,
            backup_id: None,
            backup_path: None,
            applied_at: Utc::now(),
            undone: false,
            undone_at: None,
        }
    }

    fn setup(options: UndoOptions) -> (TempDir, Arc<ManualClock>, UndoManager) {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backups = Arc::new(
            BackupManager::open_with_clock(tmp.path(), BackupOptions::default(), clock.clone()).unwrap(),
        );
        let mgr = UndoManager::new(options, backups, clock.clone());
        (tmp, clock, mgr)
    }

    #[test]
    fn pause_freezes_and_resume_shifts_deadline_exactly() {
        let start = Utc::now();
        let mut s = UndoState::new(record("r", "a.rs"), start, TimeDelta::minutes(30));

        let mut now = start + TimeDelta::minutes(5);
        for _ in 0..3 {
            let before = s.time_remaining(now);
            let deadline = s.effective_expires_at(now);
            assert!(s.pause(now));
            now += TimeDelta::seconds(97);
            assert_eq!(s.time_remaining(now), before);
            assert!(!s.is_expired(now + TimeDelta::hours(5)));
            assert!(s.resume(now));
            assert_eq!(s.effective_expires_at(now) - deadline, TimeDelta::seconds(97));
            now += TimeDelta::seconds(11);
        }
    }

    #[test]
    fn sub_millisecond_pauses_accumulate_exactly() {
        let start = Utc::now();
        let mut s = UndoState::new(record("r", "a.rs"), start, TimeDelta::minutes(30));
        let original = s.effective_expires_at(start);

        let mut now = start;
        for _ in 0..3 {
            now += TimeDelta::microseconds(250);
            assert!(s.pause(now));
            now += TimeDelta::microseconds(1500);
            assert!(s.resume(now));
        }
        assert_eq!(s.effective_expires_at(now) - original, TimeDelta::microseconds(4500));

        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("_ms"));
        let back: UndoState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.paused_total, TimeDelta::microseconds(4500));
    }

    #[test]
    fn huge_window_saturates() {
        let start = Utc::now();
        let s = UndoState::new(record("r", "a.rs"), start, TimeDelta::MAX);
        assert_eq!(s.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!s.is_expired(start + TimeDelta::days(365)));
    }

    #[test]
    fn remaining_time_never_negative() {
        let start = Utc::now();
        let s = UndoState::new(record("r", "a.rs"), start, TimeDelta::seconds(1));
        let later = start + TimeDelta::hours(1);
        assert_eq!(s.time_remaining(later), TimeDelta::zero());
        assert!(s.is_expired(later));
    }

    #[test]
    fn sweep_fires_once_per_expired_record() {
        let (_tmp, clock, mgr) = setup(UndoOptions::default());
        mgr.register(record("a", "a.rs"));
        mgr.register(record("b", "b.rs"));
        mgr.pause("b").unwrap();

        clock.advance(TimeDelta::hours(1));
        let events = mgr.tick(clock.now());
        let expired: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                UndoEvent::Expired { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(expired, vec!["a"]);
        assert!(mgr.get("b").is_some());
        assert!(mgr.sweep_expired(clock.now()).is_empty());
    }

    #[test]
    fn per_file_depth_evicts_oldest() {
        let opts = UndoOptions {
            max_undo_per_file: 2,
            ..Default::default()
        };
        let (_tmp, _clock, mgr) = setup(opts);
        mgr.register(record("1", "a.rs"));
        mgr.register(record("2", "a.rs"));
        let events = mgr.register(record("3", "a.rs"));
        assert!(matches!(&events[1], UndoEvent::Expired { id, .. } if id == "1"));
        assert_eq!(mgr.live().len(), 2);
    }

    #[test]
    fn extension_respects_limits() {
        let (_tmp, _clock, mgr) = setup(UndoOptions::default());
        mgr.register(record("a", "a.rs"));
        assert!(mgr.extend("a", std::time::Duration::from_secs(20 * 60)).is_ok());
        assert!(matches!(
            mgr.extend("a", std::time::Duration::from_secs(20 * 60)),
            Err(UndoError::ExtensionLimit { .. })
        ));

        let (_tmp, _clock, mgr) = setup(UndoOptions {
            allow_extend_time: false,
            ..Default::default()
        });
        mgr.register(record("a", "a.rs"));
        assert!(matches!(
            mgr.extend("a", std::time::Duration::from_secs(1)),
            Err(UndoError::ExtensionNotAllowed)
        ));
    }

    #[test]
    fn undo_of_create_deletes_file() {
        let (tmp, _clock, mgr) = setup(UndoOptions::default());
        fs::write(tmp.path().join("new.rs"), "fn x() {}").unwrap();
        let mut r = record("c", "new.rs");
        r.after_hash = Some(io::sha256_bytes(b"fn x() {}"));
        mgr.register(r);

        let event = mgr.undo("c").unwrap();
        assert!(matches!(event, UndoEvent::Completed(ref rec) if rec.undone));
        assert!(!tmp.path().join("new.rs").exists());
        assert!(matches!(mgr.undo("c"), Err(UndoError::NotFound(_))));
    }

    #[test]
    fn undo_refuses_after_expiry_and_external_edit() {
        let (tmp, clock, mgr) = setup(UndoOptions::default());
        fs::write(tmp.path().join("new.rs"), "edited").unwrap();
        let mut r = record("c", "new.rs");
        r.after_hash = Some(io::sha256_bytes(b"original"));
        mgr.register(r);
        assert!(matches!(mgr.undo("c"), Err(UndoError::Modified { .. })));

        clock.advance(TimeDelta::hours(1));
        assert!(matches!(mgr.undo("c"), Err(UndoError::Expired(_))));
    }
}
