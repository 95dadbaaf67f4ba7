//! Last-known profile cache using moka
//!
//! Holds the most recent successfully fetched profile per identity so the
//! session can keep gating while the profile store is unreachable. With a
//! snapshot path configured, the last stored profile is also mirrored to a
//! JSON file and restored when the cache is rebuilt, so a session that
//! starts offline can still use it.

use crate::config::GateConfig;
use crate::types::{SessionProfile, Uid};
use moka::future::Cache;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Cache of last-known profiles keyed by identity
///
/// Entries are only ever returned for the uid they were stored under, so a
/// fallback can never hand one identity another identity's profile.
#[derive(Debug, Clone)]
pub struct ProfileCache {
    inner: Cache<Uid, SessionProfile>,
    snapshot: Option<Arc<Snapshot>>,
}

impl ProfileCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
            snapshot: None,
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            snapshot: None,
        }
    }

    /// Mirror the last stored profile to `path`, restoring whatever it holds now
    ///
    /// An unreadable or corrupt file is treated as empty.
    #[must_use]
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(Arc::new(Snapshot::open(path.into())));
        self
    }

    /// Create memory-only cache from configuration, ignoring `cache_path`
    #[must_use]
    pub fn in_memory(config: &GateConfig) -> Self {
        match config.cache_ttl() {
            Some(ttl) => Self::with_ttl(config.cache_capacity, ttl),
            None => Self::new(config.cache_capacity),
        }
    }

    /// Create cache from configuration
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        let cache = Self::in_memory(config);
        match &config.cache_path {
            Some(path) => cache.with_snapshot(path.clone()),
            None => cache,
        }
    }

    /// Snapshot file, if one is configured
    #[inline]
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref().map(|s| s.path.as_path())
    }

    /// Remember a freshly fetched profile
    pub async fn store(&self, profile: SessionProfile) {
        if let Some(snapshot) = &self.snapshot {
            snapshot.save(&profile).await;
        }
        self.inner.insert(profile.uid.clone(), profile).await;
    }

    /// Last known profile for uid
    #[must_use]
    pub async fn lookup(&self, uid: &Uid) -> Option<SessionProfile> {
        if let Some(hit) = self.inner.get(uid).await {
            return Some(hit);
        }
        let restored = self.snapshot.as_ref()?.take_restored(uid)?;
        self.inner.insert(uid.clone(), restored.clone()).await;
        Some(restored)
    }

    /// Drop the entry for uid
    pub async fn forget(&self, uid: &Uid) {
        self.inner.invalidate(uid).await;
        if let Some(snapshot) = &self.snapshot {
            snapshot.remove_for(uid).await;
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.invalidate_all();
        if let Some(snapshot) = &self.snapshot {
            snapshot.remove();
        }
    }

    /// Number of live entries after pending maintenance has run
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

impl Default for ProfileCache {
    /// Create cache with default capacity (64 entries)
    fn default() -> Self {
        Self::new(64)
    }
}

/// On-disk copy of the last stored profile
#[derive(Debug)]
struct Snapshot {
    path: PathBuf,
    // Profile read at open time, moved into memory on first lookup.
    restored: Mutex<Option<SessionProfile>>,
}

impl Snapshot {
    fn open(path: PathBuf) -> Self {
        let restored = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<SessionProfile>(&bytes) {
                Ok(profile) => {
                    tracing::debug!(uid = %profile.uid, path = %path.display(), "restored last known profile");
                    Some(profile)
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "ignoring corrupt profile snapshot");
                    None
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => None,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "profile snapshot unreadable");
                None
            }
        };
        Self {
            path,
            restored: Mutex::new(restored),
        }
    }

    fn take_restored(&self, uid: &Uid) -> Option<SessionProfile> {
        let mut slot = self.restored.lock();
        if slot.as_ref().is_some_and(|p| &p.uid == uid) {
            slot.take()
        } else {
            None
        }
    }

    async fn save(&self, profile: &SessionProfile) {
        *self.restored.lock() = None;

        let bytes = match serde_json::to_vec_pretty(profile) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(uid = %profile.uid, %error, "could not encode profile snapshot");
                return;
            }
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(path = %parent.display(), %error, "could not create snapshot directory");
                return;
            }
        }
        if let Err(error) = tokio::fs::write(&self.path, bytes).await {
            tracing::warn!(path = %self.path.display(), %error, "could not write profile snapshot");
        }
    }

    /// Remove the file when it holds uid's profile or cannot be parsed
    async fn remove_for(&self, uid: &Uid) {
        let _ = self.take_restored(uid);
        let holds_uid = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<SessionProfile>(&bytes)
                .map_or(true, |profile| &profile.uid == uid),
            Err(_) => false,
        };
        if holds_uid {
            self.remove();
        }
    }

    fn remove(&self) {
        *self.restored.lock() = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "profile snapshot removed"),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "could not remove profile snapshot");
            }
        }
    }
}
