//! Per-scene lock registry
//!
//! Every scene key maps to one reader/writer lock, created lazily on first
//! use. Lookups take a shared hold of the map on the fast path and only
//! upgrade to an exclusive hold (with a re-check) when a key is new. The map
//! guard is released before the caller's closure runs, so work on one scene
//! never blocks another.
//!
//! Idle locks are removed by a periodic sweep that only runs its removal pass
//! once the registry holds more than `max_entries` keys. A lock is never
//! removed while a handle to it is alive, which keeps lock identity stable
//! for every caller that can still observe it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::LockConfig;

/// The lock object guarding one scene
pub type SceneLock = RwLock<()>;

/// How a [`LockHandle`] holds its scene lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of concurrent holders
    Shared,
    /// A single holder
    Exclusive,
}

// Guards are held only for their Drop
#[allow(dead_code)]
enum Guard {
    Shared(ArcRwLockReadGuard<RawRwLock, ()>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// A held scene lock. Dropping the handle releases it.
pub struct LockHandle {
    key: String,
    lock: Arc<SceneLock>,
    guard: Guard,
}

impl LockHandle {
    /// Scene key this handle is bound to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the lock is held shared or exclusive
    pub fn mode(&self) -> LockMode {
        match self.guard {
            Guard::Shared(_) => LockMode::Shared,
            Guard::Exclusive(_) => LockMode::Exclusive,
        }
    }

    /// Returns `true` when both handles hold the same lock object
    pub fn same_lock(&self, other: &LockHandle) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

struct LockEntry {
    lock: Arc<SceneLock>,
    /// Milliseconds since the registry epoch
    last_used: AtomicU64,
}

impl LockEntry {
    fn new(now: u64) -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            last_used: AtomicU64::new(now),
        }
    }

    fn touch(&self, now: u64) {
        self.last_used.fetch_max(now, Ordering::Relaxed);
    }

    /// Removable when idle past the timeout and referenced only by the map
    fn is_reclaimable(&self, now: u64, idle_ms: u64) -> bool {
        let idle = now.saturating_sub(self.last_used.load(Ordering::Relaxed));
        idle > idle_ms && Arc::strong_count(&self.lock) == 1
    }
}

struct RegistryInner {
    entries: RwLock<HashMap<String, LockEntry>>,
    epoch: Instant,
    idle_timeout: Duration,
    max_entries: usize,
}

impl RegistryInner {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn lock_for(&self, key: &str) -> Arc<SceneLock> {
        let now = self.now_millis();

        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                entry.touch(now);
                return Arc::clone(&entry.lock);
            }
        }

        let mut entries = self.entries.write();
        // Another caller may have created it between the two holds
        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            debug!(key, "Created scene lock");
            LockEntry::new(now)
        });
        entry.touch(now);
        Arc::clone(&entry.lock)
    }

    fn sweep_at(&self, now: u64) -> usize {
        let mut entries = self.entries.write();
        if entries.len() <= self.max_entries {
            return 0;
        }

        let idle_ms = u64::try_from(self.idle_timeout.as_millis()).unwrap_or(u64::MAX);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_reclaimable(now, idle_ms));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, size = entries.len(), "Swept idle scene locks");
        }
        removed
    }
}

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry issuing one shared/exclusive lock per scene key
pub struct SceneLockRegistry {
    inner: Arc<RegistryInner>,
    sweeper: Option<Sweeper>,
}

impl SceneLockRegistry {
    /// Create a registry from configuration
    ///
    /// When called inside a Tokio runtime the periodic sweep is started on
    /// it; otherwise [`sweep`](Self::sweep) has to be driven by the caller.
    #[must_use]
    pub fn new(config: &LockConfig) -> Self {
        let mut registry = Self::without_sweeper(config.idle_timeout, config.max_entries);
        registry.sweeper = spawn_sweeper(&registry.inner, config.cleanup_interval);
        registry
    }

    /// Create a registry with no background sweep
    #[must_use]
    pub fn without_sweeper(idle_timeout: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: RwLock::new(HashMap::new()),
                epoch: Instant::now(),
                idle_timeout,
                max_entries,
            }),
            sweeper: None,
        }
    }

    /// Block until `key` can be held exclusively
    pub fn acquire_exclusive(&self, key: &str) -> LockHandle {
        let lock = self.inner.lock_for(key);
        let guard = Guard::Exclusive(lock.write_arc());
        LockHandle {
            key: key.to_string(),
            lock,
            guard,
        }
    }

    /// Block until `key` can be held shared
    pub fn acquire_shared(&self, key: &str) -> LockHandle {
        let lock = self.inner.lock_for(key);
        let guard = Guard::Shared(lock.read_arc());
        LockHandle {
            key: key.to_string(),
            lock,
            guard,
        }
    }

    /// Run `f` while holding `key` exclusively
    ///
    /// The lock is released on every exit path, unwinding included, and
    /// whatever `f` returns is passed through untouched.
    pub fn execute_exclusive<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _handle = self.acquire_exclusive(key);
        f()
    }

    /// Run `f` while holding `key` shared
    pub fn execute_shared<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _handle = self.acquire_shared(key);
        f()
    }

    /// Remove idle, unheld locks if the registry is over capacity
    ///
    /// Returns the number of locks removed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep_at(self.inner.now_millis())
    }

    /// Number of scene locks currently tracked
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Return `true` when no scene lock exists
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Returns `true` while the background sweep task is alive
    pub fn has_sweeper(&self) -> bool {
        self.sweeper
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Stop the background sweep. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.cancel.cancel();
            debug!("Scene lock sweeper cancelled");
        }
    }

    #[cfg(test)]
    fn lock_for(&self, key: &str) -> Arc<SceneLock> {
        self.inner.lock_for(key)
    }
}

impl Drop for SceneLockRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_sweeper(inner: &Arc<RegistryInner>, interval: Duration) -> Option<Sweeper> {
    if interval.is_zero() {
        return None;
    }
    let runtime = tokio::runtime::Handle::try_current().ok()?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let weak: Weak<RegistryInner> = Arc::downgrade(inner);

    let handle = runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.sweep_at(inner.now_millis());
                }
            }
        }
        debug!("Scene lock sweeper stopped");
    });

    info!(?interval, "Started scene lock sweeper");
    Some(Sweeper { cancel, handle })
}
