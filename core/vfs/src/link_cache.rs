//! Bounded cache of ref link targets.
//!
//! Ref resolution walks every ref in the store, so `/branch/<name>` style
//! links are cached for a short time. Concurrent misses on the same key are
//! collapsed into a single resolution.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use gitmount_common::{Error, ObjectId, Result};

use crate::config::FsConfig;

/// Relative symlink target for a ref that points at `commit`.
pub fn link_target(commit: &ObjectId) -> String {
    format!("../commit/{}/{}", commit.shard(), commit.rest())
}

/// Lookup counters.
#[derive(Debug, Default)]
pub struct LinkCacheStats {
    lookups: AtomicU64,
    resolutions: AtomicU64,
}

impl LinkCacheStats {
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Lookups that had to resolve the ref against the store.
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.lookups().saturating_sub(self.resolutions())
    }
}

/// Cache from virtual link path to link target.
///
/// Entries expire after the configured TTL and are evicted least recently
/// used first once capacity is reached. There is no explicit invalidation, so
/// a moved ref may be served stale for up to one TTL. Failed resolutions are
/// never stored.
pub struct LinkCache {
    cache: Cache<String, String>,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    stats: LinkCacheStats,
}

impl LinkCache {
    pub fn new(capacity: u64, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
            stats: LinkCacheStats::default(),
        }
    }

    pub fn from_config(config: &FsConfig) -> Self {
        Self::new(
            config.link_cache_capacity,
            config.link_cache_ttl(),
            config.sweep_interval(),
        )
    }

    /// Link target for `key`, resolving the commit with `resolve` on a miss.
    ///
    /// Only one caller resolves a missing key; concurrent callers for the
    /// same key wait and share its result.
    ///
    /// # Errors
    /// - Whatever `resolve` returns; the error is not cached
    pub fn get_or_resolve<F>(&self, key: &str, resolve: F) -> Result<String>
    where
        F: FnOnce() -> Result<ObjectId>,
    {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        self.cache
            .try_get_with(key.to_string(), || {
                self.stats.resolutions.fetch_add(1, Ordering::Relaxed);
                let commit = resolve()?;
                trace!(key, %commit, "resolved ref link");
                Ok::<_, Error>(link_target(&commit))
            })
            .map_err(Error::from_shared)
    }

    /// Purge expired entries if the sweep interval has elapsed.
    ///
    /// Called at the start of every operation; at most one caller performs
    /// the sweep and the others return immediately. Returns whether this
    /// call swept.
    pub fn maybe_sweep(&self) -> bool {
        let Some(mut last) = self.last_sweep.try_lock() else {
            return false;
        };
        if last.elapsed() < self.sweep_interval {
            return false;
        }
        *last = Instant::now();
        drop(last);

        self.cache.run_pending_tasks();
        debug!(entries = self.cache.entry_count(), "swept link cache");
        true
    }

    /// Approximate number of cached entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn stats(&self) -> &LinkCacheStats {
        &self.stats
    }
}
