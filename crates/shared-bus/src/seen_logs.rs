//! # Seen-Log Cache
//!
//! Time-bounded record of delivered logs.
//!
//! Log subscriptions replay recent logs after a reconnect, and a node may
//! deliver the same log twice around a reorg. A log is identified by
//! `(tx_hash, log_index)`; the cache remembers it for a validity window and
//! garbage-collects older entries so memory stays bounded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use shared_types::entities::TxHash;

use crate::events::LogMeta;

/// Time-bounded cache of already delivered logs.
pub struct SeenLogCache {
    /// Map of log key -> instant the log was first seen.
    cache: HashMap<(TxHash, u64), Instant>,

    /// How long a log is remembered.
    validity_window: Duration,

    /// Last garbage collection.
    last_gc: Instant,

    /// Garbage collection interval.
    gc_interval: Duration,
}

impl SeenLogCache {
    /// Default validity window.
    pub const DEFAULT_VALIDITY_WINDOW: Duration = Duration::from_secs(600);

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(30);

    /// Create a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_VALIDITY_WINDOW, Self::DEFAULT_GC_INTERVAL)
    }

    /// Create a cache with custom settings.
    #[must_use]
    pub fn with_config(validity_window: Duration, gc_interval: Duration) -> Self {
        Self {
            cache: HashMap::new(),
            validity_window,
            last_gc: Instant::now(),
            gc_interval,
        }
    }

    /// Record a log. Returns `false` if it was already seen.
    pub fn first_sighting(&mut self, meta: &LogMeta) -> bool {
        let now = Instant::now();

        if now.duration_since(self.last_gc) > self.gc_interval {
            self.garbage_collect(now);
            self.last_gc = now;
        }

        let key = (meta.tx_hash, meta.log_index);
        if self.cache.contains_key(&key) {
            return false;
        }
        self.cache.insert(key, now);
        true
    }

    /// Check if a log has been seen without recording it.
    #[must_use]
    pub fn contains(&self, meta: &LogMeta) -> bool {
        self.cache.contains_key(&(meta.tx_hash, meta.log_index))
    }

    /// Get the number of remembered logs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn garbage_collect(&mut self, now: Instant) {
        let window = self.validity_window;
        self.cache.retain(|_, seen| now.duration_since(*seen) < window);
    }
}

impl Default for SeenLogCache {
    fn default() -> Self {
        Self::new()
    }
}
