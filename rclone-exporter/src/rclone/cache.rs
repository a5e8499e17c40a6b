//! Remote type cache.
//!
//! Resolving a remote's backend type means dumping the whole rclone config, so
//! results are kept for a short TTL.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Default TTL for cached remote types (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    remote_type: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe TTL cache from remote name to backend type.
pub struct RemoteTypeCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

/// Cache key: rclone accepts `name` and `name:` for the same remote.
fn key(remote: &str) -> &str {
    remote.trim_end_matches(':')
}

impl RemoteTypeCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Get a cached type, evicting it if expired.
    pub fn get(&self, remote: &str) -> Option<String> {
        let key = key(remote);
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(entry.remote_type.clone());
            }
        } else {
            return None;
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired());
        None
    }

    pub fn insert(&self, remote: &str, remote_type: impl Into<String>) {
        self.entries.insert(
            key(remote).to_owned(),
            CacheEntry {
                remote_type: remote_type.into(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, remote: &str) {
        self.entries.remove(key(remote));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RemoteTypeCache {
    fn default() -> Self {
        Self::new()
    }
}
