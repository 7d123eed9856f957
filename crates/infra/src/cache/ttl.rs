use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use storepulse_core::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Diagnostic counters; nothing relies on them for correctness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    /// Entries past expiry that have not been read (and thus evicted) yet.
    pub expired_count: usize,
}

/// Process-local key/value cache with a time-to-live per entry.
///
/// Expiry is lazy: an expired entry is removed by the `get` that finds it.
/// Values are stored as JSON so one cache can hold every snapshot type.
#[derive(Debug)]
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl TtlCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().ok()?;
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: evict unless a concurrent `set` already replaced it.
        if let Ok(mut entries) = self.entries.write() {
            if entries.get(key).is_some_and(|e| !e.is_live(now)) {
                entries.remove(key);
                tracing::debug!(key, "cache entry expired");
            }
        }
        None
    }

    /// Store `value` until `now + ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), CacheEntry { value, expires_at });
        }
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Remove every key under `namespace` (keys look like `namespace:digest`).
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("{namespace}:");
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|key, _| !key.starts_with(&prefix));
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        match self.entries.read() {
            Ok(entries) => CacheStats {
                entry_count: entries.len(),
                expired_count: entries.values().filter(|e| !e.is_live(now)).count(),
            },
            Err(_) => CacheStats::default(),
        }
    }
}
