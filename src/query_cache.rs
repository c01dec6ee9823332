use crate::config::CacheConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry<T> {
    value: T,
    fetched_at: Instant,
    invalidated: bool,
}

/// Keyed cache of query results that are considered fresh for a fixed
/// duration after they were fetched.
pub struct QueryClient<T> {
    fresh_for: Duration,
    refetch_on_focus: bool,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T: Clone> QueryClient<T> {
    pub fn new(fresh_for: Duration, refetch_on_focus: bool) -> Self {
        Self {
            fresh_for,
            refetch_on_focus,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.fresh_for_secs),
            config.refetch_on_focus,
        )
    }

    pub fn refetch_on_focus(&self) -> bool {
        self.refetch_on_focus
    }

    /// Returns the cached value for `key` if it is still fresh. Stale
    /// entries are dropped.
    pub fn get_fresh(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            Some(entry) => self.is_fresh(entry),
            None => return None,
        };
        if fresh {
            entries.get(key).map(|entry| entry.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    /// Adds `value` under `key` and drops every entry that is no longer
    /// fresh.
    pub fn insert(&self, key: impl Into<String>, value: T) {
        let entry = Entry {
            value,
            fetched_at: Instant::now(),
            invalidated: false,
        };
        let mut entries = self.entries.lock();
        entries.retain(|_, existing| self.is_fresh(existing));
        entries.insert(key.into(), entry);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Marks every entry stale when refetch-on-focus is enabled. Returns the
    /// number of entries affected.
    pub fn on_window_focus(&self) -> usize {
        if !self.refetch_on_focus {
            return 0;
        }
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            entry.invalidated = true;
        }
        entries.len()
    }

    fn is_fresh(&self, entry: &Entry<T>) -> bool {
        !entry.invalidated && entry.fetched_at.elapsed() < self.fresh_for
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
