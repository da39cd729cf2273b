//! Run leases: at most one batch per spreadsheet at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Set of spreadsheets with a batch in flight.
#[derive(Debug, Clone, Default)]
pub struct RunLeases {
    active: Arc<Mutex<HashSet<String>>>,
}

impl RunLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease for `key`, or returns `None` if a run holds it.
    pub fn acquire(&self, key: &str) -> Option<RunLease> {
        if !lock(&self.active).insert(key.to_string()) {
            return None;
        }
        debug!(key, "lease acquired");
        Some(RunLease {
            active: self.active.clone(),
            key: key.to_string(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        lock(&self.active).contains(key)
    }
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct RunLease {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RunLease {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.key);
        debug!(key = %self.key, "lease released");
    }
}

// A panic while holding the lock cannot leave the set inconsistent.
fn lock(active: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
