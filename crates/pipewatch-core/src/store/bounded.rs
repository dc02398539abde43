// ── Bounded append-only log ──
//
// Event and metric history. Entries are keyed, first write wins, newest
// first in snapshots, and the oldest entries fall off once the cap is
// reached. A REST refresh replaces the whole log.

use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use pipewatch_api::{MonitoringMetric, ReplicationEvent};
use tokio::sync::watch;

/// Identity used for de-duplication.
pub(crate) trait Keyed {
    fn log_key(&self) -> String;
}

impl Keyed for ReplicationEvent {
    fn log_key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for MonitoringMetric {
    fn log_key(&self) -> String {
        self.key()
    }
}

pub(crate) struct BoundedLog<T: Keyed + Send + Sync + 'static> {
    cap: usize,
    /// Oldest first; new entries are pushed at the back.
    entries: Mutex<IndexMap<String, Arc<T>>>,
    /// Newest first.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Keyed + Send + Sync + 'static> BoundedLog<T> {
    pub(crate) fn new(cap: usize) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            cap: cap.max(1),
            entries: Mutex::new(IndexMap::new()),
            snapshot,
        }
    }

    /// Append entries in order; known keys are skipped.
    ///
    /// Returns how many entries were added. Subscribers are only notified
    /// when something changed.
    pub(crate) fn ingest(&self, items: impl IntoIterator<Item = T>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for item in items {
            let key = item.log_key();
            if entries.contains_key(&key) {
                continue;
            }
            entries.insert(key, Arc::new(item));
            added += 1;
        }
        if added > 0 {
            self.evict(&mut entries);
            self.publish(&entries);
        }
        added
    }

    /// Assign the log from a newest-first listing, truncated to the cap.
    pub(crate) fn replace(&self, items: Vec<T>) {
        let mut fresh = IndexMap::with_capacity(items.len().min(self.cap));
        for item in items {
            if fresh.len() == self.cap {
                break;
            }
            fresh.entry(item.log_key()).or_insert_with(|| Arc::new(item));
        }
        // Stored oldest first.
        fresh.reverse();

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        *entries = fresh;
        self.publish(&entries);
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn evict(&self, entries: &mut IndexMap<String, Arc<T>>) {
        let overflow = entries.len().saturating_sub(self.cap);
        if overflow > 0 {
            entries.drain(..overflow);
        }
    }

    fn publish(&self, entries: &IndexMap<String, Arc<T>>) {
        let values: Vec<Arc<T>> = entries.values().rev().cloned().collect();
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
