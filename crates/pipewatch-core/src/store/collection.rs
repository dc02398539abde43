// ── Keyed reactive collection ──
//
// Concurrent storage for resources that are refreshed wholesale from REST
// (connections, pipelines). Snapshots are ordered by key so consumers get
// a stable listing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent, reactive collection for a single resource type.
///
/// `DashMap` holds the entities; every mutation rebuilds the snapshot
/// that subscribers receive.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.rebuild_snapshot();
        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_keys() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.upsert("key1".into(), "hello".into()));
        assert!(!col.upsert("key1".into(), "world".into()));
        assert_eq!(*col.get("key1").unwrap(), "world");
    }

    #[test]
    fn remove_updates_snapshot() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("a".into(), "x".into());
        col.upsert("b".into(), "y".into());
        assert_eq!(col.snapshot().len(), 2);

        assert_eq!(*col.remove("a").unwrap(), "x");
        assert!(col.remove("a").is_none());
        assert_eq!(col.len(), 1);
        assert_eq!(col.snapshot().len(), 1);
    }

    #[test]
    fn snapshot_is_ordered_by_key() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert("c".into(), "3".into());
        col.upsert("a".into(), "1".into());
        col.upsert("b".into(), "2".into());

        let snap = col.snapshot();
        let values: Vec<&str> = snap.iter().map(|v| v.as_str()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }
}
