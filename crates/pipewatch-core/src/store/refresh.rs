// ── Full refresh application logic ──
//
// Applies REST listings of connections and pipelines to the DataStore,
// and folds pushed pipeline status into the cached pipelines.

use std::collections::HashSet;

use pipewatch_api::{Connection, Pipeline, PipelineStatus};

use super::DataStore;
use super::collection::EntityCollection;

/// Upsert all incoming entities, then prune any existing keys not in the
/// incoming set. Avoids the brief empty state a clear would cause.
fn upsert_and_prune<T: Clone + Send + Sync + 'static>(
    collection: &EntityCollection<T>,
    items: Vec<(String, T)>,
) {
    let incoming_keys: HashSet<String> = items.iter().map(|(k, _)| k.clone()).collect();
    for (key, entity) in items {
        collection.upsert(key, entity);
    }
    for existing_key in collection.keys() {
        if !incoming_keys.contains(&existing_key) {
            collection.remove(&existing_key);
        }
    }
}

impl DataStore {
    /// Replace connections with a REST listing.
    pub fn replace_connections(&self, connections: Vec<Connection>) {
        upsert_and_prune(
            &self.connections,
            connections.into_iter().map(|c| (c.id.clone(), c)).collect(),
        );
        self.mark_refreshed();
    }

    /// Replace pipelines with a REST listing. The listing's status wins
    /// over anything pushed earlier.
    pub fn replace_pipelines(&self, pipelines: Vec<Pipeline>) {
        upsert_and_prune(
            &self.pipelines,
            pipelines.into_iter().map(|p| (p.id.clone(), p)).collect(),
        );
        self.mark_refreshed();
    }

    /// Cache a single pipeline, e.g. after `get_pipeline` or a mutation.
    pub fn upsert_pipeline(&self, pipeline: Pipeline) {
        self.pipelines.upsert(pipeline.id.clone(), pipeline);
    }

    pub fn remove_pipeline(&self, id: &str) {
        self.pipelines.remove(id);
        self.pipeline_statuses.remove(id);
    }

    pub fn upsert_connection(&self, connection: Connection) {
        self.connections.upsert(connection.id.clone(), connection);
    }

    pub fn remove_connection(&self, id: &str) {
        self.connections.remove(id);
    }

    /// Record a pushed status and mirror it onto the cached pipeline.
    pub fn apply_pipeline_status(&self, status: PipelineStatus) {
        if let Some(existing) = self.pipelines.get(&status.pipeline_id) {
            if existing.status.as_deref() != Some(status.status.as_str()) {
                let mut updated = Pipeline::clone(&existing);
                updated.status = Some(status.status.clone());
                self.pipelines.upsert(updated.id.clone(), updated);
            }
        }
        self.pipeline_statuses.upsert(status.pipeline_id.clone(), status);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pipeline(id: &str, status: &str) -> Pipeline {
        Pipeline {
            id: id.into(),
            name: format!("pipeline {id}"),
            status: Some(status.into()),
            source_connection_id: None,
            target_connection_id: None,
            extra: serde_json::Map::new(),
        }
    }

    fn status(id: &str, status: &str) -> PipelineStatus {
        PipelineStatus {
            pipeline_id: id.into(),
            status: status.into(),
            message: None,
            timestamp: None,
        }
    }

    #[test]
    fn replace_prunes_missing_pipelines() {
        let store = DataStore::default();
        store.replace_pipelines(vec![pipeline("1", "running"), pipeline("2", "paused")]);
        store.replace_pipelines(vec![pipeline("2", "running")]);

        let snap = store.pipelines_snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].status.as_deref(), Some("running"));
        assert!(store.pipeline_by_id("1").is_none());
    }

    #[test]
    fn pushed_status_updates_cached_pipeline() {
        let store = DataStore::default();
        store.replace_pipelines(vec![pipeline("7", "running")]);

        store.apply_pipeline_status(status("7", "failed"));
        assert_eq!(
            store.pipeline_by_id("7").unwrap().status.as_deref(),
            Some("failed")
        );
        assert_eq!(store.pipeline_status("7").unwrap().status, "failed");
    }

    #[test]
    fn status_for_unknown_pipeline_is_only_recorded() {
        let store = DataStore::default();
        store.apply_pipeline_status(status("9", "running"));
        assert_eq!(store.pipeline_count(), 0);
        assert!(store.pipeline_status("9").is_some());
    }
}
