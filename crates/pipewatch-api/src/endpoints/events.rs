// Replication event and monitoring metric listings

use crate::endpoints::client::ApiClient;
use crate::error::Error;
use crate::models::{EventQuery, MonitoringMetric, ReplicationEvent};
use crate::orchestrator::TimeoutTier;
use crate::transport::ApiRequest;

impl ApiClient {
    /// `GET /events?skip=&limit=[&pipeline_id=]`
    pub async fn list_events(&self, query: &EventQuery) -> Result<Vec<ReplicationEvent>, Error> {
        let request = ApiRequest::get("events").query_pairs(query.params());
        let options = self
            .read_options(TimeoutTier::List)
            .dedup(query.dedup_key("events"));
        self.fetch_list(request, options).await
    }

    /// `GET /metrics?skip=&limit=[&pipeline_id=]`
    pub async fn list_metrics(&self, query: &EventQuery) -> Result<Vec<MonitoringMetric>, Error> {
        let request = ApiRequest::get("metrics").query_pairs(query.params());
        let options = self
            .read_options(TimeoutTier::List)
            .dedup(query.dedup_key("metrics"));
        self.fetch_list(request, options).await
    }
}
