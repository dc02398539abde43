// Health endpoint

use crate::endpoints::client::ApiClient;
use crate::error::Error;
use crate::models::HealthStatus;
use crate::orchestrator::TimeoutTier;
use crate::transport::ApiRequest;

impl ApiClient {
    /// Backend liveness.
    ///
    /// `GET /health`
    pub async fn health(&self) -> Result<HealthStatus, Error> {
        let options = self.read_options(TimeoutTier::Quick).dedup("health");
        self.fetch(ApiRequest::get("health"), options).await
    }
}
