// Table preview
//
// Previews read real rows from the source database and are the slowest
// call the backend serves. Before the real request a short liveness check
// is fired at `/health` and left to run on its own; it only ever logs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::endpoints::client::ApiClient;
use crate::error::Error;
use crate::models::DataPreview;
use crate::orchestrator::RequestOptions;
use crate::transport::{ApiRequest, Transport};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

impl ApiClient {
    /// First `limit` rows of `table`.
    ///
    /// `GET /connections/{id}/preview?table=&limit=`. The deadline is the
    /// preview tier, scaled up for slow source types.
    pub async fn preview_table(
        &self,
        connection_id: &str,
        table: &str,
        source_type: Option<&str>,
        limit: u32,
    ) -> Result<DataPreview, Error> {
        spawn_health_check(Arc::clone(self.transport()));

        let timeout = self.timeouts().preview_for(source_type);
        debug!(
            connection_id,
            table,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "fetching preview"
        );

        let request = ApiRequest::get(format!("connections/{connection_id}/preview"))
            .query("table", table)
            .query("limit", limit);
        let options = RequestOptions::new(timeout)
            .retries(self.orchestrator().retry_policy().max_retries);
        self.fetch(request, options).await
    }
}

/// Fire-and-forget `GET /health` with a short deadline.
fn spawn_health_check(transport: Arc<Transport>) {
    tokio::spawn(async move {
        let request = ApiRequest::get("health");
        let check = transport.send(&request);
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check).await {
            Ok(Ok(_)) => debug!("health check ok"),
            Ok(Err(e)) => warn!(error = %e, "health check failed before preview"),
            Err(_) => warn!(
                timeout_ms = u64::try_from(HEALTH_CHECK_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                "health check timed out before preview"
            ),
        }
    });
}
