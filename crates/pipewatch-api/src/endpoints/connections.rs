// Connection endpoints
//
// CRUD for source/target database connections, the connectivity test and
// table discovery. Listings deduplicate on their full parameter set;
// mutations and tests run once.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoints::client::{ApiClient, encode_body};
use crate::error::Error;
use crate::models::{Connection, ConnectionTestResult};
use crate::orchestrator::{RequestOptions, TimeoutTier};
use crate::transport::ApiRequest;

/// A table entry: either a bare name or an object carrying one.
#[derive(Deserialize)]
#[serde(untagged)]
enum TableEntry {
    Name(String),
    Object {
        #[serde(alias = "table_name")]
        name: String,
    },
}

impl TableEntry {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Object { name } => name,
        }
    }
}

impl ApiClient {
    /// `GET /connections?skip=&limit=`
    pub async fn list_connections(&self, skip: u32, limit: u32) -> Result<Vec<Connection>, Error> {
        let request = ApiRequest::get("connections")
            .query("skip", skip)
            .query("limit", limit);
        let options = self
            .read_options(TimeoutTier::List)
            .dedup(format!("connections-{skip}-{limit}"));
        self.fetch_list(request, options).await
    }

    /// `GET /connections/{id}`
    pub async fn get_connection(&self, id: &str) -> Result<Connection, Error> {
        let options = self
            .read_options(TimeoutTier::Quick)
            .dedup(format!("connection-{id}"));
        self.fetch(ApiRequest::get(format!("connections/{id}")), options)
            .await
    }

    /// `POST /connections`
    pub async fn create_connection<B: Serialize>(&self, body: &B) -> Result<Connection, Error> {
        debug!("creating connection");
        let request = ApiRequest::post("connections").json(encode_body(body)?);
        self.fetch(request, self.mutation_options()).await
    }

    /// `PUT /connections/{id}`
    pub async fn update_connection<B: Serialize>(
        &self,
        id: &str,
        body: &B,
    ) -> Result<Connection, Error> {
        debug!(id, "updating connection");
        let request = ApiRequest::put(format!("connections/{id}")).json(encode_body(body)?);
        self.fetch(request, self.mutation_options()).await
    }

    /// `DELETE /connections/{id}`
    pub async fn delete_connection(&self, id: &str) -> Result<(), Error> {
        debug!(id, "deleting connection");
        self.call(
            ApiRequest::delete(format!("connections/{id}")),
            self.mutation_options(),
        )
        .await?;
        Ok(())
    }

    /// Ask the backend to reach the connection's database.
    ///
    /// `POST /connections/{id}/test`. Runs once with the long
    /// connection-test deadline; the backend itself may wait on a
    /// connector timeout before answering.
    pub async fn test_connection(&self, id: &str) -> Result<ConnectionTestResult, Error> {
        debug!(id, "testing connection");
        let options = RequestOptions::new(self.timeouts().timeout(TimeoutTier::ConnectionTest));
        self.fetch(ApiRequest::post(format!("connections/{id}/test")), options)
            .await
    }

    /// Table names visible through a connection.
    ///
    /// `GET /connections/{id}/tables`
    pub async fn list_tables(&self, id: &str) -> Result<Vec<String>, Error> {
        let options = self
            .read_options(TimeoutTier::List)
            .dedup(format!("tables-{id}"));
        let entries: Vec<TableEntry> = self
            .fetch_list(ApiRequest::get(format!("connections/{id}/tables")), options)
            .await?;
        Ok(entries.into_iter().map(TableEntry::into_name).collect())
    }
}
