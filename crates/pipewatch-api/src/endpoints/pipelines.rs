// Pipeline endpoints
//
// Listing, CRUD, lifecycle actions (trigger / pause / stop) and export.

use serde::Serialize;
use tracing::debug;

use crate::endpoints::client::{ApiClient, encode_body};
use crate::error::Error;
use crate::models::{Pipeline, PipelineAction};
use crate::orchestrator::TimeoutTier;
use crate::transport::ApiRequest;

impl ApiClient {
    /// `GET /pipelines?skip=&limit=`
    pub async fn list_pipelines(&self, skip: u32, limit: u32) -> Result<Vec<Pipeline>, Error> {
        let request = ApiRequest::get("pipelines")
            .query("skip", skip)
            .query("limit", limit);
        let options = self
            .read_options(TimeoutTier::List)
            .dedup(format!("pipelines-{skip}-{limit}"));
        self.fetch_list(request, options).await
    }

    /// `GET /pipelines/{id}`
    pub async fn get_pipeline(&self, id: &str) -> Result<Pipeline, Error> {
        let options = self
            .read_options(TimeoutTier::Quick)
            .dedup(format!("pipeline-{id}"));
        self.fetch(ApiRequest::get(format!("pipelines/{id}")), options)
            .await
    }

    /// `POST /pipelines`
    pub async fn create_pipeline<B: Serialize>(&self, body: &B) -> Result<Pipeline, Error> {
        debug!("creating pipeline");
        let request = ApiRequest::post("pipelines").json(encode_body(body)?);
        self.fetch(request, self.mutation_options()).await
    }

    /// `PUT /pipelines/{id}`
    pub async fn update_pipeline<B: Serialize>(
        &self,
        id: &str,
        body: &B,
    ) -> Result<Pipeline, Error> {
        debug!(id, "updating pipeline");
        let request = ApiRequest::put(format!("pipelines/{id}")).json(encode_body(body)?);
        self.fetch(request, self.mutation_options()).await
    }

    /// `DELETE /pipelines/{id}`
    pub async fn delete_pipeline(&self, id: &str) -> Result<(), Error> {
        debug!(id, "deleting pipeline");
        self.call(
            ApiRequest::delete(format!("pipelines/{id}")),
            self.mutation_options(),
        )
        .await?;
        Ok(())
    }

    /// Run a lifecycle action.
    ///
    /// `POST /pipelines/{id}/{trigger|pause|stop}`
    pub async fn pipeline_action(&self, id: &str, action: PipelineAction) -> Result<(), Error> {
        debug!(id, %action, "pipeline action");
        let request = ApiRequest::post(format!("pipelines/{id}/{action}")).expect_any();
        self.call(request, self.mutation_options()).await?;
        Ok(())
    }

    pub async fn trigger_pipeline(&self, id: &str) -> Result<(), Error> {
        self.pipeline_action(id, PipelineAction::Trigger).await
    }

    pub async fn pause_pipeline(&self, id: &str) -> Result<(), Error> {
        self.pipeline_action(id, PipelineAction::Pause).await
    }

    pub async fn stop_pipeline(&self, id: &str) -> Result<(), Error> {
        self.pipeline_action(id, PipelineAction::Stop).await
    }

    /// Full pipeline definition as the server exports it.
    ///
    /// `GET /pipelines/{id}/export`
    pub async fn export_pipeline(&self, id: &str) -> Result<serde_json::Value, Error> {
        let options = self.read_options(TimeoutTier::List);
        self.fetch(ApiRequest::get(format!("pipelines/{id}/export")), options)
            .await
    }
}
