//! reqwest adapter for the ingestion backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;

use docket_common::api::types::{
    CollectionId, CollectionInfo, DocumentId, DocumentInfo, JobStatus, SubmitOutcome,
    SubmitResponse,
};
use docket_common::config::normalize_base_url;

use crate::client::IngestApi;
use crate::error::{Error, Result};
use crate::queue::UploadTask;

const USER_AGENT: &str = concat!("docket/", env!("CARGO_PKG_VERSION"));

/// Transport settings for the HTTP adapter.
///
/// These bound the socket, not the operation: the orchestrator applies
/// its own per-call ceilings on top.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(600),
        }
    }
}

/// Error body shape the backend uses for non-2xx answers.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Production `IngestApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIngestApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIngestApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_settings(base_url, HttpSettings::default())
    }

    pub fn with_settings(base_url: impl Into<String>, settings: HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            base_url: normalize_base_url(&base_url.into()),
            client,
        })
    }

    /// Convert a non-2xx answer into `Error::Api`, pulling the message
    /// out of the backend's `{"detail": ...}` body when present.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail)
            .unwrap_or(body);

        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl IngestApi for HttpIngestApi {
    async fn submit_upload(
        &self,
        collection: &CollectionId,
        task: &UploadTask,
    ) -> Result<SubmitOutcome> {
        let url = format!("{}/collections/{}/documents", self.base_url, collection);

        let part = multipart::Part::bytes(task.payload.to_vec()).file_name(task.filename.clone());
        let form = multipart::Form::new()
            .part("file", part)
            .text("vision_model", task.vision_model.clone());

        tracing::debug!(
            collection = %collection,
            file = %task.filename,
            bytes = task.payload.len(),
            "Submitting upload"
        );

        let response = self.client.post(&url).multipart(form).send().await?;
        let response = Self::check(response).await?;

        let submit: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;

        Ok(submit.status)
    }

    async fn job_status(&self, collection: &CollectionId) -> Result<JobStatus> {
        let url = format!("{}/collections/{}/status", self.base_url, collection);

        let response = self.client.get(&url).send().await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }

    async fn delete_document(&self, document: &DocumentId) -> Result<()> {
        let url = format!("{}/documents/{}", self.base_url, document);

        tracing::debug!(document = %document, "Deleting document");

        let response = self.client.delete(&url).send().await?;
        Self::check(response).await?;

        Ok(())
    }

    async fn list_documents(&self, collection: &CollectionId) -> Result<Vec<DocumentInfo>> {
        let url = format!("{}/collections/{}/documents", self.base_url, collection);

        let response = self.client.get(&url).send().await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let url = format!("{}/collections", self.base_url);

        let response = self.client.get(&url).send().await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }
}
