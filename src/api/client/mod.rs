//! reqwest-backed implementation of [`PlaygroundBackend`].
//!
//! The facade stays small:
//! - status/JSON handling lives in `transport`.
//! - retry policy for reads lives in `retry`.
//! - SSE framing lives in `api::sse`.

mod retry;
mod transport;

use super::sse::SseDecoder;
use super::{PlaygroundBackend, RunEventSink};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::{
    MajorVersion, ModelCatalog, OrganizationUsage, Run, RunChunk, RunId, RunRequest, SchemaId,
    SchemaUpdate, TaskRef, Version, VersionProperties,
};
use async_trait::async_trait;
use retry::RetryPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Client for the versions/runs HTTP API.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry_policy: RetryPolicy,
}

#[derive(Serialize)]
struct CreateVersionBody<'a> {
    properties: &'a VersionProperties,
}

#[derive(Deserialize)]
struct CreateVersionResponse {
    id: String,
    #[serde(default)]
    properties: Option<VersionProperties>,
}

#[derive(Serialize)]
struct StreamingRunBody<'a> {
    #[serde(flatten)]
    request: &'a RunRequest,
    stream: bool,
}

#[derive(Serialize)]
struct CreateAgentBody<'a> {
    id: &'a str,
    input_schema: &'a Value,
    output_schema: &'a Value,
}

#[derive(Deserialize)]
struct CreateAgentResponse {
    schema_id: SchemaId,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct StreamErrorPayload {
    #[serde(default)]
    id: Option<String>,
    error: StreamErrorDetail,
}

#[derive(Deserialize)]
struct StreamErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl HttpBackend {
    /// Build a client from resolved API configuration.
    pub fn new(config: &ApiConfig) -> Self {
        Self::new_with_retry_policy(config, RetryPolicy::default())
    }

    fn new_with_retry_policy(config: &ApiConfig, retry_policy: RetryPolicy) -> Self {
        Self {
            http: transport::build_http_client(Duration::from_secs(config.timeout_secs)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
            retry_policy,
        }
    }

    fn task_url(&self, task: &TaskRef, rest: &str) -> String {
        format!(
            "{}/v1/{}/agents/{}/{rest}",
            self.base_url, task.tenant, task.task_id
        )
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.authorized(self.http.post(url)).json(body).send().await?;
        transport::read_json(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            let result = match self.authorized(self.http.get(url)).send().await {
                Ok(response) => transport::read_json(response).await,
                Err(err) => Err(ApiError::Http(err)),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.retry_policy.should_retry(&err, attempt) {
                        return Err(err);
                    }
                    let delay = self.retry_policy.retry_delay_for(attempt, &err);
                    debug!(url, attempt, error = %err, "retrying read");
                    attempt = attempt.saturating_add(1);
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Decode one SSE payload of a run stream.
fn decode_run_event(payload: &str) -> Result<RunChunk, ApiError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ApiError::InvalidResponse(format!("run event: {e}")))?;
    if value.get("error").is_some_and(|error| !error.is_null()) {
        let failure: StreamErrorPayload = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("run error event: {e}")))?;
        let message = failure
            .error
            .message
            .or(failure.error.code)
            .unwrap_or_else(|| "run failed".to_string());
        return Err(ApiError::Stream {
            message,
            run_id: failure.id,
        });
    }
    serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(format!("run event: {e}")))
}

/// Decode one payload, remember the run id it carries and forward it.
/// A stream error without its own id inherits the last id seen.
fn apply_run_event(
    payload: &str,
    run_id: &mut Option<RunId>,
    on_event: RunEventSink<'_>,
) -> Result<(), ApiError> {
    if payload.trim() == "[DONE]" {
        return Ok(());
    }
    let chunk = decode_run_event(payload).map_err(|err| match err {
        ApiError::Stream {
            message,
            run_id: None,
        } => ApiError::Stream {
            message,
            run_id: run_id.clone(),
        },
        other => other,
    })?;
    if let Some(id) = &chunk.id {
        *run_id = Some(id.clone());
    }
    on_event(&chunk);
    Ok(())
}

#[async_trait]
impl PlaygroundBackend for HttpBackend {
    async fn create_version(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
        properties: &VersionProperties,
    ) -> Result<Version, ApiError> {
        let url = self.task_url(task, &format!("schemas/{schema_id}/versions"));
        let created: CreateVersionResponse = self
            .post_json(&url, &CreateVersionBody { properties })
            .await?;
        Ok(Version {
            id: created.id,
            schema_id,
            properties: created.properties.unwrap_or_else(|| properties.clone()),
        })
    }

    async fn submit_run(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
        request: &RunRequest,
        on_event: RunEventSink<'_>,
    ) -> Result<RunId, ApiError> {
        let url = self.task_url(task, &format!("schemas/{schema_id}/run"));
        let body = StreamingRunBody {
            request,
            stream: true,
        };
        let mut response = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(transport::error_for_status(response).await);
        }

        let mut decoder = SseDecoder::new();
        let mut run_id: Option<RunId> = None;
        loop {
            let bytes = match response.chunk().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                // The run exists once an event carried its id.
                Err(err) => match run_id {
                    Some(id) => {
                        return Err(ApiError::Stream {
                            message: format!("stream interrupted: {err}"),
                            run_id: Some(id),
                        })
                    }
                    None => return Err(ApiError::Http(err)),
                },
            };
            for payload in decoder.push(&bytes) {
                apply_run_event(&payload, &mut run_id, on_event)?;
            }
        }
        if let Some(payload) = decoder.finish() {
            apply_run_event(&payload, &mut run_id, on_event)?;
        }

        run_id.ok_or_else(|| {
            warn!(task = %task.task_id, "run stream ended without a run id");
            ApiError::InvalidResponse("run stream ended without a run id".to_string())
        })
    }

    async fn fetch_run(&self, task: &TaskRef, run_id: &str) -> Result<Option<Run>, ApiError> {
        let url = self.task_url(task, &format!("runs/{run_id}"));
        match self.get_json(&url).await {
            Ok(run) => Ok(Some(run)),
            Err(err) if err.status_code() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn update_task_schema(
        &self,
        task: &TaskRef,
        update: &SchemaUpdate,
    ) -> Result<SchemaId, ApiError> {
        let url = format!("{}/v1/{}/agents", self.base_url, task.tenant);
        let body = CreateAgentBody {
            id: &task.task_id,
            input_schema: &update.input_schema,
            output_schema: &update.output_schema,
        };
        let created: CreateAgentResponse = self.post_json(&url, &body).await?;
        Ok(created.schema_id)
    }

    async fn fetch_models_for_schema(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
    ) -> Result<ModelCatalog, ApiError> {
        let url = self.task_url(task, &format!("schemas/{schema_id}/models"));
        self.get_json(&url).await
    }

    async fn list_major_versions(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
    ) -> Result<Vec<MajorVersion>, ApiError> {
        let url = self.task_url(task, &format!("schemas/{schema_id}/major-versions"));
        let page: Page<MajorVersion> = self.get_json(&url).await?;
        Ok(page.items)
    }

    async fn refresh_organization_usage(
        &self,
        tenant: &str,
    ) -> Result<OrganizationUsage, ApiError> {
        let url = format!("{}/v1/{tenant}/organization/settings", self.base_url);
        self.get_json(&url).await
    }
}
