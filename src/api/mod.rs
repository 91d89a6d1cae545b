//! Remote collaborators of the playground.
//!
//! Versions, runs, schemas, the model catalog and organization usage all live
//! in a remote service. The orchestrator only talks to it through
//! [`PlaygroundBackend`], so tests can script every call while production uses
//! [`HttpBackend`].

use crate::error::ApiError;
use crate::types::{
    MajorVersion, ModelCatalog, OrganizationUsage, Run, RunChunk, RunId, RunRequest, SchemaId,
    SchemaUpdate, TaskRef, Version, VersionProperties,
};
use async_trait::async_trait;

mod client;
mod sse;

pub use client::HttpBackend;
pub use sse::SseDecoder;

/// Callback invoked for every partial-result event of a streaming run.
pub type RunEventSink<'a> = &'a (dyn Fn(&RunChunk) + Send + Sync);

/// Operations the playground needs from the versions/runs service.
#[async_trait]
pub trait PlaygroundBackend: Send + Sync {
    async fn create_version(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
        properties: &VersionProperties,
    ) -> Result<Version, ApiError>;

    /// Submit a run and stream its partial state into `on_event`.
    ///
    /// Returns the run id once the stream completes. A failed stream may still
    /// carry the id of a run the service created, see [`ApiError::run_id`].
    async fn submit_run(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
        request: &RunRequest,
        on_event: RunEventSink<'_>,
    ) -> Result<RunId, ApiError>;

    /// Read a run. `Ok(None)` means the service does not know it (yet).
    async fn fetch_run(&self, task: &TaskRef, run_id: &str) -> Result<Option<Run>, ApiError>;

    /// Persist new I/O schemas for the task and return the resulting schema id.
    async fn update_task_schema(
        &self,
        task: &TaskRef,
        update: &SchemaUpdate,
    ) -> Result<SchemaId, ApiError>;

    async fn fetch_models_for_schema(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
    ) -> Result<ModelCatalog, ApiError>;

    async fn list_major_versions(
        &self,
        task: &TaskRef,
        schema_id: SchemaId,
    ) -> Result<Vec<MajorVersion>, ApiError>;

    async fn refresh_organization_usage(
        &self,
        tenant: &str,
    ) -> Result<OrganizationUsage, ApiError>;
}
