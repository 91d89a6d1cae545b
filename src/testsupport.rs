//! Shared test fixtures for backend, poller and orchestrator test modules.
//!
//! `MockBackend` is a scripted [`PlaygroundBackend`]: every call is recorded,
//! and run behavior is chosen per model so a single batch can mix successes,
//! failures and runs that never finish.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Notify};

use crate::api::{PlaygroundBackend, RunEventSink};
use crate::clock::Sleeper;
use crate::error::ApiError;
use crate::types::{
    MajorVersion, ModelCatalog, ModelInfo, OrganizationUsage, Run, RunChunk, RunId, RunRequest,
    RunVersionRef, SchemaId, SchemaUpdate, TaskRef, Version, VersionProperties,
};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("playground-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// A finished run with a fixed output.
pub fn sample_run(id: &str) -> Run {
    Run {
        id: id.to_string(),
        version: RunVersionRef { id: "v1".into() },
        task_input: json!({}),
        task_output: json!({"answer": "ok"}),
        cost_usd: Some(0.001),
        duration_seconds: Some(0.5),
        tool_call_requests: None,
        error: None,
    }
}

/// How `submit_run` behaves for one model.
#[derive(Clone)]
pub enum RunScript {
    /// Stream `chunks` (a default chunk when empty) and return the run id.
    Succeed { chunks: Vec<RunChunk> },
    /// Reject the submission with an HTTP status.
    FailSubmit(u16),
    /// Stream one chunk, then fail. With `created`, the error carries the run id
    /// and the run becomes readable.
    StreamError { created: bool, message: String },
    /// Never complete.
    Hang,
    /// Wait for `gate` before succeeding.
    Gate(Arc<Notify>),
}

impl RunScript {
    pub fn succeed() -> Self {
        Self::Succeed { chunks: Vec::new() }
    }
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<RunScript>>,
    version_failures: HashMap<String, u16>,
    version_models: HashMap<String, String>,
    created_versions: Vec<(SchemaId, VersionProperties)>,
    run_requests: Vec<(SchemaId, RunRequest)>,
    submits_per_model: HashMap<String, u32>,
    runs: HashMap<String, (Run, u32)>,
    fetch_failures: HashMap<String, u16>,
    fetch_counts: HashMap<String, u32>,
    materialize_misses: u32,
    next_schema_id: Option<SchemaId>,
    schema_update_failure: Option<u16>,
    schema_updates: Vec<SchemaUpdate>,
    major_versions: Vec<MajorVersion>,
    catalog_fetches: Vec<SchemaId>,
    major_version_fetches: Vec<SchemaId>,
    usage_refreshes: u32,
}

/// Scripted, recording [`PlaygroundBackend`].
pub struct MockBackend {
    state: Mutex<MockState>,
    submitted: watch::Sender<usize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let (submitted, _) = watch::channel(0);
        Self {
            state: Mutex::new(MockState::default()),
            submitted,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Queue a behavior for the next submission of `model`. The last queued
    /// script keeps applying once the queue is drained.
    pub fn script_model(&self, model: &str, script: RunScript) {
        self.state()
            .scripts
            .entry(model.to_string())
            .or_default()
            .push_back(script);
    }

    pub fn fail_version_creation(&self, model: &str, status: u16) {
        self.state()
            .version_failures
            .insert(model.to_string(), status);
    }

    /// Make `run` readable after `misses` not-found lookups.
    pub fn materialize_run_after(&self, run: Run, misses: u32) {
        self.state().runs.insert(run.id.clone(), (run, misses));
    }

    /// Runs created by `submit_run` stay unreadable for `misses` lookups.
    pub fn set_materialize_misses(&self, misses: u32) {
        self.state().materialize_misses = misses;
    }

    pub fn fail_fetch(&self, run_id: &str, status: u16) {
        self.state()
            .fetch_failures
            .insert(run_id.to_string(), status);
    }

    pub fn fetch_count(&self, run_id: &str) -> u32 {
        self.state()
            .fetch_counts
            .get(run_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_next_schema_id(&self, schema_id: SchemaId) {
        let mut state = self.state();
        state.next_schema_id = Some(schema_id);
        state.schema_update_failure = None;
    }

    pub fn fail_schema_update(&self, status: u16) {
        self.state().schema_update_failure = Some(status);
    }

    pub fn schema_updates(&self) -> Vec<SchemaUpdate> {
        self.state().schema_updates.clone()
    }

    pub fn set_major_versions(&self, majors: Vec<MajorVersion>) {
        self.state().major_versions = majors;
    }

    pub fn created_versions(&self) -> Vec<(SchemaId, VersionProperties)> {
        self.state().created_versions.clone()
    }

    pub fn run_requests(&self) -> Vec<(SchemaId, RunRequest)> {
        self.state().run_requests.clone()
    }

    pub fn catalog_fetches(&self) -> Vec<SchemaId> {
        self.state().catalog_fetches.clone()
    }

    pub fn major_version_fetches(&self) -> Vec<SchemaId> {
        self.state().major_version_fetches.clone()
    }

    pub fn usage_refreshes(&self) -> u32 {
        self.state().usage_refreshes
    }

    /// Resolve once `count` runs have reached `submit_run`.
    pub async fn wait_for_submits(&self, count: usize) {
        let mut rx = self.submitted.subscribe();
        let _ = rx.wait_for(|submitted| *submitted >= count).await;
    }

    fn next_script(&self, model: &str) -> RunScript {
        let mut state = self.state();
        match state.scripts.get_mut(model) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(RunScript::succeed),
            Some(queue) => queue.front().cloned().unwrap_or_else(RunScript::succeed),
            None => RunScript::succeed(),
        }
    }

    fn model_for_version(&self, version_id: &str) -> String {
        let state = self.state();
        if let Some(model) = state.version_models.get(version_id) {
            return model.clone();
        }
        state
            .major_versions
            .iter()
            .flat_map(|major| major.minors.iter())
            .find(|minor| minor.id == version_id)
            .and_then(|minor| minor.model.clone())
            .unwrap_or_default()
    }

    fn register_run(&self, model: &str) -> RunId {
        let mut state = self.state();
        let count = state.submits_per_model.entry(model.to_string()).or_insert(0);
        *count += 1;
        let run_id = format!("{model}-run-{count}");
        let misses = state.materialize_misses;
        let mut run = sample_run(&run_id);
        run.task_output = json!({"answer": model});
        state.runs.insert(run_id.clone(), (run, misses));
        run_id
    }
}

#[async_trait]
impl PlaygroundBackend for MockBackend {
    async fn create_version(
        &self,
        _task: &TaskRef,
        schema_id: SchemaId,
        properties: &VersionProperties,
    ) -> Result<Version, ApiError> {
        let model = properties.model.clone().unwrap_or_default();
        let mut state = self.state();
        if let Some(status) = state.version_failures.get(&model) {
            return Err(ApiError::status(*status, "version rejected".into(), None));
        }
        state.created_versions.push((schema_id, properties.clone()));
        let id = format!("v-{model}-{}", state.created_versions.len());
        state.version_models.insert(id.clone(), model);
        Ok(Version {
            id,
            schema_id,
            properties: properties.clone(),
        })
    }

    async fn submit_run(
        &self,
        _task: &TaskRef,
        schema_id: SchemaId,
        request: &RunRequest,
        on_event: RunEventSink<'_>,
    ) -> Result<RunId, ApiError> {
        let model = self.model_for_version(&request.version);
        let script = self.next_script(&model);
        self.state()
            .run_requests
            .push((schema_id, request.clone()));
        self.submitted.send_modify(|submitted| *submitted += 1);

        match script {
            RunScript::Succeed { chunks } => {
                let run_id = self.register_run(&model);
                if chunks.is_empty() {
                    on_event(&RunChunk {
                        id: Some(run_id.clone()),
                        task_output: Some(json!({"answer": model})),
                        ..RunChunk::default()
                    });
                }
                for chunk in &chunks {
                    on_event(chunk);
                }
                Ok(run_id)
            }
            RunScript::FailSubmit(status) => {
                Err(ApiError::status(status, format!("{model} unavailable"), None))
            }
            RunScript::StreamError { created, message } => {
                let run_id = created.then(|| self.register_run(&model));
                on_event(&RunChunk {
                    id: run_id.clone(),
                    task_output: Some(json!({"partial": true})),
                    ..RunChunk::default()
                });
                Err(ApiError::Stream { message, run_id })
            }
            RunScript::Hang => std::future::pending().await,
            RunScript::Gate(gate) => {
                gate.notified().await;
                Ok(self.register_run(&model))
            }
        }
    }

    async fn fetch_run(&self, _task: &TaskRef, run_id: &str) -> Result<Option<Run>, ApiError> {
        let mut state = self.state();
        *state.fetch_counts.entry(run_id.to_string()).or_insert(0) += 1;
        if let Some(status) = state.fetch_failures.get(run_id) {
            return Err(ApiError::status(*status, "fetch failed".into(), None));
        }
        match state.runs.get_mut(run_id) {
            Some((_, misses)) if *misses > 0 => {
                *misses -= 1;
                Ok(None)
            }
            Some((run, _)) => Ok(Some(run.clone())),
            None => Ok(None),
        }
    }

    async fn update_task_schema(
        &self,
        _task: &TaskRef,
        update: &SchemaUpdate,
    ) -> Result<SchemaId, ApiError> {
        let mut state = self.state();
        if let Some(status) = state.schema_update_failure {
            return Err(ApiError::status(status, "schema rejected".into(), None));
        }
        state.schema_updates.push(update.clone());
        Ok(state.next_schema_id.unwrap_or(1))
    }

    async fn fetch_models_for_schema(
        &self,
        _task: &TaskRef,
        schema_id: SchemaId,
    ) -> Result<ModelCatalog, ApiError> {
        self.state().catalog_fetches.push(schema_id);
        Ok(ModelCatalog {
            items: vec![ModelInfo {
                id: "gpt-4o".into(),
                name: Some("GPT-4o".into()),
                price_per_input_token_usd: Some(0.0000025),
                price_per_output_token_usd: Some(0.00001),
                is_not_supported_reason: None,
            }],
        })
    }

    async fn list_major_versions(
        &self,
        _task: &TaskRef,
        schema_id: SchemaId,
    ) -> Result<Vec<MajorVersion>, ApiError> {
        let mut state = self.state();
        state.major_version_fetches.push(schema_id);
        Ok(state.major_versions.clone())
    }

    async fn refresh_organization_usage(
        &self,
        _tenant: &str,
    ) -> Result<OrganizationUsage, ApiError> {
        let mut state = self.state();
        state.usage_refreshes += 1;
        Ok(OrganizationUsage {
            current_credits_usd: Some(10.0 - f64::from(state.usage_refreshes)),
            added_credits_usd: Some(10.0),
        })
    }
}

/// [`Sleeper`] that records requested delays and returns at once.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}
