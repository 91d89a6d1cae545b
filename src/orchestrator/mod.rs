//! Run orchestration across the playground slots.
//!
//! A batch marks the requested slots in progress, reconciles the task's input
//! schema once, then drives every slot concurrently: resolve or create a
//! version, stream the run, wait for it to materialize. Each slot owns a
//! cancellable lease; failures and cancellations stay inside their slot.

use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod tokens;

use tokens::{Interrupted, SlotLease, SlotTokens};

use crate::api::PlaygroundBackend;
use crate::clock::{Sleeper, TokioSleeper};
use crate::error::{OrchestratorError, SchemaError};
use crate::poller::{PollOutcome, PollerConfig, RunPoller};
use crate::schema::{clean_input, extract_input_schema, schemas_equivalent, SchemaReconciler};
use crate::slots::{SlotError, SlotIndex, SlotStore, SLOT_COUNT};
use crate::types::{
    CachePolicy, MajorVersion, ModelCatalog, OrganizationUsage, RunChunk, RunId,
    RunParameters, RunRequest, SchemaId, TaskRef, VersionProperties,
};
use crate::versions::{match_version, resolve_version, VersionChoice};

/// Persisted schemas of the task, as last known.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaState {
    pub schema_id: SchemaId,
    pub input_schema: Value,
    pub output_schema: Value,
}

/// How one slot of a batch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    /// The run streamed to completion. `confirmed` is false when it never
    /// became readable within the poll budget.
    Completed { run_id: RunId, confirmed: bool },
    /// The client call failed after the run was created; the run is kept.
    Adopted { run_id: RunId },
    Failed(SlotError),
    /// Cancelled while in flight; the slot was cleared.
    Cancelled,
    /// A newer run took over the slot before this one settled.
    Superseded,
}

/// Result of one [`RunOrchestrator::perform_runs`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<(SlotIndex, SlotOutcome)>,
    /// Schema id the batch migrated to, if the templates drifted.
    pub schema_change: Option<SchemaId>,
}

impl BatchReport {
    pub fn outcome(&self, index: SlotIndex) -> Option<&SlotOutcome> {
        self.outcomes
            .iter()
            .find(|(slot, _)| *slot == index)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Debug, Clone, Default)]
struct Inputs {
    params: RunParameters,
    task_input: Map<String, Value>,
    hidden: BTreeSet<SlotIndex>,
    preferred_major: Option<u32>,
    major_versions: Vec<MajorVersion>,
}

struct Shared {
    schema: SchemaState,
    catalog: Option<ModelCatalog>,
    usage: Option<OrganizationUsage>,
}

/// Immutable view of the inputs a batch runs with.
struct Batch {
    schema_id: SchemaId,
    models: [Option<String>; SLOT_COUNT],
    params: RunParameters,
    task_input: Map<String, Value>,
    preferred_major: Option<u32>,
    major_versions: Vec<MajorVersion>,
    use_cache: CachePolicy,
}

/// Coordinates runs for the three playground slots of one task.
pub struct RunOrchestrator {
    backend: Arc<dyn PlaygroundBackend>,
    task: TaskRef,
    store: SlotStore,
    tokens: SlotTokens,
    reconciler: SchemaReconciler,
    sleeper: Arc<dyn Sleeper>,
    poller: RunPoller,
    inputs: Mutex<Inputs>,
    shared: Mutex<Shared>,
    schema_tx: watch::Sender<SchemaId>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunOrchestrator {
    pub fn new(
        backend: Arc<dyn PlaygroundBackend>,
        task: TaskRef,
        schema: SchemaState,
        store: SlotStore,
    ) -> Self {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let poller = RunPoller::new(backend.clone(), sleeper.clone(), PollerConfig::default());
        let (schema_tx, _) = watch::channel(schema.schema_id);
        Self {
            reconciler: SchemaReconciler::new(backend.clone(), task.clone()),
            backend,
            task,
            store,
            tokens: SlotTokens::default(),
            sleeper,
            poller,
            inputs: Mutex::new(Inputs::default()),
            shared: Mutex::new(Shared {
                schema,
                catalog: None,
                usage: None,
            }),
            schema_tx,
        }
    }

    /// Replace the clock used between run lookups.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.poller = RunPoller::new(self.backend.clone(), sleeper.clone(), self.poller.config());
        self.sleeper = sleeper;
        self
    }

    pub fn with_poller_config(mut self, config: PollerConfig) -> Self {
        self.poller = RunPoller::new(self.backend.clone(), self.sleeper.clone(), config);
        self
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    pub fn any_in_progress(&self) -> bool {
        self.store.any_in_progress()
    }

    /// Receiver of the active schema id. Updated before any run of a batch
    /// that migrated the schema executes.
    pub fn subscribe_schema(&self) -> watch::Receiver<SchemaId> {
        self.schema_tx.subscribe()
    }

    pub fn schema(&self) -> SchemaState {
        lock(&self.shared).schema.clone()
    }

    pub fn catalog(&self) -> Option<ModelCatalog> {
        lock(&self.shared).catalog.clone()
    }

    pub fn organization_usage(&self) -> Option<OrganizationUsage> {
        lock(&self.shared).usage.clone()
    }

    pub fn major_versions(&self) -> Vec<MajorVersion> {
        lock(&self.inputs).major_versions.clone()
    }

    // -- inputs -------------------------------------------------------------

    /// Select the model of one slot. Any run of that slot is cancelled and its
    /// state cleared.
    pub fn set_model(&self, index: SlotIndex, model: Option<String>) {
        self.cancel_run(index);
        self.store.update(index, |slot| {
            slot.clear();
            slot.model_id = model;
        });
    }

    /// Replace the shared run parameters. Every slot is cancelled and cleared.
    pub fn set_parameters(&self, params: RunParameters) {
        lock(&self.inputs).params = params;
        self.reset_all();
    }

    /// Replace the task input. Every slot is cancelled and cleared.
    pub fn set_input(&self, task_input: Map<String, Value>) {
        lock(&self.inputs).task_input = task_input;
        self.reset_all();
    }

    /// Slots skipped when `perform_runs` is called without explicit indexes.
    pub fn set_hidden_slots(&self, hidden: impl IntoIterator<Item = SlotIndex>) {
        lock(&self.inputs).hidden = hidden.into_iter().collect();
    }

    pub fn set_preferred_major(&self, major: Option<u32>) {
        lock(&self.inputs).preferred_major = major;
    }

    pub fn set_major_versions(&self, major_versions: Vec<MajorVersion>) {
        lock(&self.inputs).major_versions = major_versions;
    }

    /// Major version matching the current parameters, if any.
    pub fn matched_version(&self) -> Option<MajorVersion> {
        let inputs = lock(&self.inputs);
        match_version(
            &inputs.major_versions,
            inputs.params.temperature,
            &inputs.params.messages,
            inputs.preferred_major,
        )
        .cloned()
    }

    fn reset_all(&self) {
        self.cancel_all();
        for index in SlotIndex::ALL {
            self.store.reset(index);
        }
    }

    // -- cancellation -------------------------------------------------------

    /// Cancel the in-flight run of one slot and clear it. A settled slot is
    /// left untouched.
    pub fn cancel_run(&self, index: SlotIndex) {
        if self.tokens.cancel(index, || self.store.reset(index)) {
            debug!(slot = %index, "run cancelled");
        }
    }

    pub fn cancel_all(&self) {
        for index in SlotIndex::ALL {
            self.cancel_run(index);
        }
    }

    // -- batches ------------------------------------------------------------

    /// Run the requested slots, or every non-hidden slot when `indexes` is
    /// `None`, and wait until each of them settles.
    ///
    /// Per-slot failures are recorded in the slot store and the report; only a
    /// schema reconciliation failure aborts the batch.
    pub async fn perform_runs(
        &self,
        indexes: Option<&[SlotIndex]>,
    ) -> Result<BatchReport, OrchestratorError> {
        let inputs = lock(&self.inputs).clone();
        let requested: BTreeSet<SlotIndex> = match indexes {
            Some(indexes) => indexes.iter().copied().collect(),
            None => SlotIndex::ALL
                .into_iter()
                .filter(|index| !inputs.hidden.contains(index))
                .collect(),
        };
        if requested.is_empty() {
            return Ok(BatchReport::default());
        }

        let leases: Vec<SlotLease> = requested
            .iter()
            .map(|&index| {
                let lease = self.tokens.acquire(index);
                self.store.update(index, |slot| {
                    slot.clear();
                    slot.in_progress = true;
                });
                lease
            })
            .collect();
        let models = SlotIndex::ALL.map(|index| self.store.get(index).model_id);

        let (schema_change, input_schema) = match self.reconcile_schema(&inputs.params).await {
            Ok(reconciled) => reconciled,
            Err(err) => {
                warn!(error = %err, "aborting batch");
                for lease in &leases {
                    self.tokens
                        .abandon(lease, || self.store.reset(lease.index));
                }
                return Err(OrchestratorError::Schema(err));
            }
        };

        let batch = Batch {
            schema_id: self.schema().schema_id,
            models,
            task_input: clean_input(&inputs.task_input, &input_schema),
            use_cache: CachePolicy::for_temperature(inputs.params.temperature),
            params: inputs.params,
            preferred_major: inputs.preferred_major,
            major_versions: inputs.major_versions,
        };
        info!(
            slots = requested.len(),
            schema_id = batch.schema_id,
            "starting batch"
        );

        let outcomes = join_all(leases.into_iter().map(|lease| self.run_slot(&batch, lease))).await;

        self.refresh_after_batch(batch.schema_id).await;
        Ok(BatchReport {
            outcomes,
            schema_change,
        })
    }

    /// Migrate the input schema if the templates drifted. Returns the new
    /// schema id, if any, and the input schema the batch runs against.
    async fn reconcile_schema(
        &self,
        params: &RunParameters,
    ) -> Result<(Option<SchemaId>, Value), SchemaError> {
        let current = self.schema();
        let extracted = extract_input_schema(&params.messages, Some(&current.input_schema))?;
        let change = self
            .reconciler
            .reconcile_if_needed(
                current.schema_id,
                extracted.as_ref(),
                &current.input_schema,
                &current.output_schema,
            )
            .await?;

        {
            let mut shared = lock(&self.shared);
            if let Some(extracted) = &extracted {
                if !schemas_equivalent(extracted, &shared.schema.input_schema) {
                    shared.schema.input_schema = extracted.clone();
                }
            }
            if let Some(schema_id) = change {
                shared.schema.schema_id = schema_id;
            }
        }

        if let Some(schema_id) = change {
            self.schema_tx.send_replace(schema_id);
            self.refresh_catalog(schema_id).await;
        }
        Ok((change, extracted.unwrap_or(current.input_schema)))
    }

    async fn run_slot(&self, batch: &Batch, lease: SlotLease) -> (SlotIndex, SlotOutcome) {
        let index = lease.index;
        let result = tokio::select! {
            biased;
            _ = lease.token.cancelled() => Err(Interrupted::Cancelled),
            result = self.execute_slot(batch, &lease) => result,
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => match self.tokens.abandon(&lease, || self.store.reset(index)) {
                Interrupted::Cancelled => SlotOutcome::Cancelled,
                Interrupted::Superseded => {
                    debug!(slot = %index, "run superseded by a newer one");
                    SlotOutcome::Superseded
                }
            },
        };
        (index, outcome)
    }

    async fn execute_slot(
        &self,
        batch: &Batch,
        lease: &SlotLease,
    ) -> Result<SlotOutcome, Interrupted> {
        let index = lease.index;
        let Some(model) = batch.models[index.get()].as_deref() else {
            return self.fail(lease, None, "no model selected".to_string());
        };

        let version_id = match resolve_version(
            &batch.major_versions,
            model,
            batch.params.temperature,
            &batch.params.messages,
            batch.preferred_major,
        ) {
            VersionChoice::Reuse(version_id) => {
                debug!(slot = %index, model, version_id = %version_id, "reusing version");
                version_id
            }
            VersionChoice::Create => {
                let properties = VersionProperties::for_model(model, &batch.params);
                match self
                    .backend
                    .create_version(&self.task, batch.schema_id, &properties)
                    .await
                {
                    Ok(version) => version.id,
                    Err(err) => {
                        return self.fail(lease, Some(model), format!("creating version: {err}"))
                    }
                }
            }
        };
        self.tokens.with_current(lease, || ())?;

        let request = RunRequest {
            task_input: batch.task_input.clone(),
            version: version_id,
            use_cache: batch.use_cache,
        };
        let on_event = |chunk: &RunChunk| {
            // Chunks arriving after cancellation are dropped.
            let _ = self
                .tokens
                .with_current(lease, || self.store.apply_chunk(index, Some(chunk)));
        };
        let submitted = self
            .backend
            .submit_run(&self.task, batch.schema_id, &request, &on_event)
            .await;
        let (run_id, adopted) = match submitted {
            Ok(run_id) => (run_id, false),
            Err(err) => match err.run_id() {
                Some(run_id) => {
                    warn!(slot = %index, run_id, error = %err, "run call failed, keeping created run");
                    (run_id.to_string(), true)
                }
                None => return self.fail(lease, Some(model), err.to_string()),
            },
        };
        self.tokens.with_current(lease, || {
            self.store
                .update(index, |slot| slot.run_id = Some(run_id.clone()))
        })?;

        let confirmed = match self.poller.wait_until_created(&self.task, &run_id).await {
            Ok(PollOutcome::Created(_)) => true,
            Ok(PollOutcome::TimedOut) => false,
            Err(err) => {
                warn!(slot = %index, run_id = %run_id, error = %err, "run lookup failed, keeping unconfirmed id");
                false
            }
        };
        self.tokens.finish(lease, || {
            self.store.update(index, |slot| {
                slot.run_id = Some(run_id.clone());
                slot.in_progress = false;
            })
        })?;
        info!(slot = %index, model, run_id = %run_id, confirmed, adopted, "run settled");

        Ok(if adopted {
            SlotOutcome::Adopted { run_id }
        } else {
            SlotOutcome::Completed { run_id, confirmed }
        })
    }

    /// Record a terminal error on the slot. Output and run id are dropped so a
    /// slot never shows both a result and an error.
    fn fail(
        &self,
        lease: &SlotLease,
        model: Option<&str>,
        message: String,
    ) -> Result<SlotOutcome, Interrupted> {
        let error = SlotError {
            model: model.map(str::to_string),
            message,
        };
        self.tokens.finish(lease, || {
            self.store.update(lease.index, |slot| {
                slot.clear();
                slot.error = Some(error.clone());
            })
        })?;
        warn!(slot = %lease.index, model = ?model, error = %error.message, "slot run failed");
        Ok(SlotOutcome::Failed(error))
    }

    async fn refresh_catalog(&self, schema_id: SchemaId) {
        match self
            .backend
            .fetch_models_for_schema(&self.task, schema_id)
            .await
        {
            Ok(catalog) => lock(&self.shared).catalog = Some(catalog),
            Err(err) => warn!(schema_id, error = %err, "model catalog refresh failed"),
        }
    }

    /// Refresh state that running invalidates: pricing, credits and the major
    /// versions new runs may have created. Failures are only logged.
    async fn refresh_after_batch(&self, schema_id: SchemaId) {
        self.refresh_catalog(schema_id).await;

        match self
            .backend
            .refresh_organization_usage(&self.task.tenant)
            .await
        {
            Ok(usage) => lock(&self.shared).usage = Some(usage),
            Err(err) => warn!(error = %err, "organization usage refresh failed"),
        }

        match self
            .backend
            .list_major_versions(&self.task, schema_id)
            .await
        {
            Ok(major_versions) => lock(&self.inputs).major_versions = major_versions,
            Err(err) => warn!(schema_id, error = %err, "major version refresh failed"),
        }
    }
}
