//! Playground: side-by-side runs of one task on up to three models.
//!
//! The crate drives the run lifecycle of a prompt playground: the user picks a
//! model per slot and edits shared parameters, and [`RunOrchestrator`]
//! reconciles the task's input schema with the message templates, resolves or
//! creates a version per slot, streams each run into the [`SlotStore`] and
//! waits until the run becomes readable. Slots fail, cancel and supersede
//! independently of each other.
//!
//! # Quick start
//!
//! ```no_run
//! use playground::api::HttpBackend;
//! use playground::config::load_config;
//! use playground::orchestrator::{RunOrchestrator, SchemaState};
//! use playground::slots::{SlotIndex, SlotStore};
//! use playground::types::TaskRef;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None)?.config;
//! let backend = Arc::new(HttpBackend::new(&config.api));
//! let schema = SchemaState {
//!     schema_id: 1,
//!     input_schema: json!({"type": "object"}),
//!     output_schema: json!({"type": "object"}),
//! };
//! let orchestrator = RunOrchestrator::new(
//!     backend,
//!     TaskRef::new(config.api.tenant.clone(), "greeter"),
//!     schema,
//!     SlotStore::new(),
//! );
//! orchestrator.set_model(SlotIndex::ALL[0], Some("gpt-4o".into()));
//! let report = orchestrator.perform_runs(None).await?;
//! println!("{:?}", report.outcomes);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod build_info;
pub mod clock;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod params;
pub mod poller;
pub mod schema;
pub mod slots;
#[cfg(test)]
pub mod testsupport;
pub mod types;
pub mod versions;

pub use orchestrator::{BatchReport, RunOrchestrator, SchemaState, SlotOutcome};
pub use slots::{SlotIndex, SlotStore};
