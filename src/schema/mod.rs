//! Schema drift detection and migration.
//!
//! The input schema of a task is implied by the variables its message
//! templates reference. When the templates change shape, the persisted schema
//! is migrated once, before any run of the batch is submitted.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

mod extract;

pub use extract::extract_input_schema;

use crate::api::PlaygroundBackend;
use crate::error::ApiError;
use crate::types::{SchemaId, SchemaUpdate, TaskRef, MESSAGES_INPUT_KEY};

const ANNOTATION_KEYS: &[&str] = &["title", "description", "examples", "default", "required"];
const NAMED_SCHEMA_MAPS: &[&str] = &["properties", "$defs", "definitions", "patternProperties"];

fn normalize(schema: &Value) -> Value {
    match schema {
        Value::Object(object) => {
            let mut out = Map::new();
            for (key, value) in object {
                if ANNOTATION_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let normalized = match value {
                    Value::Object(named) if NAMED_SCHEMA_MAPS.contains(&key.as_str()) => {
                        Value::Object(
                            named
                                .iter()
                                .map(|(name, sub)| (name.clone(), normalize(sub)))
                                .collect(),
                        )
                    }
                    other => normalize(other),
                };
                out.insert(key.clone(), normalized);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

/// Structural schema equality, ignoring annotations and `required` lists.
///
/// Property names are never treated as annotations: a property called
/// `title` still counts.
pub fn schemas_equivalent(a: &Value, b: &Value) -> bool {
    normalize(a) == normalize(b)
}

/// Keep only the input keys declared by `schema`, plus the reserved
/// conversation key.
///
/// A schema without `properties` leaves the input untouched.
pub fn clean_input(input: &Map<String, Value>, schema: &Value) -> Map<String, Value> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return input.clone();
    };
    input
        .iter()
        .filter(|(key, _)| properties.contains_key(*key) || key.as_str() == MESSAGES_INPUT_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Migrates the task's input schema when the templates drift from it.
pub struct SchemaReconciler {
    backend: Arc<dyn PlaygroundBackend>,
    task: TaskRef,
    last_applied: Mutex<Option<Value>>,
}

impl SchemaReconciler {
    pub fn new(backend: Arc<dyn PlaygroundBackend>, task: TaskRef) -> Self {
        Self {
            backend,
            task,
            last_applied: Mutex::new(None),
        }
    }

    /// Update the task schema if `extracted` differs from `persisted`.
    ///
    /// Returns the new schema id only when it differs from `current_schema_id`.
    /// An identical extracted schema is never submitted twice.
    pub async fn reconcile_if_needed(
        &self,
        current_schema_id: SchemaId,
        extracted: Option<&Value>,
        persisted: &Value,
        output_schema: &Value,
    ) -> Result<Option<SchemaId>, ApiError> {
        let Some(extracted) = extracted else {
            return Ok(None);
        };
        if schemas_equivalent(extracted, persisted) {
            return Ok(None);
        }

        let mut last_applied = self.last_applied.lock().await;
        if last_applied
            .as_ref()
            .is_some_and(|applied| schemas_equivalent(applied, extracted))
        {
            debug!(schema_id = current_schema_id, "schema already migrated");
            return Ok(None);
        }

        let update = SchemaUpdate {
            input_schema: extracted.clone(),
            output_schema: output_schema.clone(),
        };
        let new_schema_id = self.backend.update_task_schema(&self.task, &update).await?;
        *last_applied = Some(extracted.clone());

        if new_schema_id == current_schema_id {
            debug!(schema_id = current_schema_id, "schema update kept the same id");
            return Ok(None);
        }
        info!(
            from = current_schema_id,
            to = new_schema_id,
            task = %self.task.task_id,
            "input schema migrated"
        );
        Ok(Some(new_schema_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::MockBackend;
    use serde_json::json;

    fn persisted() -> Value {
        json!({
            "type": "object",
            "title": "Input",
            "properties": {
                "question": {"type": "string", "description": "asked"},
                "title": {}
            },
            "required": ["question"]
        })
    }

    #[test]
    fn equivalence_ignores_annotations_but_not_property_names() {
        let bare = json!({
            "type": "object",
            "properties": {"question": {"type": "string"}, "title": {}}
        });
        assert!(schemas_equivalent(&persisted(), &bare));

        let missing_title = json!({
            "type": "object",
            "properties": {"question": {"type": "string"}}
        });
        assert!(!schemas_equivalent(&persisted(), &missing_title));
    }

    #[test]
    fn clean_input_drops_undeclared_keys() {
        let mut input = Map::new();
        input.insert("question".into(), json!("why"));
        input.insert("stale".into(), json!(1));
        input.insert(MESSAGES_INPUT_KEY.into(), json!([]));

        let cleaned = clean_input(&input, &persisted());

        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.contains_key("question"));
        assert!(cleaned.contains_key(MESSAGES_INPUT_KEY));
        assert_eq!(clean_input(&input, &json!({})).len(), 3);
    }

    #[tokio::test]
    async fn equivalent_schema_skips_update() {
        let backend = Arc::new(MockBackend::new());
        let reconciler = SchemaReconciler::new(backend.clone(), TaskRef::new("_", "t"));
        let extracted = json!({
            "type": "object",
            "properties": {"question": {"type": "string"}, "title": {}}
        });

        let outcome = reconciler
            .reconcile_if_needed(1, Some(&extracted), &persisted(), &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert!(backend.schema_updates().is_empty());
    }

    #[tokio::test]
    async fn no_template_means_no_drift() {
        let backend = Arc::new(MockBackend::new());
        let reconciler = SchemaReconciler::new(backend.clone(), TaskRef::new("_", "t"));

        let outcome = reconciler
            .reconcile_if_needed(1, None, &persisted(), &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert!(backend.schema_updates().is_empty());
    }

    #[tokio::test]
    async fn drift_updates_at_most_once() {
        let backend = Arc::new(MockBackend::new());
        backend.set_next_schema_id(2);
        let reconciler = SchemaReconciler::new(backend.clone(), TaskRef::new("_", "t"));
        let extracted = json!({"type": "object", "properties": {"name": {}}});
        let output = json!({"type": "object", "properties": {"greeting": {"type": "string"}}});

        let first = reconciler
            .reconcile_if_needed(1, Some(&extracted), &persisted(), &output)
            .await
            .unwrap();
        let second = reconciler
            .reconcile_if_needed(1, Some(&extracted), &persisted(), &output)
            .await
            .unwrap();

        assert_eq!(first, Some(2));
        assert_eq!(second, None);
        let updates = backend.schema_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].input_schema, extracted);
        assert_eq!(updates[0].output_schema, output);
    }

    #[tokio::test]
    async fn same_schema_id_is_not_reported() {
        let backend = Arc::new(MockBackend::new());
        backend.set_next_schema_id(1);
        let reconciler = SchemaReconciler::new(backend.clone(), TaskRef::new("_", "t"));
        let extracted = json!({"type": "object", "properties": {"name": {}}});

        let outcome = reconciler
            .reconcile_if_needed(1, Some(&extracted), &persisted(), &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert_eq!(backend.schema_updates().len(), 1);
    }

    #[tokio::test]
    async fn update_failure_propagates_and_allows_retry() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_schema_update(500);
        let reconciler = SchemaReconciler::new(backend.clone(), TaskRef::new("_", "t"));
        let extracted = json!({"type": "object", "properties": {"name": {}}});

        let err = reconciler
            .reconcile_if_needed(1, Some(&extracted), &persisted(), &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));

        backend.set_next_schema_id(3);
        let retried = reconciler
            .reconcile_if_needed(1, Some(&extracted), &persisted(), &json!({}))
            .await
            .unwrap();
        assert_eq!(retried, Some(3));
    }
}
