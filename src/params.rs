//! Playground parameter files consumed by the CLI.
//!
//! A parameter file holds everything a playground session edits: the model of
//! each slot, the shared run parameters, the task input and the task's
//! persisted schemas. Files ending in `.json` are read as JSON, anything else
//! as TOML.
//!
//! ```toml
//! models = ["gpt-4o", "claude-3-5-sonnet", ""]
//! temperature = 0.0
//! input = { name = "Ada" }
//!
//! [[messages]]
//! role = "user"
//! content = [{ text = "Greet {{name}}" }]
//!
//! [schema]
//! id = 1
//! ```

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;

use crate::error::ConfigError;
use crate::orchestrator::SchemaState;
use crate::slots::{SlotIndex, SLOT_COUNT};
use crate::types::{Message, RunParameters, SchemaId, ToolSelection};

/// Contents of a playground parameter file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaygroundFile {
    /// Model per slot, in slot order. Empty strings leave a slot unassigned.
    pub models: Vec<String>,
    pub temperature: Option<f64>,
    pub tools: Vec<ToolSelection>,
    pub messages: Vec<Message>,
    pub input: Map<String, Value>,
    pub preferred_major: Option<u32>,
    pub hidden_slots: Vec<SlotIndex>,
    pub schema: FileSchema,
}

/// Persisted schemas of the task as last fetched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSchema {
    pub id: SchemaId,
    pub input: Option<Value>,
    pub output: Option<Value>,
}

impl PlaygroundFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let file: Self = if is_json {
            serde_json::from_str(&text)
                .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?
        } else {
            toml::from_str(&text)?
        };
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.models.len() > SLOT_COUNT {
            return Err(ConfigError::Invalid(format!(
                "{} models given, the playground has {SLOT_COUNT} slots",
                self.models.len()
            )));
        }
        if self.temperature.is_some_and(|t| !t.is_finite() || t < 0.0) {
            return Err(ConfigError::Invalid(
                "temperature must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    /// Model assigned to `index`, if any.
    pub fn model(&self, index: SlotIndex) -> Option<String> {
        self.models
            .get(index.get())
            .map(|model| model.trim())
            .filter(|model| !model.is_empty())
            .map(str::to_string)
    }

    pub fn parameters(&self) -> RunParameters {
        RunParameters {
            temperature: self.temperature,
            enabled_tools: self.tools.clone(),
            messages: self.messages.clone(),
        }
    }

    /// Schema state, with missing schemas standing in as empty objects.
    pub fn schema_state(&self) -> SchemaState {
        let or_empty = |schema: &Option<Value>| {
            schema
                .clone()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}}))
        };
        SchemaState {
            schema_id: self.schema.id,
            input_schema: or_empty(&self.schema.input),
            output_schema: or_empty(&self.schema.output),
        }
    }
}
