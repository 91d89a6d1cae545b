//! Data model shared by the orchestrator and the remote service.
//!
//! These types serialize directly to/from the JSON payloads exchanged with the
//! versions/runs service. Identifiers are kept as plain strings and integers
//! because the service owns them.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-assigned run identifier.
pub type RunId = String;
/// Server-assigned version identifier.
pub type VersionId = String;
/// Task schema ordinal. Bumped by the service whenever the I/O schema changes.
pub type SchemaId = u32;

/// Reserved task-input key that carries a conversation.
pub const MESSAGES_INPUT_KEY: &str = "workflowai.messages";

/// Length of client-generated message ids.
const INTERNAL_ID_LEN: usize = 21;

/// Tenant + task pair every collaborator call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub tenant: String,
    pub task_id: String,
}

impl TaskRef {
    pub fn new(tenant: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            task_id: task_id.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A file attached to a message, either inline (`data`) or by `url`.
///
/// `url` may itself be a `{{variable}}` placeholder, in which case the file is
/// supplied through the task input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FileRef {
    /// Variable name when the url is a bare `{{name}}` placeholder.
    pub fn template_key(&self) -> Option<&str> {
        let url = self.url.as_deref()?.trim();
        let inner = url.strip_prefix("{{")?.strip_suffix("}}")?.trim();
        (!inner.is_empty()).then_some(inner)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input_dict: Value,
}

/// The result of a tool invocation sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input_dict: Option<Value>,
    #[serde(default)]
    pub result: Value,
}

/// One part of a message body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ContentPart {
    Text(String),
    File(FileRef),
    ToolCallRequest(ToolCallRequest),
    ToolCallResult(ToolCallResult),
}

/// A single message in the playground conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Run this message was produced by. Lookup only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Client-side identity used by editors; never part of a version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            run_id: None,
            internal_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::Text(text.into())])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::Text(text.into())])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::Text(text.into())])
    }

    /// Build the assistant turn that continues a conversation from `run`.
    ///
    /// Tool call requests come first, followed by the JSON-encoded output.
    pub fn assistant_from_run(run: &Run) -> Self {
        let mut content: Vec<ContentPart> = run
            .tool_call_requests
            .iter()
            .flatten()
            .map(|request| ContentPart::ToolCallRequest(request.clone()))
            .collect();
        content.push(ContentPart::Text(run.task_output.to_string()));
        Self {
            role: Role::Assistant,
            content,
            run_id: Some(run.id.clone()),
            internal_id: None,
        }
    }

    /// Assign a fresh client id unless one is already present.
    pub fn with_internal_id(mut self) -> Self {
        if self.internal_id.is_none() {
            self.internal_id = Some(generate_internal_id());
        }
        self
    }

    /// Text parts of this message, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Drop client-only identifiers so messages compare and persist by content.
pub fn strip_internal_ids(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|message| Message {
            internal_id: None,
            ..message.clone()
        })
        .collect()
}

fn generate_internal_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INTERNAL_ID_LEN)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Tools and run parameters
// ---------------------------------------------------------------------------

/// Inline tool definition supplied by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// A tool enabled for a run: either a hosted tool by identifier or an inline one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolSelection {
    Hosted(String),
    Inline(ToolDefinition),
}

/// Parameters shared by every slot of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunParameters {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub enabled_tools: Vec<ToolSelection>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Persisted parameter set of a version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<ToolSelection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

impl VersionProperties {
    /// Properties for running `params` on `model`. Client ids are stripped;
    /// messages are always sent, even when empty, so the version matches the
    /// parameters it was created from.
    pub fn for_model(model: &str, params: &RunParameters) -> Self {
        Self {
            model: Some(model.to_string()),
            temperature: params.temperature,
            enabled_tools: (!params.enabled_tools.is_empty()).then(|| params.enabled_tools.clone()),
            messages: Some(strip_internal_ids(&params.messages)),
        }
    }
}

/// A concrete version of a major, pinned to one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinorVersion {
    pub id: VersionId,
    pub minor: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Human-facing grouping of versions that share temperature, messages and tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MajorVersion {
    pub major: u32,
    pub properties: VersionProperties,
    #[serde(default)]
    pub minors: Vec<MinorVersion>,
}

/// An immutable, persisted parameter set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    pub id: VersionId,
    pub schema_id: SchemaId,
    #[serde(default)]
    pub properties: VersionProperties,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Whether the service may answer from its output cache.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    #[default]
    Auto,
    Always,
    Never,
}

impl CachePolicy {
    /// Only deterministic (temperature exactly zero) runs may be cached.
    pub fn for_temperature(temperature: Option<f64>) -> Self {
        match temperature {
            Some(t) if t == 0.0 => Self::Auto,
            _ => Self::Never,
        }
    }
}

/// Body of a run submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRequest {
    pub task_input: Map<String, Value>,
    pub version: VersionId,
    pub use_cache: CachePolicy,
}

/// A tool call executed (or attempted) while a run streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One step of model reasoning surfaced by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

/// Full partial state of a run, re-sent by the server on every stream event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_steps: Option<Vec<ReasoningStep>>,
}

/// Error recorded on a finished run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunErrorInfo {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Reference to the version a run executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunVersionRef {
    pub id: VersionId,
}

/// A server-recorded execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: RunId,
    pub version: RunVersionRef,
    #[serde(default)]
    pub task_input: Value,
    #[serde(default)]
    pub task_output: Value,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub tool_call_requests: Option<Vec<ToolCallRequest>>,
    #[serde(default)]
    pub error: Option<RunErrorInfo>,
}

// ---------------------------------------------------------------------------
// Schema, catalog and organization
// ---------------------------------------------------------------------------

/// Body of a task-schema update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaUpdate {
    pub input_schema: Value,
    pub output_schema: Value,
}

/// Model available for a task schema, with pricing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price_per_input_token_usd: Option<f64>,
    #[serde(default)]
    pub price_per_output_token_usd: Option<f64>,
    #[serde(default)]
    pub is_not_supported_reason: Option<String>,
}

/// Snapshot of the models offered for one schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelCatalog {
    #[serde(default)]
    pub items: Vec<ModelInfo>,
}

impl ModelCatalog {
    pub fn find(&self, model_id: &str) -> Option<&ModelInfo> {
        self.items.iter().find(|model| model.id == model_id)
    }
}

/// Organization-level usage and credit balance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrganizationUsage {
    #[serde(default)]
    pub current_credits_usd: Option<f64>,
    #[serde(default)]
    pub added_credits_usd: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_part_uses_single_key_objects() {
        let message = Message::new(
            Role::User,
            vec![
                ContentPart::Text("hi".into()),
                ContentPart::File(FileRef {
                    url: Some("{{image}}".into()),
                    ..FileRef::default()
                }),
            ],
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [{"text": "hi"}, {"file": {"url": "{{image}}"}}]
            })
        );
    }

    #[test]
    fn file_template_key_requires_bare_placeholder() {
        let templated = FileRef {
            url: Some(" {{ invoice }} ".into()),
            ..FileRef::default()
        };
        assert_eq!(templated.template_key(), Some("invoice"));

        let literal = FileRef {
            url: Some("https://example.com/{{x}}.png".into()),
            ..FileRef::default()
        };
        assert_eq!(literal.template_key(), None);
    }

    #[test]
    fn strip_internal_ids_keeps_content() {
        let messages = vec![Message::user("a").with_internal_id()];
        assert!(messages[0].internal_id.is_some());
        let stripped = strip_internal_ids(&messages);
        assert_eq!(stripped[0].internal_id, None);
        assert_eq!(stripped[0].content, messages[0].content);
    }

    #[test]
    fn with_internal_id_keeps_existing_id() {
        let mut message = Message::user("a");
        message.internal_id = Some("fixed".into());
        assert_eq!(message.with_internal_id().internal_id.as_deref(), Some("fixed"));
    }

    #[test]
    fn cache_policy_only_caches_zero_temperature() {
        assert_eq!(CachePolicy::for_temperature(Some(0.0)), CachePolicy::Auto);
        assert_eq!(CachePolicy::for_temperature(Some(0.7)), CachePolicy::Never);
        assert_eq!(CachePolicy::for_temperature(None), CachePolicy::Never);
        assert_eq!(serde_json::to_value(CachePolicy::Never).unwrap(), json!("never"));
    }

    #[test]
    fn assistant_message_from_run_puts_tool_calls_first() {
        let run = Run {
            id: "run_9".into(),
            version: RunVersionRef { id: "v1".into() },
            task_input: json!({}),
            task_output: json!({"answer": 42}),
            cost_usd: None,
            duration_seconds: None,
            tool_call_requests: Some(vec![ToolCallRequest {
                id: "call_1".into(),
                tool_name: "search".into(),
                tool_input_dict: json!({"q": "rust"}),
            }]),
            error: None,
        };
        let message = Message::assistant_from_run(&run);
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.run_id.as_deref(), Some("run_9"));
        assert!(matches!(message.content[0], ContentPart::ToolCallRequest(_)));
        assert_eq!(
            message.content[1],
            ContentPart::Text(r#"{"answer":42}"#.into())
        );
    }

    #[test]
    fn version_properties_omit_empty_collections() {
        let params = RunParameters {
            temperature: Some(0.5),
            enabled_tools: Vec::new(),
            messages: vec![Message::system("be brief").with_internal_id()],
        };
        let props = VersionProperties::for_model("gpt-4o", &params);
        let value = serde_json::to_value(&props).unwrap();
        assert!(value.get("enabled_tools").is_none());
        assert!(value["messages"][0].get("internal_id").is_none());
        assert_eq!(value["model"], json!("gpt-4o"));
    }

    #[test]
    fn version_properties_keep_empty_messages() {
        let props = VersionProperties::for_model("gpt-4o", &RunParameters::default());
        let value = serde_json::to_value(&props).unwrap();
        assert_eq!(value["messages"], json!([]));
    }

    #[test]
    fn texts_yields_only_text_parts() {
        let message = Message::new(
            Role::User,
            vec![
                ContentPart::Text("hello".into()),
                ContentPart::File(FileRef::default()),
                ContentPart::Text("{{name}}".into()),
            ],
        );
        assert_eq!(message.texts().collect::<Vec<_>>(), vec!["hello", "{{name}}"]);
    }

    #[test]
    fn catalog_find_by_id() {
        let catalog: ModelCatalog = serde_json::from_value(json!({
            "items": [{"id": "gpt-4o", "name": "GPT-4o"}, {"id": "claude"}]
        }))
        .unwrap();
        assert_eq!(catalog.find("gpt-4o").and_then(|m| m.name.as_deref()), Some("GPT-4o"));
        assert!(catalog.find("missing").is_none());
    }

    #[test]
    fn tool_selection_accepts_hosted_and_inline() {
        let tools: Vec<ToolSelection> =
            serde_json::from_value(json!(["@search-google", {"name": "lookup"}])).unwrap();
        assert_eq!(tools[0], ToolSelection::Hosted("@search-google".into()));
        assert!(matches!(&tools[1], ToolSelection::Inline(def) if def.name == "lookup"));
    }
}
