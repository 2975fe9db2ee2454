//! Minimal provider-agnostic contract for streaming one model response.
//!
//! This crate defines the conversation message model shared by the turn
//! orchestrator, the session store, and provider adapters, plus the pull-based
//! streaming capability a provider exposes. It excludes provider transport
//! details, protocol payloads, and multi-round orchestration concerns.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod error;

pub use error::{ProviderError, ProviderErrorKind};

/// Error returned while constructing/configuring a provider before any stream starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Conversation role of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One tool invocation requested by the model.
///
/// Arguments are kept as structured JSON in memory and exchanged as JSON text
/// on the wire (`arguments` is a string in persisted and provider payloads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(with = "arguments_text")]
    pub arguments: Value,
}

impl ToolCall {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Returns the arguments encoded as JSON text.
    #[must_use]
    pub fn arguments_text(&self) -> String {
        self.arguments.to_string()
    }
}

/// Provider-neutral conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Builds the tool-role message answering `call_id`.
    #[must_use]
    pub fn tool(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Generic host-mediated tool definition exposed to providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema object: `{type: "object", properties, required, additionalProperties}`.
    pub input_schema: Value,
}

/// One partial tool call emitted while a response streams.
///
/// Fragments sharing an `index` belong to the same call; `arguments` pieces are
/// concatenated in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Incremental item pulled from a provider stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    Text(String),
    ToolCall(ToolCallFragment),
}

/// Single-threaded, pull-based response stream. Exhaustion means end-of-stream.
pub type ResponseStream<'a> = Box<dyn Iterator<Item = Result<StreamDelta, ProviderError>> + 'a>;

/// Input for one streamed model response.
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

/// Immutable metadata describing a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub endpoint: Option<String>,
}

/// Provider interface: `stream(conversation, tool_schemas)`.
pub trait ModelProvider: Send + Sync {
    /// Returns provider identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Opens one streamed response over the full conversation.
    ///
    /// Failures before the first delta are returned directly; failures after
    /// that surface as an `Err` item in the stream.
    fn stream(&self, request: StreamRequest<'_>) -> Result<ResponseStream<'_>, ProviderError>;
}

/// Decodes streamed argument text, treating empty or malformed JSON as `{}`.
#[must_use]
pub fn decode_arguments(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Object(Map::new());
    }

    serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::Object(Map::new()))
}

mod arguments_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::decode_arguments;

    pub fn serialize<S>(arguments: &Value, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&arguments.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(decode_arguments(&text)),
            other => Ok(other),
        }
    }
}
