//! Closed tool registry and the dispatch gate every model tool call passes through.
//!
//! Tools are plain `{name, description, schema, handler}` records registered
//! once at startup. [`ToolRegistry::run_tool`] never fails: unknown names,
//! malformed arguments, handler errors, and handler panics all come back as a
//! structured [`ToolOutcome`].

use std::collections::BTreeMap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};

use agent_provider::ToolDefinition;
use apply_patch_engine::{DiffPreview, PatchError};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::sandbox::{Sandbox, SandboxError};

pub mod approval;
pub mod fs;
pub mod schema;
pub mod search;
pub mod shell;
pub mod web;

pub use approval::{
    rejection_message, ApprovalRequest, Approver, ConsoleApprover, ScriptedApprover,
    USER_REJECTED,
};
pub use schema::{Param, ParamType, ToolArgs, ToolSchema};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Network(String),

    #[error("The user rejected this action: {action}")]
    Rejected { action: String },

    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn io(operation: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Stable tag placed in the `error` field of the structured result.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation(_) | Self::Sandbox(SandboxError::EmptyPath) => "validation_error",
            Self::Sandbox(SandboxError::Escape { .. }) => "path_escape",
            Self::Sandbox(_) | Self::Io { .. } => "io_error",
            Self::NotFound { .. } => "not_found",
            Self::Patch(error) => error.kind(),
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network_error",
            Self::Rejected { .. } => "user_rejected",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Tagged result of one dispatched tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Ok(Value),
    Rejected { action: String },
    Error { kind: &'static str, message: String },
}

impl ToolOutcome {
    pub fn from_result(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(ToolError::Rejected { action }) => Self::Rejected { action },
            Err(error) => Self::Error {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::Rejected { .. } => "rejected",
            Self::Error { kind, .. } => *kind,
        }
    }

    /// JSON value handed back to the model.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Ok(value) => value.clone(),
            Self::Rejected { action } => json!({
                "error": USER_REJECTED,
                "message": rejection_message(action),
            }),
            Self::Error { kind, message } => json!({
                "error": kind,
                "message": message,
            }),
        }
    }
}

/// Mutable state shared with tool handlers for one dispatch.
pub struct ToolContext<'a> {
    sandbox: &'a Sandbox,
    auto_approve: bool,
    approver: &'a mut dyn Approver,
    gate_passes: usize,
}

impl<'a> ToolContext<'a> {
    pub fn new(sandbox: &'a Sandbox, auto_approve: bool, approver: &'a mut dyn Approver) -> Self {
        Self {
            sandbox,
            auto_approve,
            approver,
            gate_passes: 0,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        self.sandbox
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve
    }

    /// Approval gate for mutating actions.
    ///
    /// Passes silently under auto-approve; otherwise asks the approver once.
    pub fn approve(&mut self, action: &str, diff: Option<&DiffPreview>) -> Result<(), ToolError> {
        self.gate_passes += 1;
        if self.auto_approve {
            return Ok(());
        }

        let approved = self.approver.confirm(&ApprovalRequest { action, diff });
        info!(action, approved, "approval decision");
        if approved {
            Ok(())
        } else {
            Err(ToolError::Rejected {
                action: action.to_string(),
            })
        }
    }
}

pub type ToolHandler = fn(&mut ToolContext<'_>, ToolArgs<'_>) -> Result<Value, ToolError>;

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Handler must call [`ToolContext::approve`] before it succeeds.
    pub mutating: bool,
    pub schema: ToolSchema,
    pub handler: ToolHandler,
}

impl ToolSpec {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.schema.to_json(),
        }
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("mutating", &self.mutating)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    Duplicate(String),
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolSpec>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tool.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for spec in fs::specs()
            .into_iter()
            .chain(shell::specs())
            .chain(search::specs())
            .chain(web::specs())
        {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.tools.contains_key(spec.name) {
            return Err(RegistryError::Duplicate(spec.name.to_string()));
        }
        self.tools.insert(spec.name, spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Registered tools ordered by name.
    pub fn tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools().map(ToolSpec::definition).collect()
    }

    /// Looks up, validates and runs one tool, capturing every failure.
    pub fn run_tool(&self, ctx: &mut ToolContext<'_>, name: &str, arguments: &Value) -> ToolOutcome {
        let outcome = ToolOutcome::from_result(self.dispatch(ctx, name, arguments));
        debug!(tool = name, outcome = outcome.label(), "tool dispatched");
        outcome
    }

    fn dispatch(
        &self,
        ctx: &mut ToolContext<'_>,
        name: &str,
        arguments: &Value,
    ) -> Result<Value, ToolError> {
        let spec = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let empty = Map::new();
        let values = match arguments {
            Value::Object(values) => values,
            Value::Null => &empty,
            other => {
                return Err(ToolError::Validation(format!(
                    "Tool args must be an object; got {}",
                    json_type_name(other)
                )));
            }
        };

        spec.schema.validate(values)?;

        let handler = spec.handler;
        let passes_before = ctx.gate_passes;
        let result = catch_unwind(AssertUnwindSafe(|| handler(ctx, ToolArgs::new(values))))
            .unwrap_or_else(|panic| {
                Err(ToolError::Internal(format!(
                    "tool {name} panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        if spec.mutating && result.is_ok() && ctx.gate_passes == passes_before {
            warn!(tool = name, "mutating tool bypassed the approval gate");
            return Err(ToolError::Internal(format!(
                "tool {name} finished without passing the approval gate"
            )));
        }
        result
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Cuts `text` to at most `max_chars` characters, appending `marker` when cut.
pub(crate) fn cap_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cutoff, _)) => format!("{}{marker}", &text[..cutoff]),
        None => text.to_string(),
    }
}
