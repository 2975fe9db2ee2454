//! Bounded tool-calling loop for one user turn.
//!
//! A turn appends the user message, then alternates between streaming one
//! model response and dispatching the tool calls it requested, until the model
//! answers without tools, the user rejects an action, the provider fails, or
//! the round bound is hit. Orchestration failures roll the conversation back to
//! its length before the user message.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use agent_provider::{
    decode_arguments, Message, ModelProvider, ProviderError, StreamDelta, StreamRequest, ToolCall,
    ToolDefinition,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::conversation::Conversation;
use crate::tools::{cap_chars, ToolContext, ToolOutcome, ToolRegistry};

pub const DEFAULT_MAX_ROUNDS: usize = 12;

/// Upper bound on the serialized tool result handed back to the model.
pub const TOOL_PAYLOAD_MAX_CHARS: usize = 4000;

pub const LOOP_LIMIT_MESSAGE: &str =
    "Stopped after too many tool-call loops. If you need more progress, re-run with a more specific instruction.";

pub const NO_RESPONSE_MESSAGE: &str =
    "LLM didn't respond. Please try again. If the issue persists, check the provider configuration or restart the CLI.";

/// How a turn ended when no orchestration failure occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without requesting tools.
    Completed { rounds: usize },
    /// A mutating tool call was declined; later calls of that round were skipped.
    Rejected { rounds: usize },
    /// The model produced neither text nor tool calls.
    NoResponse,
    /// The provider failed while opening or consuming the stream.
    ProviderFailed(ProviderError),
    /// The round bound was exhausted.
    LoopLimit,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Model backend panicked: {0}")]
    ProviderPanicked(String),

    #[error("failed to encode tool result for {tool}: {source}")]
    Encode {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the observer needs to render one finished tool call.
#[derive(Debug, Clone, Copy)]
pub struct ToolReport<'a> {
    pub call: &'a ToolCall,
    pub outcome: &'a ToolOutcome,
    /// Exactly what the model receives in the tool message.
    pub payload: &'a str,
    pub cache_hit: bool,
    pub elapsed: Duration,
}

/// Progress hooks invoked synchronously while a turn runs.
pub trait TurnObserver {
    fn round_started(&mut self, _round: usize) {}

    fn text_delta(&mut self, _text: &str) {}

    fn response_finished(&mut self) {}

    fn tool_started(&mut self, _call: &ToolCall) {}

    fn tool_finished(&mut self, _report: &ToolReport<'_>) {}

    fn provider_failed(&mut self, _error: &ProviderError) {}

    fn no_response(&mut self) {}

    fn loop_limit(&mut self, _max_rounds: usize) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl TurnObserver for SilentObserver {}

/// Final content of one streamed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl StreamedResponse {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty()
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental parser for streamed text and tool-call fragments.
///
/// Fragments are grouped by stream index. `id` and `name` take the latest
/// non-empty value; argument pieces are concatenated in arrival order.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: BTreeMap<usize, PartialCall>,
}

impl StreamAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: StreamDelta) {
        match delta {
            StreamDelta::Text(text) => self.text.push_str(&text),
            StreamDelta::ToolCall(fragment) => {
                let call = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                    call.id = id;
                }
                if let Some(name) = fragment.name.filter(|name| !name.is_empty()) {
                    call.name = name;
                }
                if let Some(arguments) = fragment.arguments {
                    call.arguments.push_str(&arguments);
                }
            }
        }
    }

    /// Finalizes the response. Calls without a name are dropped; malformed
    /// argument text decodes to an empty object.
    #[must_use]
    pub fn finish(self) -> StreamedResponse {
        let mut tool_calls = Vec::new();
        for call in self.calls.into_values() {
            if call.name.is_empty() {
                continue;
            }
            let id = if call.id.is_empty() {
                format!("toolcall_{}", tool_calls.len())
            } else {
                call.id
            };
            tool_calls.push(ToolCall::new(id, call.name, decode_arguments(&call.arguments)));
        }

        StreamedResponse {
            text: self.text.trim().to_string(),
            tool_calls,
        }
    }
}

/// Per-turn memo of `(tool name, canonical arguments) -> outcome`.
#[derive(Debug, Default)]
pub struct ToolCache {
    entries: HashMap<(String, String), ToolOutcome>,
}

impl ToolCache {
    pub fn get(&self, name: &str, arguments: &Value) -> Option<&ToolOutcome> {
        self.entries
            .get(&(name.to_string(), canonical_json(arguments)))
    }

    pub fn insert(&mut self, name: &str, arguments: &Value, outcome: ToolOutcome) {
        self.entries
            .insert((name.to_string(), canonical_json(arguments)), outcome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (position, key) in keys.into_iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Mutable state one turn operates on.
pub struct TurnContext<'a, 'b> {
    pub conversation: &'a mut Conversation,
    pub tools: &'a mut ToolContext<'b>,
    pub model: &'a str,
    pub observer: &'a mut dyn TurnObserver,
}

/// Drives turns against one provider and one tool registry.
pub struct TurnEngine<'a> {
    provider: &'a dyn ModelProvider,
    registry: &'a ToolRegistry,
    max_rounds: usize,
}

impl<'a> TurnEngine<'a> {
    #[must_use]
    pub fn new(provider: &'a dyn ModelProvider, registry: &'a ToolRegistry) -> Self {
        Self {
            provider,
            registry,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Runs one user turn to its stopping point.
    ///
    /// On `Err` the conversation is exactly as it was before the call.
    pub fn submit_turn(
        &self,
        ctx: &mut TurnContext<'_, '_>,
        user_text: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let start_len = ctx.conversation.len();
        let started = Instant::now();
        info!(
            provider = %self.provider.profile().provider_id,
            model = ctx.model,
            "turn started"
        );

        ctx.conversation.push(Message::user(user_text));
        let result = self.run_rounds(ctx);

        match &result {
            Ok(outcome) => info!(
                ?outcome,
                elapsed_ms = started.elapsed().as_millis(),
                "turn finished"
            ),
            Err(error) => {
                warn!(%error, "turn failed; rolling back conversation");
                ctx.conversation.truncate(start_len);
            }
        }
        result
    }

    fn run_rounds(&self, ctx: &mut TurnContext<'_, '_>) -> Result<TurnOutcome, TurnError> {
        let definitions = self.registry.definitions();
        let mut cache = ToolCache::default();

        for round in 1..=self.max_rounds {
            ctx.observer.round_started(round);

            let response = match self.stream_response(ctx, &definitions)? {
                Ok(response) => response,
                Err(error) => {
                    warn!(kind = error.kind().as_str(), message = error.message(), "provider failed");
                    ctx.observer.provider_failed(&error);
                    return Ok(TurnOutcome::ProviderFailed(error));
                }
            };

            if response.is_empty() {
                ctx.observer.no_response();
                return Ok(TurnOutcome::NoResponse);
            }

            let StreamedResponse { text, tool_calls } = response;
            ctx.conversation
                .push(Message::assistant(text, tool_calls.clone()));

            if tool_calls.is_empty() {
                return Ok(TurnOutcome::Completed { rounds: round });
            }

            for call in &tool_calls {
                if self.dispatch_call(ctx, &mut cache, call)? {
                    return Ok(TurnOutcome::Rejected { rounds: round });
                }
            }
        }

        ctx.conversation
            .push(Message::assistant(LOOP_LIMIT_MESSAGE, Vec::new()));
        ctx.observer.loop_limit(self.max_rounds);
        Ok(TurnOutcome::LoopLimit)
    }

    /// Streams one response. The outer `Err` is an orchestration failure, the
    /// inner one a provider failure.
    fn stream_response(
        &self,
        ctx: &mut TurnContext<'_, '_>,
        definitions: &[ToolDefinition],
    ) -> Result<Result<StreamedResponse, ProviderError>, TurnError> {
        let request = StreamRequest {
            model: ctx.model,
            messages: ctx.conversation.messages(),
            tools: definitions,
        };
        let observer = &mut *ctx.observer;

        let streamed = catch_unwind(AssertUnwindSafe(|| -> Result<StreamedResponse, ProviderError> {
            let stream = self.provider.stream(request)?;
            let mut accumulator = StreamAccumulator::new();
            for delta in stream {
                let delta = delta?;
                if let StreamDelta::Text(text) = &delta {
                    observer.text_delta(text);
                }
                accumulator.push(delta);
            }
            Ok(accumulator.finish())
        }));

        match streamed {
            Ok(Ok(response)) => {
                ctx.observer.response_finished();
                debug!(
                    text_chars = response.text.chars().count(),
                    tool_calls = response.tool_calls.len(),
                    "response streamed"
                );
                Ok(Ok(response))
            }
            Ok(Err(error)) => Ok(Err(error)),
            Err(panic) => Err(TurnError::ProviderPanicked(panic_text(panic.as_ref()))),
        }
    }

    /// Runs or replays one call and records its tool message. Returns whether
    /// the user rejected it.
    fn dispatch_call(
        &self,
        ctx: &mut TurnContext<'_, '_>,
        cache: &mut ToolCache,
        call: &ToolCall,
    ) -> Result<bool, TurnError> {
        ctx.observer.tool_started(call);

        let started = Instant::now();
        let (outcome, cache_hit) = match cache.get(&call.name, &call.arguments) {
            Some(outcome) => (outcome.clone(), true),
            None => {
                let outcome = self.registry.run_tool(ctx.tools, &call.name, &call.arguments);
                cache.insert(&call.name, &call.arguments, outcome.clone());
                (outcome, false)
            }
        };
        let elapsed = started.elapsed();
        debug!(tool = %call.name, cache_hit, outcome = outcome.label(), "tool call finished");

        let encoded = serde_json::to_string_pretty(&outcome.to_value()).map_err(|source| {
            TurnError::Encode {
                tool: call.name.clone(),
                source,
            }
        })?;
        let payload = cap_chars(&encoded, TOOL_PAYLOAD_MAX_CHARS, "");

        ctx.observer.tool_finished(&ToolReport {
            call,
            outcome: &outcome,
            payload: &payload,
            cache_hit,
            elapsed,
        });
        ctx.conversation
            .push(Message::tool(&call.id, &call.name, payload));

        Ok(outcome.is_rejected())
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
