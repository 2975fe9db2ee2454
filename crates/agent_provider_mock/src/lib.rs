//! Deterministic mock implementation of the shared `agent_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use agent_provider::{
    Message, ModelProvider, ProviderError, ProviderProfile, ResponseStream, Role, StreamDelta,
    StreamRequest, ToolCallFragment,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// One scripted model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Stream the given deltas, then end normally.
    Deltas(Vec<StreamDelta>),
    /// Fail before any delta is produced.
    OpenError(ProviderError),
    /// Stream the given deltas, then yield the error as the final item.
    FailAfter(Vec<StreamDelta>, ProviderError),
}

impl MockResponse {
    /// Plain assistant text split into word-sized deltas.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Deltas(word_deltas(text))
    }

    /// A single complete tool call at stream index 0.
    #[must_use]
    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        Self::tool_calls(&[(id, name, arguments)])
    }

    /// Several tool calls, one per stream index, each split across two fragments.
    #[must_use]
    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Self {
        let mut deltas = Vec::new();
        for (index, (id, name, arguments)) in calls.iter().enumerate() {
            let split = split_point(arguments);
            deltas.push(StreamDelta::ToolCall(ToolCallFragment {
                index,
                id: Some((*id).to_string()),
                name: Some((*name).to_string()),
                arguments: Some(arguments[..split].to_string()),
            }));
            deltas.push(StreamDelta::ToolCall(ToolCallFragment {
                index,
                id: None,
                name: None,
                arguments: Some(arguments[split..].to_string()),
            }));
        }
        Self::Deltas(deltas)
    }

    /// Empty response: no text and no tool calls.
    #[must_use]
    pub fn empty() -> Self {
        Self::Deltas(Vec::new())
    }
}

/// Snapshot of one `stream` call, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

#[derive(Debug)]
enum Mode {
    Echo,
    Scripted {
        queue: VecDeque<MockResponse>,
        repeat_last: bool,
        last: Option<MockResponse>,
    },
}

/// Deterministic mock provider used by `coding_agent` tests and local runs.
#[derive(Debug)]
pub struct MockProvider {
    mode: Mutex<Mode>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockProvider {
    /// Provider that echoes the latest user message back as assistant text.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    /// Provider that replays `responses` in order, then returns empty responses.
    #[must_use]
    pub fn scripted(responses: Vec<MockResponse>) -> Self {
        Self::with_mode(Mode::Scripted {
            queue: responses.into(),
            repeat_last: false,
            last: None,
        })
    }

    /// Provider that returns `response` for every call.
    #[must_use]
    pub fn repeating(response: MockResponse) -> Self {
        Self::with_mode(Mode::Scripted {
            queue: VecDeque::new(),
            repeat_last: true,
            last: Some(response),
        })
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    /// Number of `stream` calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }

    fn next_response(&self, messages: &[Message]) -> MockResponse {
        let mut mode = lock_unpoisoned(&self.mode);
        match &mut *mode {
            Mode::Echo => {
                let prompt = messages
                    .iter()
                    .rev()
                    .find(|message| message.role == Role::User)
                    .map(|message| message.content.as_str())
                    .unwrap_or_default();
                MockResponse::text(&format!("mock: {prompt}"))
            }
            Mode::Scripted {
                queue,
                repeat_last,
                last,
            } => match queue.pop_front() {
                Some(response) => {
                    *last = Some(response.clone());
                    response
                }
                None if *repeat_last => last.clone().unwrap_or_else(MockResponse::empty),
                None => MockResponse::empty(),
            },
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::echo()
    }
}

impl ModelProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            endpoint: None,
        }
    }

    fn stream(&self, request: StreamRequest<'_>) -> Result<ResponseStream<'_>, ProviderError> {
        lock_unpoisoned(&self.requests).push(RecordedRequest {
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        match self.next_response(request.messages) {
            MockResponse::Deltas(deltas) => Ok(Box::new(deltas.into_iter().map(Ok))),
            MockResponse::OpenError(error) => Err(error),
            MockResponse::FailAfter(deltas, error) => Ok(Box::new(
                deltas
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error))),
            )),
        }
    }
}

fn word_deltas(text: &str) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    let mut pending_token = String::new();
    for ch in text.chars() {
        pending_token.push(ch);
        if matches!(ch, ' ' | '\n') {
            deltas.push(StreamDelta::Text(std::mem::take(&mut pending_token)));
        }
    }

    if !pending_token.is_empty() {
        deltas.push(StreamDelta::Text(pending_token));
    }

    deltas
}

fn split_point(text: &str) -> usize {
    let mut split = text.len() / 2;
    while !text.is_char_boundary(split) {
        split -= 1;
    }
    split
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
