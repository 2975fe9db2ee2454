#![allow(dead_code)]

use std::path::Path;

use agent_provider::{
    Message, ModelProvider, ProviderError, ProviderProfile, ResponseStream, StreamRequest,
    ToolCall,
};
use coding_agent::conversation::Conversation;
use coding_agent::sandbox::Sandbox;
use coding_agent::tools::{Approver, ToolContext, ToolRegistry};
use coding_agent::turn::{ToolReport, TurnContext, TurnEngine, TurnError, TurnObserver, TurnOutcome};

pub const TEST_MODEL: &str = "test-model";

/// One recorded tool dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEvent {
    pub id: String,
    pub name: String,
    pub label: String,
    pub cache_hit: bool,
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub rounds: Vec<usize>,
    pub text: String,
    pub tools: Vec<ToolEvent>,
    pub provider_failures: Vec<String>,
    pub no_response: usize,
    pub loop_limits: Vec<usize>,
}

impl TurnObserver for RecordingObserver {
    fn round_started(&mut self, round: usize) {
        self.rounds.push(round);
    }

    fn text_delta(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn tool_finished(&mut self, report: &ToolReport<'_>) {
        self.tools.push(ToolEvent {
            id: report.call.id.clone(),
            name: report.call.name.clone(),
            label: report.outcome.label().to_string(),
            cache_hit: report.cache_hit,
        });
    }

    fn provider_failed(&mut self, error: &ProviderError) {
        self.provider_failures.push(error.user_message());
    }

    fn no_response(&mut self) {
        self.no_response += 1;
    }

    fn loop_limit(&mut self, max_rounds: usize) {
        self.loop_limits.push(max_rounds);
    }
}

/// Provider whose backend panics as soon as a stream is requested.
#[derive(Debug, Default)]
pub struct PanickingProvider;

impl ModelProvider for PanickingProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: "panicking".to_string(),
            endpoint: None,
        }
    }

    fn stream(&self, _request: StreamRequest<'_>) -> Result<ResponseStream<'_>, ProviderError> {
        panic!("backend exploded")
    }
}

/// Runs one turn with the builtin tools and a recording observer.
pub fn run_turn(
    provider: &dyn ModelProvider,
    sandbox: &Sandbox,
    conversation: &mut Conversation,
    approver: &mut dyn Approver,
    auto_approve: bool,
    user_text: &str,
) -> (Result<TurnOutcome, TurnError>, RecordingObserver) {
    let registry = ToolRegistry::builtin().expect("builtin registry");
    let engine = TurnEngine::new(provider, &registry);
    let mut observer = RecordingObserver::default();
    let mut tools = ToolContext::new(sandbox, auto_approve, approver);
    let mut ctx = TurnContext {
        conversation,
        tools: &mut tools,
        model: TEST_MODEL,
        observer: &mut observer,
    };

    let result = engine.submit_turn(&mut ctx, user_text);
    (result, observer)
}

pub fn new_sandbox(root: &Path) -> Sandbox {
    Sandbox::new(root).expect("workspace root should be valid")
}

pub fn tool_messages(conversation: &Conversation) -> Vec<&Message> {
    conversation
        .messages()
        .iter()
        .filter(|message| message.tool_call_id.is_some())
        .collect()
}

pub fn assistant_calls(conversation: &Conversation) -> Vec<&ToolCall> {
    conversation
        .messages()
        .iter()
        .flat_map(|message| message.tool_calls.iter())
        .collect()
}
