//! Chat-completions implementation of the shared `agent_provider` contract.
//!
//! This adapter translates the conversation model into `chat_api` payloads and
//! exposes the async SSE stream as the blocking, pull-based iterator expected
//! by `coding_agent`. One current-thread tokio runtime lives as long as the
//! provider and is driven only while a delta is being pulled.

use std::time::Duration;

use agent_provider::{
    Message, ModelProvider, ProviderError, ProviderErrorKind, ProviderInitError, ProviderProfile,
    ResponseStream, StreamDelta, StreamRequest, ToolCallFragment, ToolDefinition,
};
use chat_api::{
    ChatApiClient, ChatApiConfig, ChatApiError, ChatEventStream, ChatMessage, ChatRequest,
    ChatStreamEvent, ChatTool, ChatToolCall,
};
use tokio::runtime::Runtime;
use tracing::debug;

/// Stable provider identifier used by `coding_agent` startup selection.
pub const CHAT_API_PROVIDER_ID: &str = "chat-api";

/// Runtime configuration for the chat-completions provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatApiProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl ChatApiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.api_key);

        if let Some(base_url) = self.base_url.filter(|value| !value.trim().is_empty()) {
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

/// Blocking source of parsed stream events.
trait EventSource {
    fn next_event(&mut self) -> Option<Result<ChatStreamEvent, ChatApiError>>;
}

trait StreamClient: Send + Sync {
    fn endpoint(&self) -> String;

    fn open<'a>(&'a self, request: &ChatRequest) -> Result<Box<dyn EventSource + 'a>, ChatApiError>;
}

struct DefaultStreamClient {
    client: ChatApiClient,
    runtime: Runtime,
}

struct BlockingEventStream<'a> {
    runtime: &'a Runtime,
    inner: ChatEventStream,
}

impl EventSource for BlockingEventStream<'_> {
    fn next_event(&mut self) -> Option<Result<ChatStreamEvent, ChatApiError>> {
        self.runtime.block_on(self.inner.next_event())
    }
}

impl StreamClient for DefaultStreamClient {
    fn endpoint(&self) -> String {
        self.client.normalized_endpoint()
    }

    fn open<'a>(&'a self, request: &ChatRequest) -> Result<Box<dyn EventSource + 'a>, ChatApiError> {
        let inner = self.runtime.block_on(self.client.open_stream(request))?;
        Ok(Box::new(BlockingEventStream {
            runtime: &self.runtime,
            inner,
        }))
    }
}

/// `ModelProvider` adapter backed by `chat_api` transport primitives.
pub struct ChatApiProvider {
    stream_client: Box<dyn StreamClient>,
}

impl ChatApiProvider {
    /// Creates a provider using real HTTP transport.
    pub fn new(config: ChatApiProviderConfig) -> Result<Self, ProviderInitError> {
        let client = ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ProviderInitError::new(format!("failed to initialize tokio runtime: {error}"))
            })?;

        Ok(Self {
            stream_client: Box::new(DefaultStreamClient { client, runtime }),
        })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(stream_client: Box<dyn StreamClient>) -> Self {
        Self { stream_client }
    }
}

impl ModelProvider for ChatApiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: CHAT_API_PROVIDER_ID.to_string(),
            endpoint: Some(self.stream_client.endpoint()),
        }
    }

    fn stream(&self, request: StreamRequest<'_>) -> Result<ResponseStream<'_>, ProviderError> {
        let chat_request = build_chat_request(&request);
        debug!(
            model = request.model,
            messages = chat_request.messages.len(),
            tools = chat_request.tools.len(),
            "opening chat completion stream"
        );

        let source = self
            .stream_client
            .open(&chat_request)
            .map_err(map_stream_error)?;
        Ok(Box::new(DeltaIter {
            source,
            done: false,
        }))
    }
}

struct DeltaIter<'a> {
    source: Box<dyn EventSource + 'a>,
    done: bool,
}

impl Iterator for DeltaIter<'_> {
    type Item = Result<StreamDelta, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.source.next_event() {
                Some(Ok(ChatStreamEvent::TextDelta { delta })) => {
                    return Some(Ok(StreamDelta::Text(delta)));
                }
                Some(Ok(ChatStreamEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                })) => {
                    return Some(Ok(StreamDelta::ToolCall(ToolCallFragment {
                        index,
                        id,
                        name,
                        arguments,
                    })));
                }
                Some(Ok(ChatStreamEvent::Finished { reason })) => {
                    debug!(%reason, "chat completion finished");
                }
                Some(Ok(ChatStreamEvent::Done)) | None => self.done = true,
                Some(Ok(ChatStreamEvent::Error { code, message })) => {
                    self.done = true;
                    let text = message.or(code).unwrap_or_else(|| "stream error".to_string());
                    return Some(Err(ProviderError::classify(text)));
                }
                Some(Err(error)) => {
                    self.done = true;
                    return Some(Err(map_stream_error(error)));
                }
            }
        }

        None
    }
}

fn build_chat_request(request: &StreamRequest<'_>) -> ChatRequest {
    let messages = request.messages.iter().map(to_chat_message).collect();
    ChatRequest::new(request.model, messages).with_tools(request.tools.iter().map(to_chat_tool).collect())
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let mut chat = ChatMessage::new(message.role.as_str(), message.content.clone());
    chat.tool_calls = message
        .tool_calls
        .iter()
        .map(|call| ChatToolCall::function(call.id.clone(), call.name.clone(), call.arguments_text()))
        .collect();
    chat.tool_call_id = message.tool_call_id.clone();
    chat
}

fn to_chat_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool::function(
        tool.name.clone(),
        tool.description.clone(),
        tool.input_schema.clone(),
    )
}

fn map_stream_error(error: ChatApiError) -> ProviderError {
    let message = error.to_string();
    if let Some(status) = error.status() {
        let kind = match status.as_u16() {
            401 | 403 => Some(ProviderErrorKind::Authentication),
            429 => Some(ProviderErrorKind::RateLimit),
            404 => Some(ProviderErrorKind::ModelNotFound),
            408 | 504 => Some(ProviderErrorKind::Timeout),
            _ => None,
        };
        if let Some(kind) = kind {
            return ProviderError::new(kind, message);
        }
    }

    if error.is_timeout() {
        return ProviderError::new(ProviderErrorKind::Timeout, message);
    }
    if error.is_connect() || matches!(error, ChatApiError::RetryExhausted { status: None, .. }) {
        return ProviderError::new(ProviderErrorKind::Network, message);
    }

    ProviderError::classify(message)
}

fn map_init_error(error: ChatApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize chat-api provider: {error}"))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard};

    use agent_provider::ToolCall;
    use chat_api::StatusCode;
    use serde_json::json;

    use super::*;

    struct ScriptedSource {
        events: VecDeque<Result<ChatStreamEvent, ChatApiError>>,
    }

    impl EventSource for ScriptedSource {
        fn next_event(&mut self) -> Option<Result<ChatStreamEvent, ChatApiError>> {
            self.events.pop_front()
        }
    }

    enum FakeOutcome {
        Events(Vec<Result<ChatStreamEvent, ChatApiError>>),
        OpenError(ChatApiError),
    }

    struct FakeStreamClient {
        observed: Arc<Mutex<Option<ChatRequest>>>,
        outcome: Mutex<Option<FakeOutcome>>,
    }

    impl FakeStreamClient {
        fn boxed(outcome: FakeOutcome) -> Box<Self> {
            Box::new(Self {
                observed: Arc::new(Mutex::new(None)),
                outcome: Mutex::new(Some(outcome)),
            })
        }
    }

    impl StreamClient for FakeStreamClient {
        fn endpoint(&self) -> String {
            "http://fake/v1/chat/completions".to_string()
        }

        fn open<'a>(
            &'a self,
            request: &ChatRequest,
        ) -> Result<Box<dyn EventSource + 'a>, ChatApiError> {
            *lock_unpoisoned(&self.observed) = Some(request.clone());

            match lock_unpoisoned(&self.outcome).take() {
                Some(FakeOutcome::Events(events)) => Ok(Box::new(ScriptedSource {
                    events: events.into(),
                })),
                Some(FakeOutcome::OpenError(error)) => Err(error),
                None => panic!("fake stream outcome should be consumed exactly once"),
            }
        }
    }

    fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn collect(
        provider: &ChatApiProvider,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Vec<Result<StreamDelta, ProviderError>>, ProviderError> {
        provider
            .stream(StreamRequest {
                model: "gpt-test",
                messages,
                tools,
            })
            .map(Iterator::collect)
    }

    #[test]
    fn profile_reports_provider_id_and_endpoint() {
        let provider = ChatApiProvider::with_stream_client_for_tests(FakeStreamClient::boxed(
            FakeOutcome::Events(Vec::new()),
        ));

        let profile = provider.profile();
        assert_eq!(profile.provider_id, CHAT_API_PROVIDER_ID);
        assert_eq!(
            profile.endpoint.as_deref(),
            Some("http://fake/v1/chat/completions")
        );
    }

    #[test]
    fn stream_maps_text_and_tool_call_deltas_in_order() {
        let provider = ChatApiProvider::with_stream_client_for_tests(FakeStreamClient::boxed(
            FakeOutcome::Events(vec![
                Ok(ChatStreamEvent::TextDelta {
                    delta: "Hi".to_string(),
                }),
                Ok(ChatStreamEvent::ToolCallDelta {
                    index: 0,
                    id: Some("call_1".to_string()),
                    name: Some("read_file".to_string()),
                    arguments: Some("{}".to_string()),
                }),
                Ok(ChatStreamEvent::Finished {
                    reason: "tool_calls".to_string(),
                }),
            ]),
        ));

        let items = collect(&provider, &[Message::user("hi")], &[]).expect("stream opens");

        assert_eq!(
            items,
            vec![
                Ok(StreamDelta::Text("Hi".to_string())),
                Ok(StreamDelta::ToolCall(ToolCallFragment {
                    index: 0,
                    id: Some("call_1".to_string()),
                    name: Some("read_file".to_string()),
                    arguments: Some("{}".to_string()),
                })),
            ]
        );
    }

    #[test]
    fn request_carries_model_messages_and_tool_schemas() {
        let fake = FakeStreamClient::boxed(FakeOutcome::Events(Vec::new()));
        let observed = Arc::clone(&fake.observed);
        let provider = ChatApiProvider::with_stream_client_for_tests(fake);
        let messages = vec![
            Message::system("sys"),
            Message::assistant("", vec![ToolCall::new("c1", "list_dir", json!({"path": "."}))]),
            Message::tool("c1", "list_dir", "[]"),
        ];
        let tools = vec![ToolDefinition {
            name: "list_dir".to_string(),
            description: "List".to_string(),
            input_schema: json!({"type": "object"}),
        }];

        collect(&provider, &messages, &tools).expect("stream opens");

        let request = lock_unpoisoned(&observed)
            .clone()
            .expect("request observed");
        assert_eq!(request.model, "gpt-test");
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(
            request.messages[1].tool_calls[0],
            ChatToolCall::function("c1", "list_dir", "{\"path\":\".\"}")
        );
        assert_eq!(request.messages[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(request.tools[0].function.name, "list_dir");
    }

    #[test]
    fn open_failure_is_classified() {
        let provider = ChatApiProvider::with_stream_client_for_tests(FakeStreamClient::boxed(
            FakeOutcome::OpenError(ChatApiError::Status(
                StatusCode::UNAUTHORIZED,
                "Incorrect API key provided".to_string(),
            )),
        ));

        let error = collect(&provider, &[Message::user("hi")], &[]).expect_err("open fails");
        assert_eq!(error.kind(), ProviderErrorKind::Authentication);
    }

    #[test]
    fn mid_stream_failure_ends_stream_with_error() {
        let provider = ChatApiProvider::with_stream_client_for_tests(FakeStreamClient::boxed(
            FakeOutcome::Events(vec![
                Ok(ChatStreamEvent::TextDelta {
                    delta: "par".to_string(),
                }),
                Err(ChatApiError::StreamFailed {
                    code: Some("rate_limit_exceeded".to_string()),
                    message: "Rate limit reached".to_string(),
                }),
                Ok(ChatStreamEvent::TextDelta {
                    delta: "never".to_string(),
                }),
            ]),
        ));

        let items = collect(&provider, &[Message::user("hi")], &[]).expect("stream opens");

        assert_eq!(items.len(), 2);
        assert!(matches!(
            &items[1],
            Err(error) if error.kind() == ProviderErrorKind::RateLimit
        ));
    }

    #[test]
    fn exhausted_retries_without_status_are_network_errors() {
        let error = map_stream_error(ChatApiError::RetryExhausted {
            status: None,
            last_error: Some("connection closed".to_string()),
        });
        assert_eq!(error.kind(), ProviderErrorKind::Network);

        let error = map_stream_error(ChatApiError::Status(
            StatusCode::NOT_FOUND,
            "model not found".to_string(),
        ));
        assert_eq!(error.kind(), ProviderErrorKind::ModelNotFound);
    }
}
