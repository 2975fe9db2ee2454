use std::collections::VecDeque;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::ChatStreamEvent;
use crate::payload::ChatRequest;
use crate::sse::SseStreamParser;
use crate::url::normalize_chat_url;

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ChatApiError> {
        let mut out = HeaderMap::new();
        out.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let api_key = self.config.api_key.trim();
        if !api_key.is_empty() {
            out.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                    ChatApiError::InvalidHeader("api key is not a valid header value".to_string())
                })?,
            );
        }

        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("coding-agent/{}", env!("CARGO_PKG_VERSION")));
        out.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|_| ChatApiError::InvalidHeader(format!("invalid user agent: {user_agent}")))?,
        );

        for (key, value) in &self.config.extra_headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let headers = self.build_headers()?;
        let payload = request_with_transport_defaults(request);
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload))
    }

    pub async fn send_with_retry(&self, request: &ChatRequest) -> Result<Response, ChatApiError> {
        let policy = self.config.retry;
        let max_retries = policy.max_retries;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match self.build_request(request)?.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    last_status = Some(status);
                    let body = response.text().await.unwrap_or_else(|_| {
                        status
                            .canonical_reason()
                            .unwrap_or("request failed")
                            .to_string()
                    });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < max_retries && policy.should_retry_status(status.as_u16(), &body) {
                        warn!(%status, attempt, "retrying chat request after error status");
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                        continue;
                    }

                    return Err(ChatApiError::Status(status, message));
                }
                Err(error) => {
                    // A timeout means the configured budget is already spent.
                    let give_up = error.is_timeout() || attempt >= max_retries;
                    if give_up && last_error.is_none() {
                        return Err(ChatApiError::Request(error));
                    }
                    last_error = Some(error.to_string());
                    if give_up {
                        break;
                    }
                    warn!(%error, attempt, "retrying chat request after transport error");
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }

        Err(ChatApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Sends `request` and returns a pull-based stream of parsed events.
    pub async fn open_stream(&self, request: &ChatRequest) -> Result<ChatEventStream, ChatApiError> {
        let response = self.send_with_retry(request).await?;
        debug!(endpoint = %self.normalized_endpoint(), "chat stream opened");
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(ChatEventStream::new(bytes))
    }

    /// Streams `request` to completion and collects every event.
    pub async fn stream(&self, request: &ChatRequest) -> Result<Vec<ChatStreamEvent>, ChatApiError> {
        let mut stream = self.open_stream(request).await?;
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event?);
        }
        Ok(events)
    }
}

/// Parsed SSE events from one open response body.
pub struct ChatEventStream {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    parser: SseStreamParser,
    pending: VecDeque<ChatStreamEvent>,
    finished: bool,
}

impl ChatEventStream {
    pub fn new(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> Self {
        Self {
            bytes,
            parser: SseStreamParser::default(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Returns the next event, `None` once `[DONE]` or end of body is reached.
    ///
    /// An in-band error payload is returned as `Err` and ends the stream.
    pub async fn next_event(&mut self) -> Option<Result<ChatStreamEvent, ChatApiError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                match event {
                    ChatStreamEvent::Done => {
                        self.finish();
                        return None;
                    }
                    ChatStreamEvent::Error { code, message } => {
                        self.finish();
                        return Some(Err(stream_failure(code, message)));
                    }
                    event => return Some(Ok(event)),
                }
            }

            if self.finished {
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.parser.feed(&chunk)),
                Some(Err(error)) => {
                    self.finish();
                    return Some(Err(ChatApiError::Request(error)));
                }
                None => {
                    self.finished = true;
                    self.pending.extend(self.parser.finish());
                }
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
    }
}

fn request_with_transport_defaults(request: &ChatRequest) -> ChatRequest {
    let mut payload = request.clone();
    payload.stream = true;
    if !payload.tools.is_empty() && payload.tool_choice.is_none() {
        payload.tool_choice = Some("auto".to_owned());
    }
    payload
}

fn stream_failure(code: Option<String>, message: Option<String>) -> ChatApiError {
    ChatApiError::StreamFailed {
        message: message
            .or_else(|| code.clone())
            .unwrap_or_else(|| "chat stream reported an error".to_owned()),
        code,
    }
}
