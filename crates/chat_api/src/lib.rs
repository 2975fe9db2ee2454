//! Transport-only client for OpenAI-compatible chat-completions endpoints.
//!
//! This crate owns request building, retries, and SSE parsing for
//! `POST <base>/chat/completions` with `stream: true`. It knows nothing about
//! the agent's conversation model; adapters translate into [`ChatRequest`] and
//! out of [`ChatStreamEvent`].

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{ChatApiClient, ChatEventStream};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::ChatStreamEvent;
pub use payload::{ChatFunctionCall, ChatMessage, ChatRequest, ChatTool, ChatToolCall};
pub use retry::RetryPolicy;
pub use sse::SseStreamParser;
pub use url::normalize_chat_url;

pub use reqwest::StatusCode;
