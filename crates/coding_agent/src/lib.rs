//! Interactive terminal coding assistant.
//!
//! ## Provider bootstrap
//!
//! The model backend is picked with `CODING_AGENT_PROVIDER` or `--provider`:
//!
//! - `chat-api` (default): an OpenAI-compatible `/chat/completions` endpoint.
//!   `CODING_AGENT_API_KEY` carries the bearer token and
//!   `CODING_AGENT_BASE_URL` overrides the endpoint base.
//! - `mock`: a local echo provider for offline runs and tests.
//!
//! ## Turn contract
//!
//! One user message starts a turn. The model may answer with tool calls;
//! each call is dispatched through [`tools::ToolRegistry`], its result is fed
//! back, and the loop repeats until the model answers in plain text, a
//! mutating action is rejected, or the round limit is hit.
//!
//! Every file path a tool touches is resolved inside [`sandbox::Sandbox`].
//! Mutating tools ask the [`tools::Approver`] first unless auto-approve is on.
//!
//! ## Sessions
//!
//! Conversations persist under `<workspace>/.agent/sessions` as one JSON file
//! per session plus an `index.json`. The last used session is reopened at
//! startup.

pub mod app;
pub mod commands;
pub mod config;
pub mod console;
pub mod conversation;
pub mod display;
pub mod prompts;
pub mod providers;
pub mod sandbox;
pub mod tools;
pub mod turn;
