//! Plain-text rendering of turn progress for the interactive console.

use std::io::Write;

use agent_provider::{ProviderError, ToolCall};
use serde_json::Value;

use crate::tools::ToolOutcome;
use crate::turn::{ToolReport, TurnObserver, LOOP_LIMIT_MESSAGE, NO_RESPONSE_MESSAGE};

pub const DEFAULT_TRUNCATE_LINES: usize = 10;

/// Writes streamed text and a small panel per tool call.
pub struct ConsoleObserver {
    out: Box<dyn Write>,
    verbose: bool,
    truncate_lines: usize,
    streaming: bool,
}

impl ConsoleObserver {
    pub fn new(out: Box<dyn Write>, verbose: bool, truncate_lines: usize) -> Self {
        Self {
            out,
            verbose,
            truncate_lines,
            streaming: false,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_truncate_lines(&mut self, truncate_lines: usize) {
        self.truncate_lines = truncate_lines;
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
    }

    fn end_stream(&mut self) {
        if self.streaming {
            self.streaming = false;
            let _ = writeln!(self.out);
            let _ = self.out.flush();
        }
    }
}

impl TurnObserver for ConsoleObserver {
    fn text_delta(&mut self, text: &str) {
        if !self.streaming {
            self.streaming = true;
            let _ = write!(self.out, "[assistant]: ");
        }
        let _ = write!(self.out, "{text}");
        let _ = self.out.flush();
    }

    fn response_finished(&mut self) {
        self.end_stream();
    }

    fn tool_started(&mut self, call: &ToolCall) {
        self.end_stream();
        self.line(&format!("[tool] {}", call.name));
        if let Some(action) = render_tool_action(&call.name, &call.arguments) {
            self.line(&action);
        }
        let _ = self.out.flush();
    }

    fn tool_finished(&mut self, report: &ToolReport<'_>) {
        if report.cache_hit {
            self.line("(cache hit) reused previous result");
        }

        if report.outcome.is_rejected() {
            self.line("Operation rejected by user.");
        } else {
            let body = if self.verbose {
                report.payload.to_string()
            } else {
                compact_summary(&report.call.name, report.outcome)
            };
            if !body.is_empty() {
                let shown = truncate_by_lines(&body, self.truncate_lines);
                self.line(&shown);
            }
        }

        self.line(&format!("done in {:.2}s", report.elapsed.as_secs_f64()));
        self.line("");
        let _ = self.out.flush();
    }

    fn provider_failed(&mut self, error: &ProviderError) {
        self.end_stream();
        self.line(&format!("[error] {}", error.user_message()));
        self.line("");
        let _ = self.out.flush();
    }

    fn no_response(&mut self) {
        self.end_stream();
        self.line(NO_RESPONSE_MESSAGE);
        self.line("");
        let _ = self.out.flush();
    }

    fn loop_limit(&mut self, _max_rounds: usize) {
        self.end_stream();
        self.line(LOOP_LIMIT_MESSAGE);
        let _ = self.out.flush();
    }
}

/// One-line description of what a tool call is about to do.
pub fn render_tool_action(name: &str, arguments: &Value) -> Option<String> {
    let arg = |key: &str| {
        arguments
            .get(key)
            .and_then(Value::as_str)
            .map(normalize_whitespace)
            .filter(|value| !value.is_empty())
    };
    let path = arg("path");

    match name {
        "read_file" => path.map(|p| format!("Reading {p}")),
        "write_file" => path.map(|p| format!("Writing {p}")),
        "delete_file" => path.map(|p| format!("Deleting {p}")),
        "apply_patch" => path.map(|p| format!("Patching {p}")),
        "list_dir" => Some(format!("Listing {}", path.as_deref().unwrap_or("."))),
        "walk_dir" => Some(format!("Walking {}", path.as_deref().unwrap_or("."))),
        "search_text" => Some(format!(
            "Searching '{}' under {}",
            arg("query").unwrap_or_default(),
            path.as_deref().unwrap_or(".")
        )),
        "web_search" => Some(format!("Web searching: {}", arg("query").unwrap_or_default())),
        "web_fetch" => Some(format!("Fetching: {}", arg("url").unwrap_or_default())),
        "shell" => Some(
            arg("command")
                .map(|command| format!("Running: {command}"))
                .unwrap_or_else(|| "Running shell command".to_string()),
        ),
        _ => None,
    }
}

/// Keeps the first `max_lines` lines; `0` disables truncation.
pub fn truncate_by_lines(text: &str, max_lines: usize) -> String {
    if max_lines == 0 {
        return text.to_string();
    }
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }

    let remaining = lines.len() - max_lines;
    format!(
        "{}\n\n--- output truncated: {remaining} more lines ---",
        lines[..max_lines].join("\n")
    )
}

/// Short human summary of a tool result. Display only; the model always
/// receives the full payload.
pub fn compact_summary(name: &str, outcome: &ToolOutcome) -> String {
    let value = match outcome {
        ToolOutcome::Ok(value) => value,
        ToolOutcome::Rejected { .. } => return String::new(),
        ToolOutcome::Error { kind, message } => {
            let message = message.trim();
            return if message.is_empty() || message == *kind {
                format!("[error] {kind}")
            } else {
                format!("[error] {kind}\n{message}")
            };
        }
    };

    match name {
        "list_dir" => bullet_list(value.get("items"), 50, |item| {
            item.get("name").and_then(Value::as_str).map(str::to_string)
        }),
        "walk_dir" => {
            let mut body = bullet_list(value.get("files"), 60, |file| {
                file.as_str().map(str::to_string)
            });
            if value.get("truncated").and_then(Value::as_bool) == Some(true) {
                body.push_str("\n(note: walk_dir results truncated by tool limits)");
            }
            body.trim().to_string()
        }
        "search_text" => bullet_list(value.get("results"), 25, |hit| {
            let path = hit.get("path").and_then(Value::as_str).unwrap_or_default();
            let line = hit.get("line").and_then(Value::as_u64).unwrap_or_default();
            let snippet = hit.get("match").and_then(Value::as_str).unwrap_or_default();
            Some(format!("{path}:{line}  {}", normalize_whitespace(snippet)))
        }),
        "web_search" => {
            let results = value
                .get("results")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let mut lines: Vec<String> = results
                .iter()
                .take(5)
                .filter_map(|hit| {
                    let title = normalize_whitespace(
                        hit.get("title").and_then(Value::as_str).unwrap_or_default(),
                    );
                    let url = hit.get("url").and_then(Value::as_str).unwrap_or_default();
                    match (title.is_empty(), url.is_empty()) {
                        (_, true) => None,
                        (true, false) => Some(format!("- {url}")),
                        (false, false) => Some(format!("- {title}\n  {url}")),
                    }
                })
                .collect();
            if results.len() > 5 {
                lines.push(format!("...and {} more", results.len() - 5));
            }
            lines.join("\n")
        }
        "web_fetch" => {
            let mut lines = Vec::new();
            if let Some(url) = value.get("url").and_then(Value::as_str) {
                lines.push(format!("url: {url}"));
            }
            if let Some(content_type) = value
                .get("content_type")
                .and_then(Value::as_str)
                .filter(|content_type| !content_type.is_empty())
            {
                lines.push(format!("content_type: {content_type}"));
            }
            let text = value.get("text").and_then(Value::as_str).unwrap_or_default().trim();
            if !text.is_empty() {
                lines.push(String::new());
                lines.push("preview:".to_string());
                lines.push(preview_lines(text, 12));
            }
            lines.join("\n").trim().to_string()
        }
        "shell" => {
            let mut lines = Vec::new();
            if let Some(code) = value.get("exit_code").and_then(Value::as_i64) {
                lines.push(format!("exit_code: {code}"));
            }
            for (stream, limit) in [("stdout", 30), ("stderr", 20)] {
                let text = value.get(stream).and_then(Value::as_str).unwrap_or_default().trim();
                if !text.is_empty() {
                    lines.push(String::new());
                    lines.push(format!("{stream}:"));
                    lines.push(preview_lines(text, limit));
                }
            }
            lines.join("\n").trim().to_string()
        }
        "write_file" | "apply_patch" | "delete_file" => {
            if value.get("ok").and_then(Value::as_bool) != Some(true) {
                return String::new();
            }
            let path = value.get("path").and_then(Value::as_str).unwrap_or_default();
            let mut extra = Vec::new();
            if let Some(bytes) = value.get("bytes_written") {
                extra.push(format!("bytes_written={bytes}"));
            }
            if let Some(deleted) = value.get("deleted").and_then(Value::as_str) {
                extra.push(format!("deleted={deleted}"));
            }
            if extra.is_empty() {
                format!("ok: true\npath: {path}")
            } else {
                format!("ok: true\npath: {path} ({})", extra.join(", "))
            }
        }
        _ => String::new(),
    }
}

fn bullet_list(
    items: Option<&Value>,
    limit: usize,
    render: impl Fn(&Value) -> Option<String>,
) -> String {
    let items = items
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut lines: Vec<String> = items
        .iter()
        .take(limit)
        .filter_map(|item| render(item).map(|text| format!("- {text}")))
        .collect();
    if items.len() > limit {
        lines.push(format!("...and {} more", items.len() - limit));
    }
    lines.join("\n")
}

fn preview_lines(text: &str, limit: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut preview = lines.iter().take(limit).copied().collect::<Vec<_>>().join("\n");
    if lines.len() > limit {
        preview.push_str(&format!("\n...and {} more lines", lines.len() - limit));
    }
    preview
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
