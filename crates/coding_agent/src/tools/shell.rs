use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value};
use wait_timeout::ChildExt;

use super::{cap_chars, ToolArgs, ToolContext, ToolError, ToolSchema, ToolSpec};

/// Per-stream cap on captured output, in characters.
pub const SHELL_OUTPUT_MAX_CHARS: usize = 8000;
const TRUNCATION_MARKER: &str = "\n...[truncated]...";
const MAX_TIMEOUT_SECS: f64 = 86_400.0;

pub fn specs() -> Vec<ToolSpec> {
    vec![ToolSpec {
        name: "shell",
        description:
            "Run a shell command in the workspace directory and return stdout/stderr/exit code.",
        mutating: true,
        schema: ToolSchema::object()
            .string("command", "Shell command to run.")
            .number(
                "timeout_seconds",
                "Optional timeout in seconds (number as string is OK).",
            )
            .required(&["command"]),
        handler: shell,
    }]
}

fn shell(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let command = args.required_str("command")?;
    let timeout = args
        .f64("timeout_seconds")
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .map(|seconds| seconds.min(MAX_TIMEOUT_SECS));

    ctx.approve(&format!("shell {command}"), None)?;

    let cwd = ctx.sandbox().root().to_path_buf();
    let mut child = shell_command(command)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| ToolError::io("launch shell command", command, error))?;

    let stdout = spawn_pipe_reader(child.stdout.take());
    let stderr = spawn_pipe_reader(child.stderr.take());

    let status = wait_for_exit(&mut child, timeout, command)?;
    let stdout = join_pipe_reader(stdout);
    let stderr = join_pipe_reader(stderr);

    Ok(json!({
        "ok": true,
        "command": command,
        "cwd": cwd.display().to_string(),
        "exit_code": status.code(),
        "stdout": cap_chars(stdout.trim(), SHELL_OUTPUT_MAX_CHARS, TRUNCATION_MARKER),
        "stderr": cap_chars(stderr.trim(), SHELL_OUTPUT_MAX_CHARS, TRUNCATION_MARKER),
    }))
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut builder = Command::new("sh");
    builder.arg("-c").arg(command);
    builder
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut builder = Command::new("cmd");
    builder.arg("/C").arg(command);
    builder
}

fn wait_for_exit(
    child: &mut Child,
    timeout: Option<f64>,
    command: &str,
) -> Result<ExitStatus, ToolError> {
    let Some(seconds) = timeout else {
        return child
            .wait()
            .map_err(|error| ToolError::io("wait for shell command", command, error));
    };

    match child.wait_timeout(Duration::from_secs_f64(seconds)) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(ToolError::Timeout(format!(
                "Command timed out after {seconds} seconds"
            )))
        }
        Err(error) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(ToolError::io("wait for shell command", command, error))
        }
    }
}

fn spawn_pipe_reader(pipe: Option<impl Read + Send + 'static>) -> Option<JoinHandle<Vec<u8>>> {
    let mut pipe = pipe?;
    Some(thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        bytes
    }))
}

fn join_pipe_reader(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let bytes = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}
