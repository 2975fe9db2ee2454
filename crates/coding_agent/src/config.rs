//! Startup configuration: built-in defaults, then `CODING_AGENT_*` environment
//! variables, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use session_store::session_root;

use crate::display::DEFAULT_TRUNCATE_LINES;
use crate::providers::DEFAULT_PROVIDER_ID;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 60.0;

pub const PROVIDER_ENV_VAR: &str = "CODING_AGENT_PROVIDER";
pub const MODEL_ENV_VAR: &str = "CODING_AGENT_MODEL";
pub const API_KEY_ENV_VAR: &str = "CODING_AGENT_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "CODING_AGENT_BASE_URL";
pub const TIMEOUT_ENV_VAR: &str = "CODING_AGENT_TIMEOUT_SEC";
pub const TRUNCATE_ENV_VAR: &str = "CODING_AGENT_TRUNCATE_LINES";
pub const VERBOSE_ENV_VAR: &str = "CODING_AGENT_VERBOSE";
pub const AUTOSAVE_ENV_VAR: &str = "CODING_AGENT_AUTOSAVE";
pub const AUTO_APPROVE_ENV_VAR: &str = "CODING_AGENT_AUTO_APPROVE";
pub const SESSIONS_DIR_ENV_VAR: &str = "CODING_AGENT_SESSIONS_DIR";
pub const LOG_FILE_ENV_VAR: &str = "CODING_AGENT_LOG_FILE";

/// Interactive coding agent with sandboxed file, shell, search and web tools.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "coding-agent", version, about)]
pub struct CliArgs {
    /// Workspace directory (sandbox root).
    #[arg(short = 'C', long)]
    pub cwd: Option<PathBuf>,

    /// Model name.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Auto-approve file and shell changes.
    #[arg(short = 'y', long, overrides_with = "no_auto_approve")]
    pub auto_approve: bool,

    #[arg(long, overrides_with = "auto_approve")]
    pub no_auto_approve: bool,

    /// Provider base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Model request timeout in seconds.
    #[arg(short = 't', long)]
    pub request_timeout: Option<f64>,

    /// Tool output line limit (0 = no truncation).
    #[arg(long)]
    pub truncate_lines: Option<usize>,

    /// Show full tool output.
    #[arg(long, overrides_with = "no_verbose")]
    pub verbose: bool,

    #[arg(long, overrides_with = "verbose")]
    pub no_verbose: bool,

    /// Save the session after every turn.
    #[arg(long, overrides_with = "no_autosave")]
    pub autosave: bool,

    #[arg(long, overrides_with = "autosave")]
    pub no_autosave: bool,

    /// Session name to load or create.
    #[arg(short, long)]
    pub session: Option<String>,

    /// Model provider (`chat-api` or `mock`).
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} (expected {expected})")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Workspace path does not exist: {}", path.display())]
    MissingWorkspace { path: PathBuf },

    #[error("Workspace path is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to resolve workspace {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub provider: String,
    pub workspace_root: PathBuf,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout: Duration,
    pub auto_approve: bool,
    pub truncate_lines: usize,
    pub verbose: bool,
    pub autosave: bool,
    pub sessions_dir: PathBuf,
    /// Session requested on the command line, if any.
    pub session: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl AgentConfig {
    /// Reads configuration from the process environment and working directory.
    pub fn from_env(cli: &CliArgs) -> Result<Self, ConfigError> {
        let launch_dir = std::env::current_dir().map_err(|source| ConfigError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Self::from_sources(cli, |key| std::env::var(key).ok(), &launch_dir)
    }

    /// Layers defaults, `env`, and `cli`. Relative paths resolve against `launch_dir`.
    pub fn from_sources(
        cli: &CliArgs,
        env: impl Fn(&str) -> Option<String>,
        launch_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let env_value = |key: &str| {
            env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let env_bool = |key: &'static str, default: bool| -> Result<bool, ConfigError> {
            match env_value(key) {
                None => Ok(default),
                Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidValue {
                    key,
                    value,
                    expected: "on|off",
                }),
            }
        };

        let provider = cli
            .provider
            .clone()
            .or_else(|| env_value(PROVIDER_ENV_VAR))
            .unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string());

        let workspace_root = resolve_workspace(
            &cli.cwd.clone().unwrap_or_else(|| launch_dir.to_path_buf()),
            launch_dir,
        )?;

        let model = cli
            .model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .or_else(|| env_value(MODEL_ENV_VAR))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = cli
            .base_url
            .clone()
            .or_else(|| env_value(BASE_URL_ENV_VAR));

        let timeout_secs = match cli.request_timeout {
            Some(seconds) => Some((seconds, seconds.to_string(), "--request-timeout")),
            None => match env_value(TIMEOUT_ENV_VAR) {
                Some(raw) => Some((
                    raw.parse::<f64>().unwrap_or(f64::NAN),
                    raw,
                    TIMEOUT_ENV_VAR,
                )),
                None => None,
            },
        };
        let request_timeout = match timeout_secs {
            None => Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
            Some((seconds, _, _)) if seconds.is_finite() && seconds > 0.0 && seconds < 1e9 => {
                Duration::from_secs_f64(seconds)
            }
            Some((_, value, key)) => {
                return Err(ConfigError::InvalidValue {
                    key,
                    value,
                    expected: "a positive number of seconds",
                })
            }
        };

        let truncate_lines = match cli.truncate_lines {
            Some(lines) => lines,
            None => match env_value(TRUNCATE_ENV_VAR) {
                None => DEFAULT_TRUNCATE_LINES,
                Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: TRUNCATE_ENV_VAR,
                    value,
                    expected: "a non-negative integer",
                })?,
            },
        };

        let auto_approve = match flag(cli.auto_approve, cli.no_auto_approve) {
            Some(value) => value,
            None => env_bool(AUTO_APPROVE_ENV_VAR, false)?,
        };
        let verbose = match flag(cli.verbose, cli.no_verbose) {
            Some(value) => value,
            None => env_bool(VERBOSE_ENV_VAR, false)?,
        };
        let autosave = match flag(cli.autosave, cli.no_autosave) {
            Some(value) => value,
            None => env_bool(AUTOSAVE_ENV_VAR, true)?,
        };

        let sessions_dir = env_value(SESSIONS_DIR_ENV_VAR)
            .map(|dir| absolutize(Path::new(&dir), launch_dir))
            .unwrap_or_else(|| session_root(launch_dir));

        Ok(Self {
            provider,
            workspace_root,
            model,
            api_key: env_value(API_KEY_ENV_VAR),
            base_url,
            request_timeout,
            auto_approve,
            truncate_lines,
            verbose,
            autosave,
            sessions_dir,
            session: cli
                .session
                .clone()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            log_file: env_value(LOG_FILE_ENV_VAR).map(PathBuf::from),
        })
    }

    /// `(label, value)` rows shown by the `config` command.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("provider", self.provider.clone()),
            ("workspace", self.workspace_root.display().to_string()),
            ("model", self.model.clone()),
            (
                "api_key",
                if self.api_key.is_some() { "set" } else { "(not set)" }.to_string(),
            ),
            (
                "base_url",
                self.base_url.clone().unwrap_or_else(|| "(default)".to_string()),
            ),
            (
                "timeout",
                format!("{}s", self.request_timeout.as_secs_f64()),
            ),
            ("auto_approve", on_off(self.auto_approve).to_string()),
            ("truncate_lines", self.truncate_lines.to_string()),
            ("verbose", on_off(self.verbose).to_string()),
            ("autosave", on_off(self.autosave).to_string()),
            ("sessions_dir", self.sessions_dir.display().to_string()),
        ]
    }
}

/// Resolves and canonicalizes a workspace directory.
pub fn resolve_workspace(requested: &Path, base: &Path) -> Result<PathBuf, ConfigError> {
    let path = absolutize(requested, base);
    if !path.exists() {
        return Err(ConfigError::MissingWorkspace { path });
    }
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory { path });
    }
    fs::canonicalize(&path).map_err(|source| ConfigError::Io { path, source })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Accepts `on/true/1/yes/y` and `off/false/0/no/n`, case-insensitively.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" | "y" => Some(true),
        "off" | "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(cli: &CliArgs, vars: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let launch = dir.path().to_path_buf();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        let result = AgentConfig::from_sources(cli, |key| vars.get(key).cloned(), &launch);
        drop(dir);
        result
    }

    #[test]
    fn defaults_apply_without_env_or_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig::from_sources(&CliArgs::default(), |_| None, dir.path())
            .expect("config");

        assert_eq!(config.provider, DEFAULT_PROVIDER_ID);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.truncate_lines, 10);
        assert!(!config.auto_approve);
        assert!(!config.verbose);
        assert!(config.autosave);
        assert_eq!(
            config.workspace_root,
            fs::canonicalize(dir.path()).expect("canonical")
        );
        assert_eq!(config.sessions_dir, dir.path().join(".agent").join("sessions"));
    }

    #[test]
    fn flags_override_environment() {
        let cli = CliArgs::parse_from([
            "coding-agent",
            "--model",
            "flag-model",
            "--no-autosave",
            "-y",
            "--truncate-lines",
            "0",
        ]);
        let config = config(
            &cli,
            &[
                (MODEL_ENV_VAR, "env-model"),
                (AUTOSAVE_ENV_VAR, "yes"),
                (AUTO_APPROVE_ENV_VAR, "off"),
                (VERBOSE_ENV_VAR, "on"),
                (TIMEOUT_ENV_VAR, "2.5"),
            ],
        )
        .expect("config");

        assert_eq!(config.model, "flag-model");
        assert!(!config.autosave);
        assert!(config.auto_approve);
        assert!(config.verbose);
        assert_eq!(config.truncate_lines, 0);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn later_negated_flag_wins() {
        let cli = CliArgs::parse_from(["coding-agent", "--verbose", "--no-verbose"]);
        assert_eq!(flag(cli.verbose, cli.no_verbose), Some(false));
    }

    #[test]
    fn invalid_environment_values_are_reported() {
        let error = config(&CliArgs::default(), &[(VERBOSE_ENV_VAR, "maybe")])
            .expect_err("invalid bool");
        assert_eq!(
            error.to_string(),
            "Invalid value for CODING_AGENT_VERBOSE: \"maybe\" (expected on|off)"
        );

        let error = config(&CliArgs::default(), &[(TIMEOUT_ENV_VAR, "-1")])
            .expect_err("invalid timeout");
        assert!(matches!(error, ConfigError::InvalidValue { key: TIMEOUT_ENV_VAR, .. }));
    }

    #[test]
    fn workspace_must_be_an_existing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("file.txt"), "x").expect("write");

        let missing = resolve_workspace(Path::new("nope"), dir.path()).expect_err("missing");
        assert!(matches!(missing, ConfigError::MissingWorkspace { .. }));

        let file = resolve_workspace(Path::new("file.txt"), dir.path()).expect_err("file");
        assert!(matches!(file, ConfigError::NotADirectory { .. }));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for on in ["on", "TRUE", "1", "yes", "y"] {
            assert_eq!(parse_bool(on), Some(true), "{on}");
        }
        for off in ["off", "False", "0", "no", "n"] {
            assert_eq!(parse_bool(off), Some(false), "{off}");
        }
        assert_eq!(parse_bool("sometimes"), None);
    }
}
