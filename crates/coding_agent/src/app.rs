use std::io::{self, Write};
use std::path::Path;

use agent_provider::ModelProvider;
use session_store::{sanitize_session_name, SessionMeta, SessionStore, SessionStoreError};
use tracing::{info, warn};

use crate::commands::{help_text, is_paste_terminator, parse_command, Command};
use crate::config::{on_off, parse_bool, resolve_workspace, AgentConfig, ConfigError};
use crate::console::LineInput;
use crate::conversation::Conversation;
use crate::display::ConsoleObserver;
use crate::sandbox::{Sandbox, SandboxError};
use crate::tools::{Approver, RegistryError, ToolContext, ToolRegistry};
use crate::turn::{TurnContext, TurnEngine, TurnOutcome};

const PROMPT: &str = "[user]: ";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Session(#[from] SessionStoreError),
}

/// Whether the read loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Output sinks and the approval channel handed to [`App::start`].
pub struct AppIo {
    pub out: Box<dyn Write>,
    pub observer_out: Box<dyn Write>,
    pub approver: Box<dyn Approver>,
}

/// Interactive session: one conversation, one sandbox, one session store.
pub struct App {
    config: AgentConfig,
    sandbox: Sandbox,
    conversation: Conversation,
    store: SessionStore,
    session_name: String,
    provider: Box<dyn ModelProvider>,
    registry: ToolRegistry,
    approver: Box<dyn Approver>,
    observer: ConsoleObserver,
    out: Box<dyn Write>,
}

impl App {
    /// Builds the app and opens the startup session.
    ///
    /// A requested session is loaded or created; otherwise the last used one
    /// is loaded; otherwise a fresh session is created.
    pub fn start(
        config: AgentConfig,
        provider: Box<dyn ModelProvider>,
        io: AppIo,
    ) -> Result<Self, AppError> {
        let sandbox = Sandbox::new(&config.workspace_root)?;
        let registry = ToolRegistry::builtin()?;
        let store = SessionStore::new(&config.sessions_dir);
        let observer = ConsoleObserver::new(io.observer_out, config.verbose, config.truncate_lines);
        let conversation = Conversation::new(sandbox.root());

        let mut app = Self {
            config,
            sandbox,
            conversation,
            store,
            session_name: String::new(),
            provider,
            registry,
            approver: io.approver,
            observer,
            out: io.out,
        };
        app.open_startup_session()?;
        info!(
            session = %app.session_name,
            root = %app.sandbox.root().display(),
            provider = %app.provider.profile().provider_id,
            "agent started"
        );
        Ok(app)
    }

    fn open_startup_session(&mut self) -> Result<(), AppError> {
        let requested = self
            .config
            .session
            .clone()
            .or_else(|| self.store.last_session());

        if let Some(name) = requested {
            match self.store.load(&name) {
                Ok(record) => {
                    self.session_name = sanitize_session_name(&name);
                    self.conversation = Conversation::restore(self.sandbox.root(), record.messages);
                    return Ok(());
                }
                Err(error) if error.is_not_found() => {
                    let created = self.store.create(Some(&name))?;
                    self.switch_to_fresh_session(created);
                    return Ok(());
                }
                Err(error) => {
                    warn!(session = %name, %error, "failed to load session");
                    self.say(&format!(
                        "Warning: failed to load session '{name}'. Starting a new session."
                    ));
                }
            }
        }

        let created = self.store.create(None)?;
        self.switch_to_fresh_session(created);
        Ok(())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Read-eval loop until quit or end of input.
    pub fn run(&mut self, input: &mut dyn LineInput) -> io::Result<()> {
        self.print_banner();

        loop {
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;

            let flow = match input.read_line() {
                Ok(Some(line)) => self.handle_line(&line, input),
                Ok(None) => {
                    writeln!(self.out)?;
                    break;
                }
                Err(error) => Err(error),
            };
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    info!(session = %self.session_name, "interrupted at the prompt");
                    writeln!(self.out)?;
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        info!(session = %self.session_name, "agent stopped");
        Ok(())
    }

    /// Handles one line of user input; `input` supplies paste-mode lines.
    pub fn handle_line(&mut self, line: &str, input: &mut dyn LineInput) -> io::Result<Flow> {
        let line = line.trim_end();
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        match parse_command(line) {
            Some(Command::Paste) => {
                let pasted = self.read_paste(input)?;
                if !pasted.is_empty() {
                    self.submit(&pasted);
                }
                Ok(Flow::Continue)
            }
            Some(command) => Ok(self.execute(command)),
            None => {
                self.submit(line);
                Ok(Flow::Continue)
            }
        }
    }

    fn read_paste(&mut self, input: &mut dyn LineInput) -> io::Result<String> {
        self.say("Paste mode: enter multi-line input. End with /end");
        let mut lines = Vec::new();
        while let Some(line) = input.read_line()? {
            if is_paste_terminator(&line) {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n").trim().to_string())
    }

    /// Runs one agent turn and autosaves unless the turn failed.
    pub fn submit(&mut self, text: &str) -> Option<TurnOutcome> {
        let _ = writeln!(self.out);
        let _ = self.out.flush();

        let engine = TurnEngine::new(self.provider.as_ref(), &self.registry);
        let mut tools = ToolContext::new(
            &self.sandbox,
            self.config.auto_approve,
            self.approver.as_mut(),
        );
        let mut ctx = TurnContext {
            conversation: &mut self.conversation,
            tools: &mut tools,
            model: &self.config.model,
            observer: &mut self.observer,
        };

        match engine.submit_turn(&mut ctx, text) {
            Ok(outcome) => {
                self.autosave();
                Some(outcome)
            }
            Err(error) => {
                self.say(&format!("[error] {error}"));
                None
            }
        }
    }

    /// Applies one parsed command.
    pub fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Quit => return Flow::Exit,
            Command::Help => self.say(help_text()),
            Command::Tools => self.print_tools(),
            Command::Clear => {
                let _ = write!(self.out, "\x1b[2J\x1b[H");
                self.print_banner();
            }
            Command::Paste => {}
            Command::Reset => {
                self.conversation.reset(self.sandbox.root());
                self.say("Session reset. Starting fresh.");
                self.autosave();
            }
            Command::Config => self.print_config(),
            Command::Cwd(path) => match path {
                Some(path) => self.change_workspace(&path),
                None => self.say("[error] usage: /cwd <path>"),
            },
            Command::Approve(value) => self.set_auto_approve(value.as_deref()),
            Command::Model(name) => match name {
                Some(name) => {
                    self.say(&format!("Model set: {name}"));
                    self.config.model = name;
                }
                None => self.say("[error] usage: /model <name>"),
            },
            Command::Truncate(value) => self.set_truncate(value.as_deref()),
            Command::Verbose(value) => self.set_verbose(value.as_deref()),
            Command::Autosave(value) => self.set_autosave(value.as_deref()),
            Command::Session => self.print_session(),
            Command::Sessions => self.print_sessions(),
            Command::NewSession(name) => self.new_session(name.as_deref()),
            Command::Load(name) => match name {
                Some(name) => self.load_session(&name),
                None => self.say("[error] usage: /load <name>"),
            },
            Command::Save(name) => self.save_session_as(name.as_deref()),
            Command::Delete(name) => match name {
                Some(name) => self.delete_session(&name),
                None => self.say("[error] usage: /delete <name>"),
            },
            Command::Rename(Some(old), Some(new)) => self.rename_session(&old, &new),
            Command::Rename(..) => self.say("[error] usage: /rename <old> <new>"),
            Command::Unknown(head) => self.say(&format!("[error] Unknown command: {head}")),
        }
        Flow::Continue
    }

    fn change_workspace(&mut self, requested: &str) {
        let resolved = resolve_workspace(Path::new(requested), self.sandbox.root())
            .map_err(|error| match error {
                ConfigError::MissingWorkspace { path } => {
                    format!("[error] Path does not exist: {}", path.display())
                }
                ConfigError::NotADirectory { path } => {
                    format!("[error] Not a directory: {}", path.display())
                }
                other => format!("[error] {other}"),
            })
            .and_then(|path| Sandbox::new(&path).map_err(|error| format!("[error] {error}")));

        match resolved {
            Ok(sandbox) => {
                self.sandbox = sandbox;
                self.config.workspace_root = self.sandbox.root().to_path_buf();
                self.conversation.set_root(self.sandbox.root());
                info!(root = %self.sandbox.root().display(), "workspace changed");
                self.say(&format!("Workspace changed: {}", self.sandbox.root().display()));
            }
            Err(message) => self.say(&message),
        }
    }

    fn set_auto_approve(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            self.say("[error] usage: /approve on|off");
            return;
        };
        match parse_bool(value) {
            Some(enabled) => {
                self.config.auto_approve = enabled;
                self.say(&format!("Auto-approve: {}", on_off(enabled)));
            }
            None => self.say("[error] approve expects: on|off"),
        }
    }

    fn set_truncate(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            self.say(&format!(
                "truncate_lines = {} (0 = no truncation)",
                self.config.truncate_lines
            ));
            return;
        };
        let lines = match value.parse::<i64>() {
            Ok(lines) if lines < 0 => {
                self.say("[error] truncate must be >= 0");
                return;
            }
            Ok(lines) => usize::try_from(lines).unwrap_or(usize::MAX),
            Err(_) => {
                self.say("[error] usage: /truncate <number> (0 = no truncation)");
                return;
            }
        };

        self.config.truncate_lines = lines;
        self.observer.set_truncate_lines(lines);
        if lines == 0 {
            self.say("Tool output truncation: OFF");
        } else {
            self.say(&format!("Tool output truncation: {lines} lines"));
        }
    }

    fn set_verbose(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            self.say(&format!(
                "verbose = {} (usage: /verbose on|off)",
                self.config.verbose
            ));
            return;
        };
        match parse_bool(value) {
            Some(true) => {
                self.config.verbose = true;
                self.observer.set_verbose(true);
                self.say("Verbose mode: ON (show full tool output)");
            }
            Some(false) => {
                self.config.verbose = false;
                self.observer.set_verbose(false);
                self.say("Verbose mode: OFF (show compact tool output)");
            }
            None => self.say("[error] usage: /verbose on|off"),
        }
    }

    fn set_autosave(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            self.say(&format!(
                "autosave = {} (usage: /autosave on|off)",
                self.config.autosave
            ));
            return;
        };
        let Some(enabled) = parse_bool(value) else {
            self.say("[error] usage: /autosave on|off");
            return;
        };

        self.config.autosave = enabled;
        self.say(&format!("Autosave: {}", on_off(enabled)));
        if enabled {
            self.autosave();
        }
    }

    fn new_session(&mut self, requested: Option<&str>) {
        match self.store.create(requested) {
            Ok(created) => {
                self.say(&format!("New session: {created}"));
                self.switch_to_fresh_session(created);
            }
            Err(error) => self.say(&format!("[error] {error}")),
        }
    }

    fn load_session(&mut self, name: &str) {
        if !self.store.exists(name) {
            self.say(&format!("[error] Session does not exist: {name}"));
            return;
        }
        match self.store.load(name) {
            Ok(record) => {
                self.session_name = sanitize_session_name(name);
                self.conversation = Conversation::restore(self.sandbox.root(), record.messages);
                let loaded = self.session_name.clone();
                self.say(&format!("Loaded session: {loaded}"));
            }
            Err(error) => self.say(&format!("[error] {error}")),
        }
    }

    fn save_session_as(&mut self, requested: Option<&str>) {
        if let Some(requested) = requested {
            if self.store.exists(requested) {
                self.say(&format!(
                    "[error] Session already exists: {requested} (choose a new name)"
                ));
                return;
            }
            let name = sanitize_session_name(requested);
            if name.is_empty() {
                self.say(&format!("[error] Invalid session name: {requested}"));
                return;
            }
            self.session_name = name;
        }

        match self.save_current() {
            Ok(()) => {
                let saved = self.session_name.clone();
                self.say(&format!("Saved session: {saved}"));
            }
            Err(error) => self.say(&format!("[error] {error}")),
        }
    }

    fn delete_session(&mut self, name: &str) {
        if !self.store.exists(name) {
            self.say(&format!("[error] Session does not exist: {name}"));
            return;
        }
        let deleting_current = sanitize_session_name(name) == self.session_name;

        if let Err(error) = self.store.delete(name) {
            self.say(&format!("[error] {error}"));
            return;
        }
        self.say(&format!("Deleted session: {name}"));

        if deleting_current {
            match self.store.create(None) {
                Ok(created) => {
                    self.say(&format!("Switched to new session: {created}"));
                    self.switch_to_fresh_session(created);
                }
                Err(error) => self.say(&format!("[error] {error}")),
            }
        }
    }

    fn rename_session(&mut self, old: &str, new: &str) {
        match self.store.rename(old, new) {
            Ok(renamed) => {
                self.say(&format!("Renamed session: {old} -> {renamed}"));
                if sanitize_session_name(old) == self.session_name {
                    self.session_name = renamed;
                }
            }
            Err(error) => self.say(&format!("[error] {error}")),
        }
    }

    fn switch_to_fresh_session(&mut self, name: String) {
        self.session_name = name;
        self.conversation.reset(self.sandbox.root());
        self.autosave();
    }

    fn autosave(&mut self) {
        if !self.config.autosave {
            return;
        }
        if let Err(error) = self.save_current() {
            warn!(session = %self.session_name, %error, "autosave failed");
            self.say(&format!("[error] Failed to save session: {error}"));
        }
    }

    fn save_current(&self) -> Result<(), SessionStoreError> {
        let meta = SessionMeta {
            cwd: Some(self.sandbox.root().display().to_string()),
            model: Some(self.config.model.clone()),
            ..SessionMeta::default()
        };
        self.store
            .save(&self.session_name, self.conversation.messages(), &meta)
    }

    fn print_banner(&mut self) {
        self.say(&format!("coding-agent ({})", env!("CARGO_PKG_VERSION")));
        self.print_config();
        self.say("Type your message and press Enter. /help lists commands.");
    }

    fn print_config(&mut self) {
        let mut rows = self.config.describe();
        rows.push(("session", self.session_name.clone()));
        let body = rows
            .into_iter()
            .map(|(label, value)| format!("  {label:<15} {value}"))
            .collect::<Vec<_>>()
            .join("\n");
        self.say(&body);
    }

    fn print_tools(&mut self) {
        let body = self
            .registry
            .tools()
            .map(|tool| format!("  {} - {}", tool.name, tool.description))
            .collect::<Vec<_>>()
            .join("\n");
        self.say(&format!("Available tools:\n{body}"));
    }

    fn print_session(&mut self) {
        let path = self.store.session_path(&self.session_name);
        self.say(&format!(
            "session:      {}\nautosave:     {}\nsessions_dir: {}\nfile:         {}",
            self.session_name,
            self.config.autosave,
            self.store.base_dir().display(),
            path.display()
        ));
    }

    fn print_sessions(&mut self) {
        let sessions = self.store.list();
        if sessions.is_empty() {
            self.say("(no sessions yet)");
            return;
        }
        let body = sessions
            .iter()
            .map(|summary| {
                let marker = if summary.name == self.session_name { "*" } else { "-" };
                format!("{marker} {}  (updated {})", summary.name, summary.updated_at)
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.say(&body);
    }

    fn say(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}
