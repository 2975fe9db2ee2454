/// One parsed console command.
///
/// Argument-taking variants keep their raw arguments; missing or malformed
/// arguments are reported by the handler, not the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Tools,
    Clear,
    Paste,
    Quit,
    Reset,
    Config,
    Cwd(Option<String>),
    Approve(Option<String>),
    Model(Option<String>),
    Truncate(Option<String>),
    Verbose(Option<String>),
    Autosave(Option<String>),
    Session,
    Sessions,
    NewSession(Option<String>),
    Load(Option<String>),
    Save(Option<String>),
    Delete(Option<String>),
    Rename(Option<String>, Option<String>),
    Unknown(String),
}

/// Commands that also work without a `/` or `\` prefix, as a single word.
const BARE_COMMANDS: [&str; 8] = [
    "help", "tools", "clear", "paste", "exit", "quit", "reset", "config",
];

/// Parses `input` as a command, or returns `None` for ordinary chat text.
///
/// A `/` or `\` prefix marks a command; the head is case-insensitive. Without a
/// prefix only a lone word from [`BARE_COMMANDS`] counts.
pub fn parse_command(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    let (prefixed, body) = match trimmed.strip_prefix(['/', '\\']) {
        Some(body) => (true, body.trim_start()),
        None => (false, trimmed),
    };

    let mut parts = body.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let args: Vec<&str> = parts.collect();

    if !prefixed && (!args.is_empty() || !BARE_COMMANDS.contains(&head.as_str())) {
        return None;
    }

    let rest = (!args.is_empty()).then(|| args.join(" "));
    let arg = |index: usize| args.get(index).map(|value| (*value).to_string());

    let command = match head.as_str() {
        "help" | "h" | "?" | "commands" => Command::Help,
        "tools" | "tool" | "ls-tools" => Command::Tools,
        "clear" | "cls" => Command::Clear,
        "paste" | "multiline" | "ml" => Command::Paste,
        "quit" | "exit" | "q" => Command::Quit,
        "reset" => Command::Reset,
        "config" => Command::Config,
        "cwd" => Command::Cwd(rest),
        "approve" => Command::Approve(arg(0)),
        "model" => Command::Model(rest),
        "truncate" => Command::Truncate(arg(0)),
        "verbose" => Command::Verbose(arg(0)),
        "autosave" => Command::Autosave(arg(0)),
        "session" => Command::Session,
        "sessions" => Command::Sessions,
        "new-session" | "newsession" => Command::NewSession(rest),
        "load" => Command::Load(arg(0)),
        "save" => Command::Save(rest),
        "delete" => Command::Delete(arg(0)),
        "rename" => Command::Rename(arg(0), arg(1)),
        _ => Command::Unknown(head),
    };

    Some(command)
}

/// Whether `line` ends paste mode.
pub fn is_paste_terminator(line: &str) -> bool {
    matches!(
        line.trim().to_lowercase().as_str(),
        "/end" | "\\end" | "end"
    )
}

/// Help text for the `help` command.
pub fn help_text() -> &'static str {
    "Core
  /help                 show this help
  /tools                list available tools
  /config               show current configuration
  /clear                clear the screen
  /paste                multi-line input, end with /end
  /reset                start the conversation over
  /quit                 exit

Settings
  /cwd <path>           change the workspace root
  /approve on|off       auto-approve file and shell changes
  /model <name>         switch model
  /truncate [n]         tool output line limit (0 = no truncation)
  /verbose [on|off]     full or compact tool output
  /autosave [on|off]    save the session after every turn

Sessions
  /session              show the current session
  /sessions             list saved sessions
  /new-session [name]   start a new session
  /load <name>          load a session
  /save [name]          save now, optionally under a new name
  /delete <name>        delete a session
  /rename <old> <new>   rename a session"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("please fix the build"), None);
        assert_eq!(parse_command("help me with this"), None);
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn bare_words_work_only_for_the_short_list() {
        assert_eq!(parse_command("help"), Some(Command::Help));
        assert_eq!(parse_command(" EXIT "), Some(Command::Quit));
        assert_eq!(parse_command("sessions"), None);
        assert_eq!(parse_command("h"), None);
    }

    #[test]
    fn prefixes_and_aliases_are_accepted() {
        assert_eq!(parse_command("/H"), Some(Command::Help));
        assert_eq!(parse_command("\\cls"), Some(Command::Clear));
        assert_eq!(parse_command("/ml"), Some(Command::Paste));
        assert_eq!(parse_command("/ls-tools"), Some(Command::Tools));
        assert_eq!(parse_command("/q"), Some(Command::Quit));
        assert_eq!(parse_command("/newsession"), Some(Command::NewSession(None)));
    }

    #[test]
    fn arguments_keep_their_case() {
        assert_eq!(
            parse_command("/model GPT-4o Mini"),
            Some(Command::Model(Some("GPT-4o Mini".to_string())))
        );
        assert_eq!(
            parse_command("/cwd ../My Project"),
            Some(Command::Cwd(Some("../My Project".to_string())))
        );
        assert_eq!(
            parse_command("/rename old"),
            Some(Command::Rename(Some("old".to_string()), None))
        );
        assert_eq!(parse_command("/approve"), Some(Command::Approve(None)));
    }

    #[test]
    fn unknown_prefixed_commands_are_reported() {
        assert_eq!(
            parse_command("/Frobnicate now"),
            Some(Command::Unknown("frobnicate".to_string()))
        );
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn paste_terminator_accepts_prefix_variants() {
        assert!(is_paste_terminator("/end"));
        assert!(is_paste_terminator(" \\END "));
        assert!(!is_paste_terminator("the end"));
    }
}
