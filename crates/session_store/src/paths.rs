use std::path::{Path, PathBuf};

use time::OffsetDateTime;

pub const SESSION_DIR: [&str; 2] = [".agent", "sessions"];
pub const INDEX_FILE: &str = "index.json";
/// File stem of [`INDEX_FILE`]; sessions may not shadow it.
const RESERVED_STEM: &str = "index";
pub const MAX_SESSION_NAME_LEN: usize = 64;

#[must_use]
pub fn session_root(cwd: &Path) -> PathBuf {
    cwd.join(SESSION_DIR[0]).join(SESSION_DIR[1])
}

#[must_use]
pub fn session_file_name(name: &str) -> String {
    format!("{name}.json")
}

/// Restricts `name` to `[A-Za-z0-9._-]`.
///
/// Whitespace and runs of other characters collapse to a single `-`; leading
/// and trailing dashes are trimmed and the result is capped at
/// [`MAX_SESSION_NAME_LEN`] characters. A name that would collide with the
/// index file gets a `-session` suffix. May return an empty string.
#[must_use]
pub fn sanitize_session_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut in_invalid_run = false;

    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            sanitized.push(c);
            in_invalid_run = false;
        } else if !in_invalid_run {
            sanitized.push('-');
            in_invalid_run = true;
        }
    }

    let trimmed = sanitized.trim_matches('-');
    let capped: String = trimmed.chars().take(MAX_SESSION_NAME_LEN).collect();
    if capped.eq_ignore_ascii_case(RESERVED_STEM) {
        format!("{capped}-session")
    } else {
        capped
    }
}

/// `session-YYYY-MM-DD_HHMMSS` for the given instant.
#[must_use]
pub fn default_session_name(now: OffsetDateTime) -> String {
    format!(
        "session-{:04}-{:02}-{:02}_{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
