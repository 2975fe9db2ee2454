use crate::error::PatchError;

/// One tagged line of a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

/// A contiguous change region from a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPatch {
    /// Name from the `+++` line with any `a/` or `b/` prefix stripped.
    pub target: Option<String>,
    pub hunks: Vec<Hunk>,
}

/// Parses a single-file unified diff.
///
/// Lines before the `+++` header are ignored. A patch without a `+++` header is
/// scanned for hunks from the top. Zero hunks is an error.
pub fn parse_patch(patch_text: &str) -> Result<ParsedPatch, PatchError> {
    let lines: Vec<&str> = patch_text.lines().collect();

    let (target, body_start) = match lines.iter().position(|line| line.starts_with("+++ ")) {
        Some(index) => (parse_target(lines[index]), index + 1),
        None => (None, 0),
    };

    let mut hunks = Vec::new();
    let mut index = body_start;
    while index < lines.len() {
        let Some(header) = parse_hunk_header(lines[index]) else {
            index += 1;
            continue;
        };
        index += 1;

        let mut body = Vec::new();
        while index < lines.len() && !lines[index].starts_with("@@ ") {
            if let Some(line) = classify_body_line(lines[index]) {
                body.push(line);
            }
            index += 1;
        }

        hunks.push(Hunk {
            lines: body,
            ..header
        });
    }

    if hunks.is_empty() {
        return Err(PatchError::parse("no hunks found"));
    }

    Ok(ParsedPatch { target, hunks })
}

fn parse_target(line: &str) -> Option<String> {
    let raw = line.strip_prefix("+++ ")?.trim();
    // Drop a trailing `\t<timestamp>` the way `diff -u` writes it.
    let raw = raw.split('\t').next().unwrap_or(raw).trim();
    let name = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn classify_body_line(line: &str) -> Option<HunkLine> {
    let mut chars = line.chars();
    let prefix = chars.next()?;
    let text = chars.as_str().to_string();
    match prefix {
        ' ' => Some(HunkLine::Context(text)),
        '-' => Some(HunkLine::Removed(text)),
        '+' => Some(HunkLine::Added(text)),
        // `\ No newline at end of file` and anything unrecognised.
        _ => None,
    }
}

/// Parses `@@ -oldStart[,oldCount] +newStart[,newCount] @@[ section]`.
fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let rest = line.strip_prefix("@@ -")?;
    let (old_range, rest) = rest.split_once(" +")?;
    let (new_range, rest) = rest.split_once(" @@")?;
    if !(rest.is_empty() || rest.starts_with(' ')) {
        return None;
    }

    let (old_start, old_count) = parse_range(old_range)?;
    let (new_start, new_count) = parse_range(new_range)?;

    Some(Hunk {
        old_start,
        old_count,
        new_start,
        new_count,
        lines: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    let (start, count) = match range.split_once(',') {
        Some((start, count)) => (start, Some(count)),
        None => (range, None),
    };

    let start = parse_number(start)?;
    let count = match count {
        Some(count) => parse_number(count)?,
        None => 1,
    };
    Some((start, count))
}

fn parse_number(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
