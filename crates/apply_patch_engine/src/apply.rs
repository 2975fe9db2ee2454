use crate::error::PatchError;
use crate::parser::{Hunk, HunkLine};

/// Applies `hunks` in order against `original`.
///
/// Context and removal lines must match the original exactly, ignoring line
/// terminators. Any mismatch fails the whole call and no text is returned.
pub fn apply_hunks(original: &str, hunks: &[Hunk]) -> Result<String, PatchError> {
    let original_lines: Vec<&str> = original.split_inclusive('\n').collect();
    let mut output = String::with_capacity(original.len());
    let mut cursor = 0usize;

    for (hunk_index, hunk) in hunks.iter().enumerate() {
        let hunk_number = hunk_index + 1;
        let hunk_start = hunk.old_start.saturating_sub(1);
        while cursor < hunk_start && cursor < original_lines.len() {
            output.push_str(original_lines[cursor]);
            cursor += 1;
        }

        for line in &hunk.lines {
            match line {
                HunkLine::Context(text) => {
                    let current = expect_line(&original_lines, cursor, text, hunk_number, "context")?;
                    push_line(&mut output, current);
                    cursor += 1;
                }
                HunkLine::Removed(text) => {
                    expect_line(&original_lines, cursor, text, hunk_number, "removal")?;
                    cursor += 1;
                }
                HunkLine::Added(text) => {
                    push_line(&mut output, text);
                    if !text.ends_with('\n') {
                        output.push('\n');
                    }
                }
            }
        }
    }

    for line in &original_lines[cursor.min(original_lines.len())..] {
        push_line(&mut output, line);
    }

    Ok(output)
}

fn expect_line<'a>(
    original_lines: &[&'a str],
    cursor: usize,
    expected: &str,
    hunk_number: usize,
    role: &str,
) -> Result<&'a str, PatchError> {
    let Some(current) = original_lines.get(cursor) else {
        return Err(PatchError::apply(
            hunk_number,
            cursor + 1,
            format!("{role} line goes past end of file: {expected:?}"),
        ));
    };

    if strip_terminator(current) != strip_terminator(expected) {
        return Err(PatchError::apply(
            hunk_number,
            cursor + 1,
            format!(
                "{role} mismatch: expected {:?}, found {:?}",
                strip_terminator(expected),
                strip_terminator(current)
            ),
        ));
    }

    Ok(current)
}

/// Appends `line`, first terminating the previous line if an earlier copy left
/// it without a newline (an unterminated last line followed by additions).
fn push_line(output: &mut String, line: &str) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(line);
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
