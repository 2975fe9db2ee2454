use similar::TextDiff;

/// Maximum number of diff lines shown before truncating.
pub const DIFF_MAX_LINES: usize = 200;
/// Unchanged lines of context around each change.
pub const DIFF_CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    FileHeader,
    HunkHeader,
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

/// Line-classified unified diff between two texts, capped at [`DIFF_MAX_LINES`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPreview {
    pub lines: Vec<DiffLine>,
    /// Number of diff lines dropped by the cap.
    pub truncated: usize,
}

impl DiffPreview {
    #[must_use]
    pub fn new(old_text: &str, new_text: &str, path_label: &str) -> Self {
        Self::with_limit(old_text, new_text, path_label, DIFF_MAX_LINES)
    }

    #[must_use]
    pub fn with_limit(old_text: &str, new_text: &str, path_label: &str, max_lines: usize) -> Self {
        let diff = TextDiff::from_lines(old_text, new_text);
        let rendered = diff
            .unified_diff()
            .context_radius(DIFF_CONTEXT_LINES)
            .header(&format!("a/{path_label}"), &format!("b/{path_label}"))
            .to_string();

        let all: Vec<&str> = rendered.lines().collect();
        let truncated = all.len().saturating_sub(max_lines);
        let lines = all
            .into_iter()
            .take(max_lines)
            .map(|line| DiffLine {
                kind: classify(line),
                text: line.to_string(),
            })
            .collect();

        Self { lines, truncated }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Footer shown after a truncated preview.
    #[must_use]
    pub fn truncation_notice(&self) -> Option<String> {
        (self.truncated > 0).then(|| format!("...[diff truncated: {} more lines]...", self.truncated))
    }

    /// Plain-text rendering, one diff line per output line.
    #[must_use]
    pub fn render_plain(&self) -> String {
        if self.is_empty() {
            return "No changes.\n".to_string();
        }

        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        if let Some(notice) = self.truncation_notice() {
            out.push_str(&notice);
            out.push('\n');
        }
        out
    }
}

fn classify(line: &str) -> DiffLineKind {
    if line.starts_with("--- ") || line.starts_with("+++ ") {
        DiffLineKind::FileHeader
    } else if line.starts_with("@@") {
        DiffLineKind::HunkHeader
    } else if line.starts_with('+') {
        DiffLineKind::Added
    } else if line.starts_with('-') {
        DiffLineKind::Removed
    } else {
        DiffLineKind::Context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_have_no_changes() {
        let preview = DiffPreview::new("same\n", "same\n", "f.txt");
        assert!(preview.is_empty());
        assert_eq!(preview.render_plain(), "No changes.\n");
    }

    #[test]
    fn lines_are_classified() {
        let preview = DiffPreview::new("a\nb\nc\n", "a\nB\nc\n", "f.txt");
        let kinds: Vec<DiffLineKind> = preview.lines.iter().map(|line| line.kind).collect();

        assert_eq!(
            kinds,
            vec![
                DiffLineKind::FileHeader,
                DiffLineKind::FileHeader,
                DiffLineKind::HunkHeader,
                DiffLineKind::Context,
                DiffLineKind::Removed,
                DiffLineKind::Added,
                DiffLineKind::Context,
            ]
        );
        assert_eq!(preview.lines[0].text, "--- a/f.txt");
        assert_eq!(preview.lines[1].text, "+++ b/f.txt");
    }

    #[test]
    fn long_diffs_are_capped_with_notice() {
        let new_text: String = (0..50).map(|n| format!("line {n}\n")).collect();
        let preview = DiffPreview::with_limit("", &new_text, "big.txt", 10);

        assert_eq!(preview.lines.len(), 10);
        // 2 file headers + 1 hunk header + 50 additions.
        assert_eq!(preview.truncated, 43);
        assert!(preview
            .render_plain()
            .ends_with("...[diff truncated: 43 more lines]...\n"));
    }
}
