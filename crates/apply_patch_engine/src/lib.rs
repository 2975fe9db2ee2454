//! Unified-diff parsing and all-or-nothing application against in-memory text.
//!
//! The engine never touches the filesystem itself: callers read the original
//! text, call [`apply_patch`], preview the result with [`DiffPreview`], and only
//! then decide whether to write it back.

mod apply;
mod error;
mod parser;
mod preview;

pub use apply::apply_hunks;
pub use error::PatchError;
pub use parser::{parse_patch, Hunk, HunkLine, ParsedPatch};
pub use preview::{DiffLine, DiffLineKind, DiffPreview, DIFF_CONTEXT_LINES, DIFF_MAX_LINES};

/// Parses `patch_text` and applies every hunk to `original_text`.
///
/// Returns the complete new text, or an error with no partial output.
pub fn apply_patch(original_text: &str, patch_text: &str) -> Result<String, PatchError> {
    let parsed = parse_patch(patch_text)?;
    apply_hunks(original_text, &parsed.hunks)
}
