use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("invalid patch: {message}")]
    Parse { message: String },

    #[error("patch does not apply (hunk {hunk}, original line {line}): {message}")]
    Apply {
        hunk: usize,
        line: usize,
        message: String,
    },
}

impl PatchError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub(crate) fn apply(hunk: usize, line: usize, message: impl Into<String>) -> Self {
        Self::Apply {
            hunk,
            line,
            message: message.into(),
        }
    }

    /// Stable short tag used in structured tool results.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "patch_parse",
            Self::Apply { .. } => "patch_apply",
        }
    }
}
