/// Stream event emitted by the parser after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// Assistant text fragment from `choices[0].delta.content`.
    TextDelta { delta: String },
    /// One entry of `choices[0].delta.tool_calls`.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// `choices[0].finish_reason` became non-null.
    Finished { reason: String },
    /// In-band error payload.
    Error {
        code: Option<String>,
        message: Option<String>,
    },
    /// The `[DONE]` sentinel.
    Done,
}

impl ChatStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}
