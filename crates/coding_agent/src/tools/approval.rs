use std::collections::VecDeque;
use std::io::Write;

use apply_patch_engine::DiffPreview;

use crate::console::LineInput;

/// Marker placed in the `error` field of a rejected tool result.
pub const USER_REJECTED: &str = "USER_DISAPPROVED";

/// One pending mutating action awaiting a yes/no answer.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalRequest<'a> {
    pub action: &'a str,
    pub diff: Option<&'a DiffPreview>,
}

/// Human confirmation checkpoint. Each call asks exactly once.
pub trait Approver {
    fn confirm(&mut self, request: &ApprovalRequest<'_>) -> bool;
}

pub fn rejection_message(action: &str) -> String {
    format!(
        "{USER_REJECTED}: The user rejected this action: {action}. \
         Do NOT retry automatically. Ask the user how to proceed."
    )
}

/// Prints the diff preview and a `[approve] ...? (y/N)` prompt, then reads one line.
pub struct ConsoleApprover {
    input: Box<dyn LineInput>,
    output: Box<dyn Write>,
}

impl ConsoleApprover {
    pub fn new(input: Box<dyn LineInput>, output: Box<dyn Write>) -> Self {
        Self { input, output }
    }
}

impl Approver for ConsoleApprover {
    fn confirm(&mut self, request: &ApprovalRequest<'_>) -> bool {
        if let Some(diff) = request.diff {
            let _ = writeln!(self.output, "--- Diff Preview ---");
            let _ = write!(self.output, "{}", diff.render_plain());
            let _ = writeln!(self.output);
        }

        let _ = write!(self.output, "[approve] {}? (y/N): ", request.action);
        let _ = self.output.flush();

        match self.input.read_line() {
            Ok(Some(answer)) => is_affirmative(&answer),
            Ok(None) | Err(_) => false,
        }
    }
}

/// Answers from a fixed script and records every action it was asked about.
///
/// Once the script runs out every further request is declined.
#[derive(Debug, Default, Clone)]
pub struct ScriptedApprover {
    answers: VecDeque<bool>,
    asked: Vec<String>,
}

impl ScriptedApprover {
    #[must_use]
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Approver for ScriptedApprover {
    fn confirm(&mut self, request: &ApprovalRequest<'_>) -> bool {
        self.asked.push(request.action.to_string());
        self.answers.pop_front().unwrap_or(false)
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use crate::console::{ScriptedInput, SharedBuffer};

    use super::*;

    #[test]
    fn only_y_or_yes_approves() {
        for (answer, expected) in [
            ("y", true),
            (" YES ", true),
            ("n", false),
            ("", false),
            ("sure", false),
        ] {
            let output = SharedBuffer::new();
            let mut approver = ConsoleApprover::new(
                Box::new(ScriptedInput::new([answer])),
                Box::new(output.clone()),
            );

            let approved = approver.confirm(&ApprovalRequest {
                action: "shell ls",
                diff: None,
            });

            assert_eq!(approved, expected, "answer {answer:?}");
            assert_eq!(output.contents(), "[approve] shell ls? (y/N): ");
        }
    }

    #[test]
    fn end_of_input_declines() {
        let mut approver =
            ConsoleApprover::new(Box::new(ScriptedInput::default()), Box::new(SharedBuffer::new()));

        assert!(!approver.confirm(&ApprovalRequest {
            action: "delete_file a",
            diff: None,
        }));
    }

    #[test]
    fn diff_preview_is_printed_before_prompt() {
        let output = SharedBuffer::new();
        let mut approver = ConsoleApprover::new(
            Box::new(ScriptedInput::new(["y"])),
            Box::new(output.clone()),
        );
        let diff = DiffPreview::new("a\n", "b\n", "f.txt");

        approver.confirm(&ApprovalRequest {
            action: "write_file f.txt",
            diff: Some(&diff),
        });

        let printed = output.contents();
        assert!(printed.contains("-a"));
        assert!(printed.contains("+b"));
        assert!(printed.ends_with("[approve] write_file f.txt? (y/N): "));
    }

    #[test]
    fn scripted_approver_records_and_declines_when_exhausted() {
        let mut approver = ScriptedApprover::new([true]);
        let request = ApprovalRequest {
            action: "shell ls",
            diff: None,
        };

        assert!(approver.confirm(&request));
        assert!(!approver.confirm(&request));
        assert_eq!(approver.asked(), ["shell ls", "shell ls"]);
    }

    #[test]
    fn rejection_message_names_the_action() {
        assert_eq!(
            rejection_message("shell rm -rf x"),
            "USER_DISAPPROVED: The user rejected this action: shell rm -rf x. Do NOT retry automatically. Ask the user how to proceed."
        );
    }
}
