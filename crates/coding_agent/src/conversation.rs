use std::path::Path;

use agent_provider::Message;

use crate::prompts::system_message;

/// Ordered message history whose first entry is always the system message
/// for the current workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            messages: vec![system_message(workspace_root)],
        }
    }

    /// Rebuilds a conversation from persisted messages.
    ///
    /// A leading system message is replaced with one for `workspace_root`;
    /// otherwise a fresh one is inserted.
    #[must_use]
    pub fn restore(workspace_root: &Path, mut messages: Vec<Message>) -> Self {
        let system = system_message(workspace_root);
        match messages.first_mut() {
            Some(first) if first.is_system() => *first = system,
            _ => messages.insert(0, system),
        }
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system message is never removed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drops everything after the first `len` messages, keeping the system message.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }

    /// Regenerates the system message after the workspace root changed.
    pub fn set_root(&mut self, workspace_root: &Path) {
        self.messages[0] = system_message(workspace_root);
    }

    /// Back to just the system message.
    pub fn reset(&mut self, workspace_root: &Path) {
        self.messages.clear();
        self.messages.push(system_message(workspace_root));
    }
}

#[cfg(test)]
mod tests {
    use agent_provider::Role;

    use super::*;

    #[test]
    fn restore_refreshes_existing_system_message() {
        let stored = vec![Message::system("old root"), Message::user("hi")];

        let conversation = Conversation::restore(Path::new("/new"), stored);

        assert_eq!(conversation.len(), 2);
        assert!(conversation.messages()[0].content.contains("/new"));
        assert_eq!(conversation.messages()[1], Message::user("hi"));
    }

    #[test]
    fn restore_inserts_missing_system_message() {
        let conversation = Conversation::restore(Path::new("/w"), vec![Message::user("hi")]);

        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn truncate_never_drops_system_message() {
        let mut conversation = Conversation::new(Path::new("/w"));
        conversation.push(Message::user("a"));

        conversation.truncate(0);

        assert_eq!(conversation.len(), 1);
        assert!(conversation.messages()[0].is_system());
    }

    #[test]
    fn set_root_rewrites_only_the_first_message() {
        let mut conversation = Conversation::new(Path::new("/a"));
        conversation.push(Message::user("keep"));

        conversation.set_root(Path::new("/b"));

        assert!(conversation.messages()[0].content.contains("/b"));
        assert_eq!(conversation.messages()[1], Message::user("keep"));
    }
}
