//! Session state management.

use serde::Serialize;

use parley_core::events::{ContentBlock, Usage};

/// Role of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    User,
    Assistant,
    Error,
}

/// One transcript message.
///
/// `blocks` is the structured tree the assembler mutates; `content` is its
/// flattened text, refreshed after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub kind: MessageKind,
    pub content: String,
    pub blocks: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Provider message id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Message {
    /// An empty assistant message, opened by a stream.
    pub const fn assistant() -> Self {
        Self {
            kind: MessageKind::Assistant,
            content: String::new(),
            blocks: Vec::new(),
            usage: None,
            id: None,
        }
    }

    /// A user message from blocks.
    pub fn user(blocks: Vec<ContentBlock>) -> Self {
        let mut message = Self {
            kind: MessageKind::User,
            content: String::new(),
            blocks,
            usage: None,
            id: None,
        };
        message.refresh_content();
        message
    }

    /// A user prompt typed on the host side.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::user(vec![ContentBlock::Text { text: text.into() }])
    }

    pub fn error(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind: MessageKind::Error,
            content: text.clone(),
            blocks: vec![ContentBlock::Text { text }],
            usage: None,
            id: None,
        }
    }

    /// Recompute `content` from the blocks.
    ///
    /// Text blocks concatenate as-is; a message with no text (a pure tool
    /// result) shows the tool output instead.
    pub fn refresh_content(&mut self) {
        let text: String = self
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        self.content = if text.is_empty() && self.kind == MessageKind::User {
            self.blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult { output, .. } => Some(output.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            text
        };
    }

    pub fn has_tool_use(&self, tool_id: &str) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { id, .. } if id == tool_id))
    }
}

/// State of one conversation, rendered by the UI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub messages: Vec<Message>,
    /// A turn is in progress.
    pub busy: bool,
    /// Waiting for the agent to produce output.
    pub loading: bool,
    /// Backend session id, for resumption.
    pub session_id: Option<String>,
    /// Last turn error.
    pub error: Option<String>,
    pub slash_commands: Vec<String>,
    /// Tool whose permission dialog is open.
    pub awaiting_permission: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prompt the user sent and mark the session busy.
    pub fn push_prompt(&mut self, text: impl Into<String>) {
        self.messages.push(Message::prompt(text));
        self.busy = true;
        self.loading = true;
        self.error = None;
    }

    /// Append a message and return its index.
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Latest assistant message, if any.
    pub fn last_assistant_mut(&mut self) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.kind == MessageKind::Assistant)
    }

    /// A permission dialog opened for `tool_name`.
    pub fn permission_prompted(&mut self, tool_name: &str) {
        self.awaiting_permission = Some(tool_name.to_string());
        self.loading = false;
    }

    /// The open permission dialog resolved.
    pub fn permission_resolved(&mut self) {
        self.awaiting_permission = None;
        self.loading = self.busy;
    }

    /// Start a fresh conversation.
    pub fn clear(&mut self) {
        *self = Self {
            slash_commands: std::mem::take(&mut self.slash_commands),
            ..Self::default()
        };
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_message_shows_output() {
        let message = Message::user(vec![ContentBlock::ToolResult {
            tool_use_id: "t1".into(),
            output: "ok".into(),
            is_error: false,
        }]);
        assert_eq!(message.content, "ok");
    }

    #[test]
    fn assistant_content_concatenates_text_blocks() {
        let mut message = Message::assistant();
        message.blocks.push(ContentBlock::Text { text: "Hello".into() });
        message.blocks.push(ContentBlock::ToolUse {
            id: "t1".into(),
            name: "Read".into(),
            input: serde_json::Value::Null,
        });
        message.blocks.push(ContentBlock::Text { text: "!".into() });
        message.refresh_content();
        assert_eq!(message.content, "Hello!");
        assert!(message.has_tool_use("t1"));
    }

    #[test]
    fn permission_dialog_pauses_loading() {
        let mut state = SessionState::new();
        state.push_prompt("fix it");
        assert!(state.busy && state.loading);

        state.permission_prompted("Bash");
        assert!(!state.loading);
        assert_eq!(state.awaiting_permission.as_deref(), Some("Bash"));

        state.permission_resolved();
        assert!(state.loading);
        assert!(state.awaiting_permission.is_none());
    }

    #[test]
    fn clear_keeps_slash_commands() {
        let mut state = SessionState::new();
        state.slash_commands = vec!["/clear".into()];
        state.push_prompt("hi");
        state.session_id = Some("s1".into());

        state.clear();
        assert!(state.messages.is_empty());
        assert!(state.session_id.is_none());
        assert_eq!(state.slash_commands, vec!["/clear".to_string()]);
    }
}
