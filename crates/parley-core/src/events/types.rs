//! Agent event vocabulary shared by every backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized event from an agent backend, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A complete (or per-block) assistant message.
    Assistant(AssistantEvent),
    /// A user-role message: echoed prompts, tool results, meta messages.
    User(UserEvent),
    /// Complete reasoning text.
    Thinking(String),
    /// Complete assistant text.
    Content(String),
    /// Incremental assistant text.
    ContentDelta(String),
    /// Incremental reasoning text.
    ThinkingDelta(String),
    StreamStart,
    StreamEnd,
    /// Backend session identifier, used for resumption.
    SessionId(String),
    ToolResult(ToolResultEvent),
    MessageEnd,
    /// Turn statistics.
    Result(ResultEvent),
    SlashCommands(Vec<String>),
    System(SystemEvent),
    /// Anything outside the vocabulary; ignored by consumers.
    Unknown { kind: String, payload: Value },
}

impl AgentEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Assistant(_) => "assistant",
            Self::User(_) => "user",
            Self::Thinking(_) => "thinking",
            Self::Content(_) => "content",
            Self::ContentDelta(_) => "content_delta",
            Self::ThinkingDelta(_) => "thinking_delta",
            Self::StreamStart => "stream_start",
            Self::StreamEnd => "stream_end",
            Self::SessionId(_) => "session_id",
            Self::ToolResult(_) => "tool_result",
            Self::MessageEnd => "message_end",
            Self::Result(_) => "result",
            Self::SlashCommands(_) => "slash_commands",
            Self::System(_) => "system",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

/// Assistant message payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssistantEvent {
    /// Provider message id, when the backend supplies one.
    pub id: Option<String>,
    pub content: Vec<ContentBlock>,
    pub usage: Option<Usage>,
}

impl AssistantEvent {
    /// Whether any block is a tool invocation (a segment boundary).
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// User message payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserEvent {
    pub content: Vec<ContentBlock>,
    /// Backend marked the message as internal bookkeeping.
    pub is_meta: bool,
}

/// Content block inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        output: String,
        is_error: bool,
    },
}

/// Standalone tool result event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultEvent {
    pub tool_use_id: String,
    pub output: String,
    pub is_error: bool,
}

impl From<ToolResultEvent> for ContentBlock {
    fn from(result: ToolResultEvent) -> Self {
        Self::ToolResult {
            tool_use_id: result.tool_use_id,
            output: result.output,
            is_error: result.is_error,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
}

impl Usage {
    pub const fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_read_input_tokens == 0
            && self.cache_creation_input_tokens == 0
    }
}

/// Turn completion statistics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultEvent {
    pub session_id: Option<String>,
    pub usage: Option<Usage>,
    pub duration_ms: u64,
    pub cost_usd: Option<f64>,
    pub is_error: bool,
    /// Error description when `is_error` is set.
    pub error: Option<String>,
}

/// Backend system message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemEvent {
    pub subtype: String,
    pub session_id: Option<String>,
    pub model: Option<String>,
}
