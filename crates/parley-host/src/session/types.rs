//! Session update types.

use serde::Serialize;

/// What changed in a session, for the UI to re-render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptUpdate {
    /// The message list changed; re-render the whole transcript.
    Refresh,
    StreamStarted,
    /// Text appended to the open assistant message.
    ContentDelta { text: String },
    /// Reasoning appended to the open assistant message.
    ThinkingDelta { text: String },
    StreamEnded,
    /// A new backend session id was captured.
    SessionId { id: String },
    SlashCommands,
    /// A turn failed.
    Error { message: String },
    /// Busy or loading flags changed.
    Status { busy: bool, loading: bool },
}

/// Default capacity of a session's update channel.
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;
