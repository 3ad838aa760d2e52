//! Transcript assembly.
//!
//! Assemblers fold backend events into a [`SessionState`], reporting what
//! changed as [`TranscriptUpdate`]s. Streaming backends use
//! [`StreamAssembler`]; the non-streaming backend uses [`SimpleAssembler`].

mod simple;
mod stream;

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use parley_core::events::{AgentEvent, Backend, ContentBlock, ResultEvent, Usage, UserEvent};

use crate::session::{Message, SessionState, TranscriptUpdate};

pub use simple::SimpleAssembler;
pub use stream::StreamAssembler;

/// Folds backend events into session state.
pub trait Assembler: Send {
    /// Apply one event and report what changed.
    fn apply(&mut self, session: &mut SessionState, event: AgentEvent) -> Vec<TranscriptUpdate>;

    /// Forget open-message tracking, e.g. after the session is cleared.
    fn reset(&mut self);
}

/// The assembler suited to a backend.
pub fn for_backend(backend: Backend) -> Box<dyn Assembler> {
    if backend.streams_deltas() {
        Box::new(StreamAssembler::new())
    } else {
        Box::new(SimpleAssembler::new())
    }
}

/// Tags the agent wraps around slash-command bookkeeping.
static INTERNAL_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*<(command-name|command-message|command-args|local-command-stdout|local-command-stderr|system-reminder)>",
    )
    .expect("static regex is valid")
});

/// Whether a user text is internal bookkeeping rather than something typed.
pub fn is_internal_text(text: &str) -> bool {
    text.trim().is_empty() || INTERNAL_TAG_RE.is_match(text)
}

/// Which kind of streamed segment a delta extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment {
    Text,
    Thinking,
}

impl Segment {
    fn block(self, text: String) -> ContentBlock {
        match self {
            Self::Text => ContentBlock::Text { text },
            Self::Thinking => ContentBlock::Thinking { text },
        }
    }
}

/// Extend the active segment block, or open a new one. Returns the index of
/// the block that received the delta.
pub(crate) fn extend_segment(
    blocks: &mut Vec<ContentBlock>,
    active: Option<usize>,
    segment: Segment,
    delta: &str,
) -> usize {
    if let Some(index) = active {
        match (segment, blocks.get_mut(index)) {
            (Segment::Text, Some(ContentBlock::Text { text }))
            | (Segment::Thinking, Some(ContentBlock::Thinking { text })) => {
                text.push_str(delta);
                return index;
            }
            _ => {}
        }
    }
    blocks.push(segment.block(delta.to_string()));
    blocks.len() - 1
}

/// Build the transcript message for a user event.
///
/// Internal messages are dropped, as is an echo of the prompt the host
/// already appended.
pub(crate) fn user_message(session: &SessionState, event: UserEvent) -> Option<Message> {
    if event.is_meta {
        debug!("Skipping meta user message");
        return None;
    }
    let blocks: Vec<ContentBlock> = event
        .content
        .into_iter()
        .filter(|b| !matches!(b, ContentBlock::Text { text } if is_internal_text(text)))
        .collect();
    if blocks.is_empty() {
        return None;
    }

    let message = Message::user(blocks);
    let is_echo = session
        .messages
        .last()
        .is_some_and(|last| last.kind == message.kind && last.blocks == message.blocks);
    if is_echo {
        debug!("Skipping echoed user prompt");
        return None;
    }
    Some(message)
}

/// Store a session id, announcing it only when it changed.
pub(crate) fn capture_session_id(session: &mut SessionState, id: String) -> Vec<TranscriptUpdate> {
    if session.session_id.as_deref() == Some(id.as_str()) {
        return Vec::new();
    }
    debug!(session_id = %id, "Captured session id");
    session.session_id = Some(id.clone());
    vec![TranscriptUpdate::SessionId { id }]
}

/// Attach turn usage to the latest assistant message unless it already
/// carries real numbers.
pub(crate) fn patch_usage(session: &mut SessionState, usage: Usage) {
    if let Some(message) = session.last_assistant_mut() {
        if message.usage.is_none_or(|u| u.is_zero()) {
            message.usage = Some(usage);
        }
    }
}

/// Apply a turn result: usage, session id, error. Clears busy and loading.
pub(crate) fn finish_turn(session: &mut SessionState, result: ResultEvent) -> Vec<TranscriptUpdate> {
    let mut updates = Vec::new();
    if let Some(usage) = result.usage {
        patch_usage(session, usage);
    }
    if let Some(id) = result.session_id {
        updates.extend(capture_session_id(session, id));
    }
    if result.is_error {
        let message = result
            .error
            .unwrap_or_else(|| "Agent turn failed".to_string());
        session.error = Some(message.clone());
        session.push(Message::error(message.clone()));
        updates.push(TranscriptUpdate::Error { message });
    }
    updates.extend(set_idle(session));
    updates.push(TranscriptUpdate::Refresh);
    updates
}

pub(crate) fn set_idle(session: &mut SessionState) -> Option<TranscriptUpdate> {
    if !session.busy && !session.loading {
        return None;
    }
    session.busy = false;
    session.loading = false;
    Some(TranscriptUpdate::Status {
        busy: false,
        loading: false,
    })
}

pub(crate) fn set_busy(session: &mut SessionState) -> Option<TranscriptUpdate> {
    if session.busy && session.loading {
        return None;
    }
    session.busy = true;
    session.loading = true;
    Some(TranscriptUpdate::Status {
        busy: true,
        loading: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_tags_are_filtered() {
        assert!(is_internal_text("<command-name>/clear</command-name>"));
        assert!(is_internal_text("  <local-command-stdout>ok</local-command-stdout>"));
        assert!(is_internal_text("   "));
        assert!(!is_internal_text("please run <command-name>"));
        assert!(!is_internal_text("hello"));
    }

    #[test]
    fn extend_segment_reuses_matching_block_only() {
        let mut blocks = Vec::new();
        let first = extend_segment(&mut blocks, None, Segment::Text, "He");
        let again = extend_segment(&mut blocks, Some(first), Segment::Text, "y");
        assert_eq!(first, again);

        // A stale index pointing at another block kind opens a new block.
        let thinking = extend_segment(&mut blocks, Some(first), Segment::Thinking, "hmm");
        assert_eq!(thinking, 1);
        assert_eq!(
            blocks,
            vec![
                ContentBlock::Text { text: "Hey".into() },
                ContentBlock::Thinking { text: "hmm".into() },
            ]
        );
    }

    #[test]
    fn usage_patch_keeps_real_numbers() {
        let mut session = SessionState::new();
        let mut message = Message::assistant();
        message.usage = Some(Usage {
            input_tokens: 5,
            ..Usage::default()
        });
        session.push(message);

        patch_usage(
            &mut session,
            Usage {
                input_tokens: 9,
                ..Usage::default()
            },
        );
        assert_eq!(session.messages[0].usage.map(|u| u.input_tokens), Some(5));

        session.messages[0].usage = Some(Usage::default());
        patch_usage(
            &mut session,
            Usage {
                input_tokens: 9,
                ..Usage::default()
            },
        );
        assert_eq!(session.messages[0].usage.map(|u| u.input_tokens), Some(9));
    }
}
