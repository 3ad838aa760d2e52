//! Assembler for streaming backends.
//!
//! Deltas extend the active text or thinking block of the open assistant
//! message. A tool invocation ends both segments, so text streamed after a
//! tool call lands in a new block. Complete assistant events that repeat
//! streamed text are reconciled against the blocks instead of duplicating
//! them.

use tracing::debug;

use parley_core::events::{AgentEvent, AssistantEvent, ContentBlock, UserEvent};

use super::{
    Assembler, Segment, capture_session_id, extend_segment, finish_turn, set_busy, set_idle,
    user_message,
};
use crate::session::{Message, MessageKind, SessionState, TranscriptUpdate};

/// Full assembler with segment tracking.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    /// Between `stream_start` and the end of the turn.
    streaming: bool,
    /// Index of the open assistant message.
    open: Option<usize>,
    /// Block index of the active text segment.
    text_block: Option<usize>,
    /// Block index of the active thinking segment.
    thinking_block: Option<usize>,
    /// Text deltas of the open message, in arrival order.
    accumulator: String,
    thinking_accumulator: String,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Every text delta received for the open message.
    pub fn accumulated_text(&self) -> &str {
        &self.accumulator
    }

    pub fn accumulated_thinking(&self) -> &str {
        &self.thinking_accumulator
    }

    fn close(&mut self) {
        self.open = None;
        self.text_block = None;
        self.thinking_block = None;
    }

    fn open_message(&mut self, session: &mut SessionState) -> usize {
        self.close();
        self.accumulator.clear();
        self.thinking_accumulator.clear();
        let index = session.push(Message::assistant());
        self.open = Some(index);
        index
    }

    fn open_index(&self, session: &SessionState) -> Option<usize> {
        self.open.filter(|&i| {
            session
                .messages
                .get(i)
                .is_some_and(|m| m.kind == MessageKind::Assistant)
        })
    }

    fn ensure_open(&mut self, session: &mut SessionState) -> usize {
        match self.open_index(session) {
            Some(index) => index,
            None => self.open_message(session),
        }
    }

    fn refresh(&self) -> Vec<TranscriptUpdate> {
        if self.streaming {
            Vec::new()
        } else {
            vec![TranscriptUpdate::Refresh]
        }
    }

    fn on_stream_start(&mut self, session: &mut SessionState) -> Vec<TranscriptUpdate> {
        self.streaming = true;
        self.open_message(session);
        let mut updates = vec![TranscriptUpdate::StreamStarted];
        updates.extend(set_busy(session));
        updates
    }

    fn on_delta(
        &mut self,
        session: &mut SessionState,
        segment: Segment,
        delta: String,
    ) -> Vec<TranscriptUpdate> {
        if delta.is_empty() {
            return Vec::new();
        }
        let index = self.ensure_open(session);
        let message = &mut session.messages[index];

        let (own, other, accumulator) = match segment {
            Segment::Text => (
                &mut self.text_block,
                &mut self.thinking_block,
                &mut self.accumulator,
            ),
            Segment::Thinking => (
                &mut self.thinking_block,
                &mut self.text_block,
                &mut self.thinking_accumulator,
            ),
        };
        *own = Some(extend_segment(&mut message.blocks, *own, segment, &delta));
        *other = None;
        accumulator.push_str(&delta);
        message.refresh_content();

        if !self.streaming {
            return vec![TranscriptUpdate::Refresh];
        }
        match segment {
            Segment::Text => vec![TranscriptUpdate::ContentDelta { text: delta }],
            Segment::Thinking => vec![TranscriptUpdate::ThinkingDelta { text: delta }],
        }
    }

    fn on_complete_text(
        &mut self,
        session: &mut SessionState,
        segment: Segment,
        text: String,
    ) -> Vec<TranscriptUpdate> {
        if self.streaming {
            debug!(?segment, "Ignoring complete text during stream");
            return Vec::new();
        }
        self.on_delta(session, segment, text)
    }

    fn on_assistant(
        &mut self,
        session: &mut SessionState,
        event: AssistantEvent,
    ) -> Vec<TranscriptUpdate> {
        let index = if self.streaming {
            self.ensure_open(session)
        } else {
            // Without a stream, a new provider message id starts a new message.
            match self.open_index(session) {
                Some(i) if same_message(session.messages[i].id.as_deref(), event.id.as_deref()) => i,
                _ => self.open_message(session),
            }
        };
        let message = &mut session.messages[index];

        if event.id.is_some() {
            message.id = event.id;
        }
        if let Some(usage) = event.usage {
            if !usage.is_zero() || message.usage.is_none() {
                message.usage = Some(usage);
            }
        }

        for block in event.content {
            let duplicate = match &block {
                // Already delivered by the active delta segment.
                ContentBlock::Text { .. } if self.streaming && self.text_block.is_some() => true,
                ContentBlock::Thinking { .. } if self.streaming && self.thinking_block.is_some() => {
                    true
                }
                ContentBlock::Text { .. } | ContentBlock::Thinking { .. } => {
                    message.blocks.contains(&block)
                }
                ContentBlock::ToolUse { id, .. } => {
                    self.text_block = None;
                    self.thinking_block = None;
                    message.has_tool_use(id)
                }
                ContentBlock::ToolResult { .. } => false,
            };
            if !duplicate {
                message.blocks.push(block);
            }
        }

        if !self.streaming {
            self.accumulator = collect_text(&message.blocks, Segment::Text);
            self.thinking_accumulator = collect_text(&message.blocks, Segment::Thinking);
        }
        message.refresh_content();
        self.refresh()
    }

    fn on_user(&mut self, session: &mut SessionState, event: UserEvent) -> Vec<TranscriptUpdate> {
        let Some(message) = user_message(session, event) else {
            return Vec::new();
        };
        self.close();
        session.push(message);
        self.refresh()
    }

    fn on_stream_end(&mut self, session: &mut SessionState) -> Vec<TranscriptUpdate> {
        self.close();
        self.streaming = false;
        let mut updates = vec![TranscriptUpdate::StreamEnded];
        updates.extend(set_idle(session));
        updates.push(TranscriptUpdate::Refresh);
        updates
    }
}

fn same_message(open_id: Option<&str>, event_id: Option<&str>) -> bool {
    match (open_id, event_id) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn collect_text(blocks: &[ContentBlock], segment: Segment) -> String {
    blocks
        .iter()
        .filter_map(|b| match (segment, b) {
            (Segment::Text, ContentBlock::Text { text })
            | (Segment::Thinking, ContentBlock::Thinking { text }) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

impl Assembler for StreamAssembler {
    fn apply(&mut self, session: &mut SessionState, event: AgentEvent) -> Vec<TranscriptUpdate> {
        match event {
            AgentEvent::StreamStart => self.on_stream_start(session),
            AgentEvent::ContentDelta(delta) => self.on_delta(session, Segment::Text, delta),
            AgentEvent::ThinkingDelta(delta) => self.on_delta(session, Segment::Thinking, delta),
            AgentEvent::Content(text) => self.on_complete_text(session, Segment::Text, text),
            AgentEvent::Thinking(text) => self.on_complete_text(session, Segment::Thinking, text),
            AgentEvent::Assistant(event) => self.on_assistant(session, event),
            AgentEvent::User(event) => self.on_user(session, event),
            AgentEvent::ToolResult(result) => self.on_user(
                session,
                UserEvent {
                    content: vec![result.into()],
                    is_meta: false,
                },
            ),
            AgentEvent::MessageEnd => {
                self.close();
                self.refresh()
            }
            AgentEvent::StreamEnd => self.on_stream_end(session),
            AgentEvent::Result(result) => {
                self.close();
                self.streaming = false;
                finish_turn(session, result)
            }
            AgentEvent::SessionId(id) => capture_session_id(session, id),
            AgentEvent::System(system) => match system.session_id {
                Some(id) if system.subtype == "init" => capture_session_id(session, id),
                _ => Vec::new(),
            },
            AgentEvent::SlashCommands(commands) => {
                session.slash_commands = commands;
                vec![TranscriptUpdate::SlashCommands]
            }
            AgentEvent::Unknown { kind, .. } => {
                debug!(kind, "Ignoring unknown event");
                Vec::new()
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
