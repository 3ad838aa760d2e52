//! Assembler for the non-streaming backend.
//!
//! Items arrive complete, so there are no segments to reconcile: text extends
//! the open assistant message and a tool result closes it.

use tracing::debug;

use parley_core::events::{AgentEvent, AssistantEvent, ContentBlock, UserEvent};

use super::{
    Assembler, Segment, capture_session_id, extend_segment, finish_turn, set_busy, set_idle,
    user_message,
};
use crate::session::{Message, MessageKind, SessionState, TranscriptUpdate};

/// Assembler for backends that emit whole items.
#[derive(Debug, Default)]
pub struct SimpleAssembler {
    open: Option<usize>,
    /// Block index that plain content events extend.
    text_block: Option<usize>,
}

impl SimpleAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn close(&mut self) {
        self.open = None;
        self.text_block = None;
    }

    fn ensure_open(&mut self, session: &mut SessionState) -> usize {
        let open = self.open.filter(|&i| {
            session
                .messages
                .get(i)
                .is_some_and(|m| m.kind == MessageKind::Assistant)
        });
        if let Some(index) = open {
            return index;
        }
        self.text_block = None;
        let index = session.push(Message::assistant());
        self.open = Some(index);
        index
    }

    fn on_assistant(
        &mut self,
        session: &mut SessionState,
        event: AssistantEvent,
    ) -> Vec<TranscriptUpdate> {
        let index = self.ensure_open(session);
        let message = &mut session.messages[index];
        if event.id.is_some() {
            message.id = event.id;
        }
        if event.usage.is_some() {
            message.usage = event.usage;
        }
        for block in event.content {
            let duplicate = match &block {
                ContentBlock::ToolUse { id, .. } => message.has_tool_use(id),
                ContentBlock::Text { .. } | ContentBlock::Thinking { .. } => {
                    message.blocks.contains(&block)
                }
                ContentBlock::ToolResult { .. } => false,
            };
            if !duplicate {
                message.blocks.push(block);
            }
            self.text_block = None;
        }
        message.refresh_content();
        vec![TranscriptUpdate::Refresh]
    }

    fn on_content(&mut self, session: &mut SessionState, text: &str) -> Vec<TranscriptUpdate> {
        if text.is_empty() {
            return Vec::new();
        }
        let index = self.ensure_open(session);
        let message = &mut session.messages[index];
        self.text_block = Some(extend_segment(
            &mut message.blocks,
            self.text_block,
            Segment::Text,
            text,
        ));
        message.refresh_content();
        vec![TranscriptUpdate::Refresh]
    }

    fn on_user(&mut self, session: &mut SessionState, event: UserEvent) -> Vec<TranscriptUpdate> {
        let Some(message) = user_message(session, event) else {
            return Vec::new();
        };
        self.close();
        session.push(message);
        vec![TranscriptUpdate::Refresh]
    }
}

impl Assembler for SimpleAssembler {
    fn apply(&mut self, session: &mut SessionState, event: AgentEvent) -> Vec<TranscriptUpdate> {
        match event {
            AgentEvent::Assistant(event) => self.on_assistant(session, event),
            AgentEvent::Content(text) | AgentEvent::ContentDelta(text) => {
                self.on_content(session, &text)
            }
            AgentEvent::User(event) => self.on_user(session, event),
            AgentEvent::ToolResult(result) => self.on_user(
                session,
                UserEvent {
                    content: vec![result.into()],
                    is_meta: false,
                },
            ),
            AgentEvent::SessionId(id) => capture_session_id(session, id),
            AgentEvent::StreamStart => set_busy(session).into_iter().collect(),
            AgentEvent::StreamEnd => {
                self.close();
                let mut updates: Vec<_> = set_idle(session).into_iter().collect();
                updates.push(TranscriptUpdate::Refresh);
                updates
            }
            AgentEvent::Result(result) => {
                self.close();
                finish_turn(session, result)
            }
            other => {
                debug!(kind = other.kind(), "Event not handled by simple assembler");
                Vec::new()
            }
        }
    }

    fn reset(&mut self) {
        self.close();
    }
}
