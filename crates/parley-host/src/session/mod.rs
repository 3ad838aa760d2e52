//! Session state and update fan-out.
//!
//! A [`SessionHandle`] owns one conversation: its state, the assembler for
//! its backend, and a broadcast channel of [`TranscriptUpdate`]s for the
//! UI. It also observes the permission broker so open dialogs show up in the
//! session, and clears the broker's decision memory when the session resets.

mod state;
mod types;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use parley_core::events::{AgentEvent, Backend};
use parley_core::permissions::PermissionDecision;

use crate::assembler::{self, Assembler};
use crate::permission::{DecisionMemory, DecisionObserver, PermissionPrompt};

pub use state::{Message, MessageKind, SessionState};
pub use types::{TranscriptUpdate, UPDATE_CHANNEL_CAPACITY};

struct Inner {
    state: SessionState,
    assembler: Box<dyn Assembler>,
}

/// Shared handle to one conversation.
#[derive(Clone)]
pub struct SessionHandle {
    backend: Backend,
    inner: Arc<Mutex<Inner>>,
    updates: broadcast::Sender<TranscriptUpdate>,
    memory: Option<Arc<DecisionMemory>>,
}

impl SessionHandle {
    pub fn new(backend: Backend) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            backend,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::new(),
                assembler: assembler::for_backend(backend),
            })),
            updates,
            memory: None,
        }
    }

    /// Forget remembered permission decisions whenever this session resets.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<DecisionMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub const fn backend(&self) -> Backend {
        self.backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, updates: &[TranscriptUpdate]) {
        for update in updates {
            // No subscribers is fine.
            let _ = self.updates.send(update.clone());
        }
    }

    /// Subscribe to transcript updates.
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptUpdate> {
        self.updates.subscribe()
    }

    /// Apply one event and publish what changed.
    pub fn apply(&self, event: AgentEvent) -> Vec<TranscriptUpdate> {
        let updates = {
            let mut inner = self.lock();
            let Inner { state, assembler } = &mut *inner;
            assembler.apply(state, event)
        };
        self.publish(&updates);
        updates
    }

    /// Parse one backend output line and apply its events.
    pub fn feed_line(&self, line: &str) -> parley_core::Result<Vec<TranscriptUpdate>> {
        let mut updates = Vec::new();
        for event in self.backend.parse_line(line)? {
            updates.extend(self.apply(event));
        }
        Ok(updates)
    }

    /// Record a prompt the user sent.
    pub fn push_prompt(&self, text: &str) {
        self.lock().state.push_prompt(text);
        self.publish(&[
            TranscriptUpdate::Refresh,
            TranscriptUpdate::Status {
                busy: true,
                loading: true,
            },
        ]);
    }

    /// Start a fresh conversation. Remembered "always" decisions end with
    /// the old one.
    pub async fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.state.clear();
            inner.assembler.reset();
        }
        if let Some(memory) = &self.memory {
            memory.clear().await;
            debug!("Cleared decision memory");
        }
        self.publish(&[TranscriptUpdate::Refresh]);
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.lock().state.clone()
    }
}

impl DecisionObserver for SessionHandle {
    fn on_prompt(&self, prompt: &PermissionPrompt) {
        let status = {
            let mut inner = self.lock();
            inner.state.permission_prompted(&prompt.tool_name);
            TranscriptUpdate::Status {
                busy: inner.state.busy,
                loading: inner.state.loading,
            }
        };
        self.publish(&[status]);
    }

    fn on_decision(&self, prompt: &PermissionPrompt, decision: PermissionDecision) {
        debug!(tool_name = %prompt.tool_name, ?decision, "Permission dialog closed");
        let status = {
            let mut inner = self.lock();
            inner.state.permission_resolved();
            TranscriptUpdate::Status {
                busy: inner.state.busy,
                loading: inner.state.loading,
            }
        };
        self.publish(&[status]);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn updates_reach_subscribers() {
        let session = SessionHandle::new(Backend::Native);
        let mut rx = session.subscribe();

        session
            .feed_line(r#"{"type":"stream_start"}"#)
            .unwrap();
        session
            .feed_line(r#"{"type":"content_delta","text":"hi"}"#)
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), TranscriptUpdate::StreamStarted);
        assert!(matches!(
            rx.recv().await.unwrap(),
            TranscriptUpdate::Status { busy: true, .. }
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            TranscriptUpdate::ContentDelta { text: "hi".into() }
        );
        assert_eq!(session.snapshot().messages[0].content, "hi");
    }

    #[test]
    fn observer_tracks_open_dialog() {
        let session = SessionHandle::new(Backend::Claude);
        session.push_prompt("run tests");
        let prompt = PermissionPrompt {
            request_id: "r1".into(),
            tool_name: "Bash".into(),
            inputs: Map::new(),
        };

        session.on_prompt(&prompt);
        assert_eq!(
            session.snapshot().awaiting_permission.as_deref(),
            Some("Bash")
        );
        session.on_decision(&prompt, PermissionDecision::Allow);
        let state = session.snapshot();
        assert!(state.awaiting_permission.is_none());
        assert!(state.loading);
    }

    #[tokio::test]
    async fn clear_resets_transcript() {
        let session = SessionHandle::new(Backend::Native);
        session
            .feed_line(r#"{"type":"content","text":"old"}"#)
            .unwrap();
        session.clear().await;
        session
            .feed_line(r#"{"type":"content","text":"new"}"#)
            .unwrap();
        let state = session.snapshot();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "new");
    }

    #[tokio::test]
    async fn clear_forgets_remembered_decisions() {
        let memory = Arc::new(DecisionMemory::new());
        memory.remember_tool("Bash", true).await;
        let session = SessionHandle::new(Backend::Claude).with_memory(Arc::clone(&memory));

        session.clear().await;
        assert!(memory.lookup("Bash", &Map::new()).await.is_none());
    }
}
