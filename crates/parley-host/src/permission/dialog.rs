//! Dialog surfaces.
//!
//! A surface shows a prompt and eventually answers through a oneshot
//! channel. Dropping the sender without answering counts as a dismissal.
//! [`FallbackDialog`] is the synchronous last resort used when no surface is
//! registered; the broker runs it on the blocking pool.

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use parley_core::permissions::PermissionDecision;

use super::types::{PermissionPrompt, PlanPrompt, PlanVerdict, QuestionOutcome, QuestionPrompt};

/// Shows permission prompts.
pub trait PermissionDialog: Send + Sync {
    fn show(&self, prompt: PermissionPrompt) -> oneshot::Receiver<PermissionDecision>;
}

/// Shows ask-user-question prompts.
pub trait QuestionDialog: Send + Sync {
    fn ask(&self, prompt: QuestionPrompt) -> oneshot::Receiver<QuestionOutcome>;
}

/// Shows plan-approval prompts.
pub trait PlanDialog: Send + Sync {
    fn review(&self, prompt: PlanPrompt) -> oneshot::Receiver<PlanVerdict>;
}

/// Blocking dialog used when no surface is registered.
pub trait FallbackDialog: Send + Sync {
    fn confirm_permission(&self, prompt: &PermissionPrompt) -> PermissionDecision;
    fn answer_questions(&self, prompt: &QuestionPrompt) -> QuestionOutcome;
    fn review_plan(&self, prompt: &PlanPrompt) -> PlanVerdict;
}

/// A prompt forwarded by [`ChannelDialog`], with its reply handle.
#[derive(Debug)]
pub enum DialogRequest {
    Permission {
        prompt: PermissionPrompt,
        reply: oneshot::Sender<PermissionDecision>,
    },
    Question {
        prompt: QuestionPrompt,
        reply: oneshot::Sender<QuestionOutcome>,
    },
    Plan {
        prompt: PlanPrompt,
        reply: oneshot::Sender<PlanVerdict>,
    },
}

/// Surface that forwards every prompt to a UI task over an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelDialog {
    tx: mpsc::UnboundedSender<DialogRequest>,
}

impl ChannelDialog {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DialogRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, request: DialogRequest) {
        // On failure the reply sender is dropped with the request, which the
        // broker reads as a dismissal.
        if self.tx.send(request).is_err() {
            warn!("Dialog surface is gone, prompt dismissed");
        }
    }
}

impl PermissionDialog for ChannelDialog {
    fn show(&self, prompt: PermissionPrompt) -> oneshot::Receiver<PermissionDecision> {
        let (reply, rx) = oneshot::channel();
        self.forward(DialogRequest::Permission { prompt, reply });
        rx
    }
}

impl QuestionDialog for ChannelDialog {
    fn ask(&self, prompt: QuestionPrompt) -> oneshot::Receiver<QuestionOutcome> {
        let (reply, rx) = oneshot::channel();
        self.forward(DialogRequest::Question { prompt, reply });
        rx
    }
}

impl PlanDialog for ChannelDialog {
    fn review(&self, prompt: PlanPrompt) -> oneshot::Receiver<PlanVerdict> {
        let (reply, rx) = oneshot::channel();
        self.forward(DialogRequest::Plan { prompt, reply });
        rx
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn prompt() -> PermissionPrompt {
        PermissionPrompt {
            request_id: "r1".into(),
            tool_name: "Bash".into(),
            inputs: Map::new(),
        }
    }

    #[tokio::test]
    async fn channel_dialog_round_trip() {
        let (dialog, mut rx) = ChannelDialog::new();
        let answer = dialog.show(prompt());

        let Some(DialogRequest::Permission { prompt, reply }) = rx.recv().await else {
            panic!("expected permission prompt");
        };
        assert_eq!(prompt.tool_name, "Bash");
        reply.send(PermissionDecision::AllowAlways).unwrap();

        assert_eq!(answer.await.unwrap(), PermissionDecision::AllowAlways);
    }

    #[tokio::test]
    async fn closed_surface_dismisses() {
        let (dialog, rx) = ChannelDialog::new();
        drop(rx);
        assert!(dialog.show(prompt()).await.is_err());
    }
}
