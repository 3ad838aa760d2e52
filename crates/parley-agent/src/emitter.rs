//! Request emitter.
//!
//! Turns agent-side questions into protocol requests and maps every failure
//! to the fail-closed answer: deny, not approved, or no answers.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use parley_core::config::TimeoutConfig;
use parley_core::exchange::{
    Answers, PermissionRequestRecord, PlanRequestRecord, PlanResponseRecord, Question,
    QuestionRequestRecord, now_millis,
};
use parley_core::frame::{RequestFrame, ResponseFrame};

use crate::channel::RequestChannel;
use crate::error::EmitterError;
use crate::guard::{PathGuard, Rewrite};

/// Tool name recorded on ask-user-question requests.
pub const QUESTION_TOOL_NAME: &str = "AskUserQuestion";

/// Verdict on a permission request, with the inputs that were sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionOutcome {
    pub allow: bool,
    pub inputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rewritten: Vec<Rewrite>,
}

/// Sends requests to the host over a [`RequestChannel`].
#[derive(Debug, Clone)]
pub struct RequestEmitter<C> {
    channel: C,
    guard: PathGuard,
    timeouts: TimeoutConfig,
}

impl<C: RequestChannel> RequestEmitter<C> {
    pub const fn new(channel: C, guard: PathGuard, timeouts: TimeoutConfig) -> Self {
        Self {
            channel,
            guard,
            timeouts,
        }
    }

    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Ask whether `tool_name` may run with `inputs`.
    pub async fn request_permission(&self, tool_name: &str, inputs: Map<String, Value>) -> bool {
        self.request_permission_with_inputs(tool_name, inputs)
            .await
            .allow
    }

    /// Like [`Self::request_permission`], also returning the inputs after
    /// temp-path rewriting so the caller runs the tool on what was approved.
    pub async fn request_permission_with_inputs(
        &self,
        tool_name: &str,
        mut inputs: Map<String, Value>,
    ) -> PermissionOutcome {
        if let Some(path) = self.guard.denied_path(&inputs) {
            warn!(tool_name, path = %path, "Denied system path without asking");
            return PermissionOutcome {
                allow: false,
                inputs,
                rewritten: Vec::new(),
            };
        }
        let rewritten = self.guard.rewrite(&mut inputs);
        if let Some(path) = self.guard.denied_path(&inputs) {
            warn!(tool_name, path = %path, "Rewritten input lands on a system path, denying");
            return PermissionOutcome {
                allow: false,
                inputs,
                rewritten,
            };
        }

        let request = RequestFrame::Permission(PermissionRequestRecord {
            request_id: new_request_id(),
            tool_name: tool_name.to_string(),
            inputs: inputs.clone(),
            timestamp: now_millis(),
        });
        let allow = match self.send(request).await {
            Ok(ResponseFrame::Permission(response)) => response.allow,
            Ok(_) => false,
            Err(e) => {
                warn!(tool_name, error = %e, "Permission request failed, denying");
                false
            }
        };
        info!(tool_name, allow, "Permission answered");
        PermissionOutcome {
            allow,
            inputs,
            rewritten,
        }
    }

    /// Ask the user to approve a plan. `inputs` carries `plan` and
    /// `allowedPrompts` as the agent's plan tool provides them.
    pub async fn request_plan_approval(&self, inputs: &Map<String, Value>) -> PlanResponseRecord {
        let request = RequestFrame::Plan(PlanRequestRecord {
            request_id: new_request_id(),
            allowed_prompts: inputs
                .get("allowedPrompts")
                .or_else(|| inputs.get("allowed_prompts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            plan: inputs.get("plan").and_then(Value::as_str).map(String::from),
            timestamp: now_millis(),
        });
        match self.send(request).await {
            Ok(ResponseFrame::Plan(verdict)) => {
                info!(approved = verdict.approved, target_mode = %verdict.target_mode, "Plan answered");
                verdict
            }
            Ok(_) => PlanResponseRecord::rejected(),
            Err(e) => {
                warn!(error = %e, "Plan approval failed, rejecting");
                PlanResponseRecord::rejected()
            }
        }
    }

    /// Ask the user to answer `questions`. `None` when nothing was answered.
    pub async fn request_user_answers(&self, questions: Vec<Question>) -> Option<Answers> {
        let request = RequestFrame::Question(QuestionRequestRecord {
            request_id: new_request_id(),
            tool_name: QUESTION_TOOL_NAME.to_string(),
            questions,
            timestamp: now_millis(),
        });
        match self.send(request).await {
            Ok(ResponseFrame::Question(response)) if !response.answers.is_empty() => {
                Some(response.answers)
            }
            Ok(_) => {
                debug!("Questions left unanswered");
                None
            }
            Err(e) => {
                warn!(error = %e, "Question request failed");
                None
            }
        }
    }

    async fn send(&self, request: RequestFrame) -> Result<ResponseFrame, EmitterError> {
        let kind = request.kind();
        let timeout = self.timeouts.emitter_timeout(kind);
        let response = self.channel.round_trip(request, timeout).await?;
        if response.kind() != kind {
            return Err(EmitterError::Mismatch {
                expected: kind.as_str(),
                got: response.kind().as_str(),
            });
        }
        Ok(response)
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use parley_core::config::PermissionConfig;
    use parley_core::exchange::{
        Answer, PermissionResponseRecord, QuestionResponseRecord,
    };
    use serde_json::json;

    /// Answers every request with a fixed result and records what it saw.
    #[derive(Clone)]
    struct Scripted {
        reply: Arc<dyn Fn() -> Result<ResponseFrame, EmitterError> + Send + Sync>,
        seen: Arc<Mutex<Vec<(RequestFrame, Duration)>>>,
    }

    impl Scripted {
        fn new(reply: impl Fn() -> Result<ResponseFrame, EmitterError> + Send + Sync + 'static) -> Self {
            Self {
                reply: Arc::new(reply),
                seen: Arc::default(),
            }
        }

        fn seen(&self) -> Vec<(RequestFrame, Duration)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl RequestChannel for Scripted {
        async fn round_trip(
            &self,
            request: RequestFrame,
            timeout: Duration,
        ) -> Result<ResponseFrame, EmitterError> {
            self.seen.lock().unwrap().push((request, timeout));
            (self.reply)()
        }
    }

    fn emitter(channel: Scripted) -> RequestEmitter<Scripted> {
        RequestEmitter::new(
            channel,
            PathGuard::from_config(&PermissionConfig::default(), Some(Path::new("/work/app"))),
            TimeoutConfig::default(),
        )
    }

    fn allow() -> Result<ResponseFrame, EmitterError> {
        Ok(ResponseFrame::Permission(PermissionResponseRecord { allow: true }))
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn denied_path_never_leaves_the_agent() {
        let channel = Scripted::new(allow);
        let emitter = emitter(channel.clone());
        let allowed = emitter
            .request_permission("Write", inputs(json!({"file_path": "/usr/bin/ls"})))
            .await;
        assert!(!allowed);
        assert!(channel.seen().is_empty());
    }

    #[tokio::test]
    async fn parent_segments_are_denied_locally() {
        let channel = Scripted::new(allow);
        let emitter = emitter(channel.clone());
        for path in ["/home/../etc/passwd", "/tmp/../etc/passwd"] {
            let outcome = emitter
                .request_permission_with_inputs("Write", inputs(json!({"file_path": path})))
                .await;
            assert!(!outcome.allow, "{path} should be denied");
            assert!(outcome.rewritten.is_empty());
        }
        assert!(channel.seen().is_empty());
    }

    #[tokio::test]
    async fn rewritten_inputs_are_sent() {
        let channel = Scripted::new(allow);
        let emitter = emitter(channel.clone());
        let outcome = emitter
            .request_permission_with_inputs("Write", inputs(json!({"file_path": "/tmp/notes.md"})))
            .await;

        assert!(outcome.allow);
        assert_eq!(outcome.inputs["file_path"], "/work/app/notes.md");
        assert_eq!(outcome.rewritten.len(), 1);
        let seen = channel.seen();
        let RequestFrame::Permission(sent) = &seen[0].0 else {
            panic!("expected a permission request");
        };
        assert_eq!(sent.inputs["file_path"], "/work/app/notes.md");
        assert_eq!(seen[0].1, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn failures_fail_closed() {
        let timeout = Scripted::new(|| Err(EmitterError::Timeout(Duration::from_secs(60))));
        let emitter = emitter(timeout);
        assert!(!emitter.request_permission("Bash", Map::new()).await);
        assert_eq!(
            emitter.request_plan_approval(&Map::new()).await,
            PlanResponseRecord::rejected()
        );
        assert!(emitter.request_user_answers(Vec::new()).await.is_none());
    }

    #[tokio::test]
    async fn mismatched_response_denies() {
        let emitter = emitter(Scripted::new(|| {
            Ok(ResponseFrame::Plan(PlanResponseRecord {
                approved: true,
                target_mode: "acceptEdits".into(),
            }))
        }));
        assert!(!emitter.request_permission("Bash", Map::new()).await);
    }

    #[tokio::test]
    async fn empty_answers_mean_none() {
        let emitter = emitter(Scripted::new(|| {
            Ok(ResponseFrame::Question(QuestionResponseRecord::default()))
        }));
        assert!(emitter.request_user_answers(Vec::new()).await.is_none());
    }

    #[tokio::test]
    async fn answers_pass_through() {
        let emitter = emitter(Scripted::new(|| {
            let mut answers = Answers::new();
            answers.insert("Which db?".into(), Answer::Single("sqlite".into()));
            Ok(ResponseFrame::Question(QuestionResponseRecord { answers }))
        }));
        let answers = emitter.request_user_answers(Vec::new()).await.unwrap();
        assert_eq!(answers["Which db?"], Answer::Single("sqlite".into()));
    }

    #[tokio::test]
    async fn plan_request_carries_plan_and_long_timeout() {
        let channel = Scripted::new(|| {
            Ok(ResponseFrame::Plan(PlanResponseRecord {
                approved: true,
                target_mode: "acceptEdits".into(),
            }))
        });
        let emitter = emitter(channel.clone());
        let verdict = emitter
            .request_plan_approval(&inputs(json!({
                "plan": "1. add tests",
                "allowedPrompts": [{"tool": "Bash", "prompt": "run tests"}],
            })))
            .await;

        assert!(verdict.approved);
        let seen = channel.seen();
        let RequestFrame::Plan(sent) = &seen[0].0 else {
            panic!("expected a plan request");
        };
        assert_eq!(sent.plan.as_deref(), Some("1. add tests"));
        assert_eq!(sent.allowed_prompts.len(), 1);
        assert_eq!(seen[0].1, Duration::from_secs(300));
    }
}
