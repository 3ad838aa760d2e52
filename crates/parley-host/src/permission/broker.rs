//! Host-side permission broker.
//!
//! Watches the exchange directory for request records and answers each one
//! exactly once: from decision memory, from the global mode, or from a dialog
//! shown on the surface that owns the request. Dialogs are awaited on
//! spawned tasks so the poll loop never blocks on a human.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parley_core::exchange::{
    Answers, ExchangeDir, ExchangeFile, PermissionRequestRecord, PermissionResponseRecord,
    PlanRequestRecord, QuestionRequestRecord, QuestionResponseRecord, RequestKind,
};
use parley_core::frame::ResponseFrame;
use parley_core::permissions::{PermissionDecision, PermissionMode};

use super::dialog::{FallbackDialog, PermissionDialog, PlanDialog, QuestionDialog};
use super::memory::DecisionMemory;
use super::pending::{PendingManager, PendingRequest, PendingRequestParams, Transport};
use super::router::DialogRouter;
use super::types::{BrokerConfig, BrokerError, PermissionPrompt, PlanPrompt, PlanVerdict, QuestionPrompt};

/// Notified when a permission dialog opens and when it resolves.
pub trait DecisionObserver: Send + Sync {
    fn on_prompt(&self, prompt: &PermissionPrompt);
    fn on_decision(&self, prompt: &PermissionPrompt, decision: PermissionDecision);
}

/// How a dialog wait ended.
enum DialogVerdict<T> {
    Answered(T),
    Dismissed,
    TimedOut,
    Cancelled,
}

/// Marks a request file as in flight until dropped.
struct ProcessingGuard {
    set: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl ProcessingGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, name: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            name: name.to_string(),
        })
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Resolves agent requests arriving through the exchange directory or the
/// socket listener.
pub struct PermissionBroker {
    exchange: ExchangeDir,
    config: BrokerConfig,
    mode: RwLock<PermissionMode>,
    memory: Arc<DecisionMemory>,
    permission_dialogs: RwLock<DialogRouter<dyn PermissionDialog>>,
    question_dialogs: RwLock<DialogRouter<dyn QuestionDialog>>,
    plan_dialogs: RwLock<DialogRouter<dyn PlanDialog>>,
    fallback: Option<Arc<dyn FallbackDialog>>,
    observer: Option<Arc<dyn DecisionObserver>>,
    processing: Arc<Mutex<HashSet<String>>>,
    pending: PendingManager,
}

impl PermissionBroker {
    pub fn new(config: BrokerConfig, exchange: ExchangeDir) -> Self {
        Self {
            exchange,
            mode: RwLock::new(config.mode),
            config,
            memory: Arc::new(DecisionMemory::new()),
            permission_dialogs: RwLock::new(DialogRouter::new()),
            question_dialogs: RwLock::new(DialogRouter::new()),
            plan_dialogs: RwLock::new(DialogRouter::new()),
            fallback: None,
            observer: None,
            processing: Arc::new(Mutex::new(HashSet::new())),
            pending: PendingManager::new(),
        }
    }

    /// Use a blocking dialog when no surface is registered.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackDialog>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Report dialog activity to an observer such as the session state.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub const fn exchange(&self) -> &ExchangeDir {
        &self.exchange
    }

    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn memory(&self) -> &DecisionMemory {
        &self.memory
    }

    /// Handle to the decision memory, for whoever ends the session.
    pub fn shared_memory(&self) -> Arc<DecisionMemory> {
        Arc::clone(&self.memory)
    }

    pub async fn mode(&self) -> PermissionMode {
        *self.mode.read().await
    }

    pub async fn set_mode(&self, mode: PermissionMode) {
        let previous = std::mem::replace(&mut *self.mode.write().await, mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "Permission mode changed");
        }
    }

    pub async fn register_permission_dialog(&self, root: &str, dialog: Arc<dyn PermissionDialog>) {
        self.permission_dialogs.write().await.register(root, dialog);
    }

    pub async fn register_question_dialog(&self, root: &str, dialog: Arc<dyn QuestionDialog>) {
        self.question_dialogs.write().await.register(root, dialog);
    }

    pub async fn register_plan_dialog(&self, root: &str, dialog: Arc<dyn PlanDialog>) {
        self.plan_dialogs.write().await.register(root, dialog);
    }

    /// Remove every surface registered for a workspace root.
    pub async fn unregister_workspace(&self, root: &str) -> bool {
        let permission = self.permission_dialogs.write().await.unregister(root);
        let question = self.question_dialogs.write().await.unregister(root);
        let plan = self.plan_dialogs.write().await.unregister(root);
        permission || question || plan
    }

    /// Mark a workspace as the one the user last interacted with.
    pub async fn mark_active(&self, root: &str) {
        self.permission_dialogs.write().await.mark_active(root);
        self.question_dialogs.write().await.mark_active(root);
        self.plan_dialogs.write().await.mark_active(root);
    }

    /// Number of requests with an open dialog.
    pub async fn pending_count(&self) -> usize {
        self.pending.count().await
    }

    /// Sweep stale records, then poll the exchange directory until shutdown.
    ///
    /// Pending requests are cancelled (answered fail-closed) on the way out.
    pub async fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        match self.exchange.sweep_stale().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed stale exchange records"),
            Err(e) => warn!(error = %e, "Failed to sweep stale exchange records"),
        }
        info!(
            dir = %self.exchange.path().display(),
            interval_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Permission broker started"
        );

        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(broker.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = broker.poll_once().await {
                            warn!(error = %e, "Exchange poll failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            let cancelled = broker.cancel_all_pending_requests().await;
            info!(cancelled, "Permission broker stopped");
        })
    }

    /// Scan the exchange directory once and dispatch every new request.
    ///
    /// Returns the number of requests dispatched.
    pub async fn poll_once(self: &Arc<Self>) -> Result<usize, BrokerError> {
        for expired in self.pending.cleanup_expired().await {
            if expired.transport == Transport::File {
                self.respond_fail_closed(&expired).await;
            }
        }

        let mut dispatched = 0;
        for (name, file) in self.exchange.pending_requests().await? {
            let Some(guard) = ProcessingGuard::acquire(&self.processing, &name) else {
                continue;
            };
            dispatched += 1;
            self.dispatch(guard, file).await;
        }
        Ok(dispatched)
    }

    /// Answer every pending request fail-closed and stop its dialog task.
    pub async fn cancel_all_pending_requests(&self) -> usize {
        let cancelled = self.pending.drain().await;
        for request in &cancelled {
            if request.transport == Transport::File {
                self.respond_fail_closed(request).await;
            }
        }
        cancelled.len()
    }

    async fn dispatch(self: &Arc<Self>, guard: ProcessingGuard, file: ExchangeFile) {
        match file.kind {
            RequestKind::Permission => self.handle_permission_file(guard, file.id).await,
            RequestKind::Question => self.handle_question_file(guard, file.id).await,
            RequestKind::Plan => self.handle_plan_file(guard, file.id).await,
        }
    }

    async fn handle_permission_file(self: &Arc<Self>, guard: ProcessingGuard, id: String) {
        let Some(mut record) = self.claim::<PermissionRequestRecord>(&guard.name).await else {
            return;
        };
        reconcile_id(&mut record.request_id, &id);

        if let Some(allow) = self
            .quick_permission(&record.tool_name, &record.inputs)
            .await
        {
            self.respond(&id, ResponseFrame::Permission(PermissionResponseRecord { allow }))
                .await;
            return;
        }

        let broker = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(decision) = broker.ask_permission(record.into(), Transport::File).await {
                let allow = decision.is_allow();
                broker
                    .respond(&id, ResponseFrame::Permission(PermissionResponseRecord { allow }))
                    .await;
            }
            drop(guard);
        });
    }

    async fn handle_question_file(self: &Arc<Self>, guard: ProcessingGuard, id: String) {
        let Some(mut record) = self.claim::<QuestionRequestRecord>(&guard.name).await else {
            return;
        };
        reconcile_id(&mut record.request_id, &id);

        let broker = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(answers) = broker.resolve_questions(record, Transport::File).await {
                broker
                    .respond(&id, ResponseFrame::Question(QuestionResponseRecord { answers }))
                    .await;
            }
            drop(guard);
        });
    }

    async fn handle_plan_file(self: &Arc<Self>, guard: ProcessingGuard, id: String) {
        let Some(mut record) = self.claim::<PlanRequestRecord>(&guard.name).await else {
            return;
        };
        reconcile_id(&mut record.request_id, &id);

        let broker = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(verdict) = broker.resolve_plan(record, Transport::File).await {
                broker.respond(&id, ResponseFrame::Plan(verdict.into())).await;
            }
            drop(guard);
        });
    }

    /// Read a request record and delete its file.
    ///
    /// Only the caller whose delete succeeds gets the record, so a request is
    /// never answered twice even if two pollers race.
    async fn claim<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let record = match self.exchange.read_record::<T>(name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(file = name, "Request already handled");
                return None;
            }
            Err(e) => {
                warn!(file = name, error = %e, "Dropping malformed request");
                if let Err(e) = self.exchange.remove(name).await {
                    warn!(file = name, error = %e, "Failed to delete malformed request");
                }
                return None;
            }
        };

        match self.exchange.remove(name).await {
            Ok(true) => Some(record),
            Ok(false) => {
                debug!(file = name, "Request claimed elsewhere");
                None
            }
            Err(e) => {
                error!(file = name, error = %e, "Failed to delete request file");
                None
            }
        }
    }

    async fn respond(&self, id: &str, frame: ResponseFrame) {
        let kind = frame.kind();
        if let Err(e) = frame.write_to(&self.exchange, id).await {
            // The agent times out and fails closed.
            error!(
                request_id = id,
                kind = %kind.as_str(),
                error = %e,
                "Failed to write response"
            );
        } else {
            debug!(request_id = id, kind = %kind.as_str(), "Response written");
        }
    }

    async fn respond_fail_closed(&self, request: &PendingRequest) {
        self.respond(&request.request_id, ResponseFrame::fail_closed(request.kind))
            .await;
    }

    /// Answer from decision memory or the global mode, without a dialog.
    async fn quick_permission(&self, tool_name: &str, inputs: &Map<String, Value>) -> Option<bool> {
        if let Some(hit) = self.memory.lookup(tool_name, inputs).await {
            debug!(tool_name, allow = hit.allow, scope = ?hit.scope, "Decision memory hit");
            return Some(hit.allow);
        }
        let mode = self.mode().await;
        let allow = mode.resolve(tool_name)?;
        debug!(tool_name, allow, mode = %mode, "Resolved by permission mode");
        Some(allow)
    }

    /// Resolve a permission request end to end.
    ///
    /// Returns `None` when the request was cancelled or expired, in which
    /// case the canceller already answered it.
    pub async fn resolve_permission(
        self: &Arc<Self>,
        record: PermissionRequestRecord,
        transport: Transport,
    ) -> Option<PermissionDecision> {
        if let Some(allow) = self
            .quick_permission(&record.tool_name, &record.inputs)
            .await
        {
            return Some(PermissionDecision::from_allow(allow));
        }
        self.ask_permission(record.into(), transport).await
    }

    async fn ask_permission(
        self: &Arc<Self>,
        prompt: PermissionPrompt,
        transport: Transport,
    ) -> Option<PermissionDecision> {
        let kind = RequestKind::Permission;
        let timeout = self.config.timeouts.dialog_timeout(kind);
        let cancelled = self
            .track(&prompt.request_id, kind, &prompt.tool_name, transport, timeout)
            .await;
        if let Some(observer) = &self.observer {
            observer.on_prompt(&prompt);
        }

        let surface = self.permission_dialogs.read().await.route(&prompt.inputs);
        let reply = match (surface, &self.fallback) {
            (Some(surface), _) => surface.show(prompt.clone()),
            (None, Some(fallback)) => {
                let shown = prompt.clone();
                run_fallback(Arc::clone(fallback), move |f| f.confirm_permission(&shown))
            }
            (None, None) => {
                warn!(tool_name = %prompt.tool_name, "No dialog surface registered, denying");
                ready(PermissionDecision::Deny)
            }
        };

        let verdict = await_dialog(reply, timeout, cancelled).await;
        let decision = match verdict {
            DialogVerdict::Answered(decision) => decision,
            DialogVerdict::Dismissed => {
                warn!(request_id = %prompt.request_id, "Permission dialog failed, denying");
                PermissionDecision::Deny
            }
            DialogVerdict::TimedOut => {
                warn!(request_id = %prompt.request_id, "Permission dialog timed out, denying");
                PermissionDecision::Deny
            }
            DialogVerdict::Cancelled => {
                debug!(request_id = %prompt.request_id, "Permission dialog cancelled");
                self.notify_decision(&prompt, PermissionDecision::Deny);
                return None;
            }
        };

        self.pending.take(kind, &prompt.request_id).await?;
        if decision == PermissionDecision::AllowAlways {
            self.memory.remember_tool(&prompt.tool_name, true).await;
        }
        self.notify_decision(&prompt, decision);
        info!(
            request_id = %prompt.request_id,
            tool_name = %prompt.tool_name,
            decision = ?decision,
            "Permission resolved"
        );
        Some(decision)
    }

    fn notify_decision(&self, prompt: &PermissionPrompt, decision: PermissionDecision) {
        if let Some(observer) = &self.observer {
            observer.on_decision(prompt, decision);
        }
    }

    /// Resolve an ask-user-question request end to end.
    ///
    /// A dismissed, failed or timed-out dialog yields empty answers. Returns
    /// `None` when the request was cancelled or expired.
    pub async fn resolve_questions(
        self: &Arc<Self>,
        record: QuestionRequestRecord,
        transport: Transport,
    ) -> Option<Answers> {
        let kind = RequestKind::Question;
        let prompt = QuestionPrompt::from(record);
        let timeout = self.config.timeouts.dialog_timeout(kind);
        let cancelled = self
            .track(&prompt.request_id, kind, &prompt.tool_name, transport, timeout)
            .await;

        let surface = self.question_dialogs.read().await.route_path(None);
        let reply = match (surface, &self.fallback) {
            (Some(surface), _) => surface.ask(prompt.clone()),
            (None, Some(fallback)) => {
                let shown = prompt.clone();
                run_fallback(Arc::clone(fallback), move |f| f.answer_questions(&shown))
            }
            (None, None) => {
                warn!("No question surface registered, answering nothing");
                ready(None)
            }
        };

        let answers = match await_dialog(reply, timeout, cancelled).await {
            DialogVerdict::Answered(answers) => answers.unwrap_or_default(),
            DialogVerdict::Dismissed | DialogVerdict::TimedOut => {
                warn!(request_id = %prompt.request_id, "Question dialog gave no answer");
                Answers::new()
            }
            DialogVerdict::Cancelled => return None,
        };

        self.pending.take(kind, &prompt.request_id).await?;
        info!(
            request_id = %prompt.request_id,
            answered = answers.len(),
            "Questions resolved"
        );
        Some(answers)
    }

    /// Resolve a plan-approval request end to end.
    ///
    /// Anything but an explicit approval rejects the plan. An approval also
    /// switches the host to the chosen mode. Returns `None` when the request
    /// was cancelled or expired.
    pub async fn resolve_plan(
        self: &Arc<Self>,
        record: PlanRequestRecord,
        transport: Transport,
    ) -> Option<PlanVerdict> {
        let kind = RequestKind::Plan;
        let prompt = PlanPrompt::from(record);
        let timeout = self.config.timeouts.dialog_timeout(kind);
        let cancelled = self
            .track(&prompt.request_id, kind, "ExitPlanMode", transport, timeout)
            .await;

        let surface = self.plan_dialogs.read().await.route_path(None);
        let reply = match (surface, &self.fallback) {
            (Some(surface), _) => surface.review(prompt.clone()),
            (None, Some(fallback)) => {
                let shown = prompt.clone();
                run_fallback(Arc::clone(fallback), move |f| f.review_plan(&shown))
            }
            (None, None) => {
                warn!("No plan surface registered, rejecting");
                ready(PlanVerdict::reject())
            }
        };

        let verdict = match await_dialog(reply, timeout, cancelled).await {
            DialogVerdict::Answered(verdict) => verdict,
            DialogVerdict::Dismissed | DialogVerdict::TimedOut => {
                warn!(request_id = %prompt.request_id, "Plan dialog gave no verdict, rejecting");
                PlanVerdict::reject()
            }
            DialogVerdict::Cancelled => return None,
        };

        self.pending.take(kind, &prompt.request_id).await?;
        if verdict.approved {
            self.set_mode(verdict.target_mode).await;
        }
        info!(
            request_id = %prompt.request_id,
            approved = verdict.approved,
            target_mode = %verdict.target_mode,
            "Plan resolved"
        );
        Some(verdict)
    }

    async fn track(
        &self,
        request_id: &str,
        kind: RequestKind,
        tool_name: &str,
        transport: Transport,
        dialog_timeout: Duration,
    ) -> oneshot::Receiver<()> {
        let (_, cancelled) = self
            .pending
            .create(PendingRequestParams {
                request_id: request_id.to_string(),
                kind,
                tool_name: tool_name.to_string(),
                transport,
                timeout: dialog_timeout + self.config.pending_grace,
            })
            .await;
        cancelled
    }
}

fn reconcile_id(record_id: &mut String, file_id: &str) {
    if record_id != file_id {
        warn!(
            record_id = %record_id,
            file_id,
            "Request ID does not match its file name, using the file name"
        );
        *record_id = file_id.to_string();
    }
}

fn ready<T>(value: T) -> oneshot::Receiver<T> {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(value);
    rx
}

/// Run a blocking fallback dialog on the blocking pool.
fn run_fallback<T, F>(fallback: Arc<dyn FallbackDialog>, show: F) -> oneshot::Receiver<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn FallbackDialog) -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let _ = tx.send(show(fallback.as_ref()));
    });
    rx
}

async fn await_dialog<T>(
    reply: oneshot::Receiver<T>,
    timeout: Duration,
    cancelled: oneshot::Receiver<()>,
) -> DialogVerdict<T> {
    tokio::select! {
        result = tokio::time::timeout(timeout, reply) => match result {
            Ok(Ok(value)) => DialogVerdict::Answered(value),
            Ok(Err(_)) => DialogVerdict::Dismissed,
            Err(_) => DialogVerdict::TimedOut,
        },
        _ = cancelled => DialogVerdict::Cancelled,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::permission::dialog::{ChannelDialog, DialogRequest};
    use parley_core::config::TimeoutConfig;
    use parley_core::exchange::{Answer, now_millis};
    use serde_json::json;

    fn broker(dir: &std::path::Path) -> Arc<PermissionBroker> {
        let exchange = ExchangeDir::open(dir).unwrap();
        Arc::new(PermissionBroker::new(BrokerConfig::default(), exchange))
    }

    fn permission_record(id: &str, tool: &str, inputs: Value) -> PermissionRequestRecord {
        PermissionRequestRecord {
            request_id: id.to_string(),
            tool_name: tool.to_string(),
            inputs: inputs.as_object().cloned().unwrap_or_default(),
            timestamp: now_millis(),
        }
    }

    #[tokio::test]
    async fn mode_resolves_without_dialog() {
        let tmp = tempfile::tempdir().unwrap();
        let broker = broker(tmp.path());
        broker.set_mode(PermissionMode::AcceptEdits).await;

        let edit = permission_record("r1", "Edit", json!({"file_path": "/p/a"}));
        assert_eq!(
            broker.resolve_permission(edit, Transport::Socket).await,
            Some(PermissionDecision::Allow)
        );

        broker.set_mode(PermissionMode::DenyAll).await;
        let bash = permission_record("r2", "Bash", json!({"command": "ls"}));
        assert_eq!(
            broker.resolve_permission(bash, Transport::Socket).await,
            Some(PermissionDecision::Deny)
        );
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn no_surface_and_no_fallback_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let broker = broker(tmp.path());

        let record = permission_record("r1", "Bash", json!({"command": "ls"}));
        assert_eq!(
            broker.resolve_permission(record, Transport::Socket).await,
            Some(PermissionDecision::Deny)
        );

        let questions = QuestionRequestRecord {
            request_id: "q1".into(),
            tool_name: "AskUserQuestion".into(),
            questions: Vec::new(),
            timestamp: 0,
        };
        assert_eq!(
            broker.resolve_questions(questions, Transport::Socket).await,
            Some(Answers::new())
        );

        let plan = PlanRequestRecord {
            request_id: "p1".into(),
            allowed_prompts: Vec::new(),
            plan: None,
            timestamp: 0,
        };
        assert_eq!(
            broker.resolve_plan(plan, Transport::Socket).await,
            Some(PlanVerdict::reject())
        );
    }

    #[tokio::test]
    async fn allow_always_is_remembered_per_tool() {
        let tmp = tempfile::tempdir().unwrap();
        let broker = broker(tmp.path());
        let (dialog, mut prompts) = ChannelDialog::new();
        broker
            .register_permission_dialog("/p", Arc::new(dialog))
            .await;

        let resolver = Arc::clone(&broker);
        let first = tokio::spawn(async move {
            let record = permission_record("r1", "Bash", json!({"command": "ls /p"}));
            resolver.resolve_permission(record, Transport::Socket).await
        });
        let Some(DialogRequest::Permission { reply, .. }) = prompts.recv().await else {
            panic!("expected permission prompt");
        };
        reply.send(PermissionDecision::AllowAlways).unwrap();
        assert_eq!(first.await.unwrap(), Some(PermissionDecision::AllowAlways));

        let record = permission_record("r2", "Bash", json!({"command": "rm /p/x"}));
        assert_eq!(
            broker.resolve_permission(record, Transport::Socket).await,
            Some(PermissionDecision::Allow)
        );
        assert!(prompts.try_recv().is_err());
    }

    #[tokio::test]
    async fn dialog_timeout_denies() {
        let tmp = tempfile::tempdir().unwrap();
        let exchange = ExchangeDir::open(tmp.path()).unwrap();
        let config = BrokerConfig {
            timeouts: TimeoutConfig {
                permission_secs: 1,
                host_margin_secs: 5,
                ..TimeoutConfig::default()
            },
            ..BrokerConfig::default()
        };
        let broker = Arc::new(PermissionBroker::new(config, exchange));
        let (dialog, _prompts) = ChannelDialog::new();
        broker
            .register_permission_dialog("/", Arc::new(dialog))
            .await;

        let record = permission_record("r1", "Bash", json!({}));
        assert_eq!(
            broker.resolve_permission(record, Transport::Socket).await,
            Some(PermissionDecision::Deny)
        );
    }

    #[tokio::test]
    async fn plan_approval_switches_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let broker = broker(tmp.path());
        let (dialog, mut prompts) = ChannelDialog::new();
        broker.register_plan_dialog("/p", Arc::new(dialog)).await;

        let resolver = Arc::clone(&broker);
        let task = tokio::spawn(async move {
            let record = PlanRequestRecord {
                request_id: "p1".into(),
                allowed_prompts: Vec::new(),
                plan: Some("1. edit".into()),
                timestamp: 0,
            };
            resolver.resolve_plan(record, Transport::Socket).await
        });
        let Some(DialogRequest::Plan { prompt, reply }) = prompts.recv().await else {
            panic!("expected plan prompt");
        };
        assert_eq!(prompt.plan.as_deref(), Some("1. edit"));
        reply
            .send(PlanVerdict::approve(PermissionMode::AcceptEdits))
            .unwrap();

        let verdict = task.await.unwrap().unwrap();
        assert!(verdict.approved);
        assert_eq!(broker.mode().await, PermissionMode::AcceptEdits);
    }

    #[tokio::test]
    async fn question_answers_pass_through() {
        let tmp = tempfile::tempdir().unwrap();
        let broker = broker(tmp.path());
        let (dialog, mut prompts) = ChannelDialog::new();
        broker.register_question_dialog("/p", Arc::new(dialog)).await;

        let resolver = Arc::clone(&broker);
        let task = tokio::spawn(async move {
            let record = QuestionRequestRecord {
                request_id: "q1".into(),
                tool_name: "AskUserQuestion".into(),
                questions: Vec::new(),
                timestamp: 0,
            };
            resolver.resolve_questions(record, Transport::Socket).await
        });
        let Some(DialogRequest::Question { reply, .. }) = prompts.recv().await else {
            panic!("expected question prompt");
        };
        let mut answers = Answers::new();
        answers.insert("Which db?".into(), Answer::Single("sqlite".into()));
        reply.send(Some(answers.clone())).unwrap();

        assert_eq!(task.await.unwrap(), Some(answers));
    }
}
