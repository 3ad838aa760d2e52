//! Permission broker types.

use std::time::Duration;

use serde_json::{Map, Value};

use parley_core::config::{Config, TimeoutConfig};
use parley_core::exchange::{
    Answers, PermissionRequestRecord, PlanRequestRecord, PlanResponseRecord, Question,
    QuestionRequestRecord,
};
use parley_core::permissions::PermissionMode;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Exchange directory poll interval.
    pub poll_interval: Duration,
    /// Emitter and dialog timeouts.
    pub timeouts: TimeoutConfig,
    /// Extra time a pending entry survives its dialog timeout before the
    /// poll loop answers it on the dialog task's behalf.
    pub pending_grace: Duration,
    /// Initial global mode.
    pub mode: PermissionMode,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeouts: TimeoutConfig::default(),
            pending_grace: Duration::from_secs(1),
            mode: PermissionMode::Default,
        }
    }
}

impl From<&Config> for BrokerConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.exchange.broker_poll_interval(),
            timeouts: config.timeouts.clone(),
            mode: config.permissions.mode,
            ..Self::default()
        }
    }
}

/// A permission prompt shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionPrompt {
    pub request_id: String,
    pub tool_name: String,
    pub inputs: Map<String, Value>,
}

impl From<PermissionRequestRecord> for PermissionPrompt {
    fn from(record: PermissionRequestRecord) -> Self {
        Self {
            request_id: record.request_id,
            tool_name: record.tool_name,
            inputs: record.inputs,
        }
    }
}

/// A set of questions shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPrompt {
    pub request_id: String,
    pub tool_name: String,
    pub questions: Vec<Question>,
}

impl From<QuestionRequestRecord> for QuestionPrompt {
    fn from(record: QuestionRequestRecord) -> Self {
        Self {
            request_id: record.request_id,
            tool_name: record.tool_name,
            questions: record.questions,
        }
    }
}

/// A plan shown to the user for approval.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanPrompt {
    pub request_id: String,
    pub plan: Option<String>,
    pub allowed_prompts: Vec<Value>,
}

impl From<PlanRequestRecord> for PlanPrompt {
    fn from(record: PlanRequestRecord) -> Self {
        Self {
            request_id: record.request_id,
            plan: record.plan,
            allowed_prompts: record.allowed_prompts,
        }
    }
}

/// The user's verdict on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanVerdict {
    pub approved: bool,
    /// Mode the agent switches to once the plan is approved.
    pub target_mode: PermissionMode,
}

impl PlanVerdict {
    pub const fn approve(target_mode: PermissionMode) -> Self {
        Self {
            approved: true,
            target_mode,
        }
    }

    pub const fn reject() -> Self {
        Self {
            approved: false,
            target_mode: PermissionMode::Default,
        }
    }
}

impl From<PlanVerdict> for PlanResponseRecord {
    fn from(verdict: PlanVerdict) -> Self {
        Self {
            approved: verdict.approved,
            target_mode: verdict.target_mode.to_string(),
        }
    }
}

/// Answers collected from a question dialog; `None` means dismissed.
pub type QuestionOutcome = Option<Answers>;

/// Permission broker errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Exchange directory error: {0}")]
    Exchange(#[from] parley_core::Error),

    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}
