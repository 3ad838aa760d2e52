//! Permission negotiation, host side.
//!
//! Answers permission, ask-user-question and plan-approval requests from the
//! agent, routing dialogs to the workspace that owns each request.

mod broker;
mod dialog;
mod memory;
mod pending;
mod router;
#[cfg(unix)]
mod socket;
mod types;

pub use broker::{DecisionObserver, PermissionBroker};
pub use dialog::{
    ChannelDialog, DialogRequest, FallbackDialog, PermissionDialog, PlanDialog, QuestionDialog,
};
pub use memory::{DecisionMemory, MemoryHit, MemoryScope};
pub use pending::{PendingManager, PendingRequest, PendingRequestParams, Transport};
pub use router::DialogRouter;
#[cfg(unix)]
pub use socket::SocketServer;
pub use types::{
    BrokerConfig, BrokerError, PermissionPrompt, PlanPrompt, PlanVerdict, QuestionOutcome,
    QuestionPrompt,
};
