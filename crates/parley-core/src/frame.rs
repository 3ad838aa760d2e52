//! Request/response frames.
//!
//! A frame pairs a record with its sub-protocol. The file transport stores
//! the bare record under the contract file name; the socket transport sends
//! the tagged frame as one JSON line.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::exchange::{
    ExchangeDir, PermissionRequestRecord, PermissionResponseRecord, PlanRequestRecord,
    PlanResponseRecord, QuestionRequestRecord, QuestionResponseRecord, RequestKind,
};

/// A request from the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum RequestFrame {
    Permission(PermissionRequestRecord),
    Question(QuestionRequestRecord),
    Plan(PlanRequestRecord),
}

impl RequestFrame {
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::Permission(_) => RequestKind::Permission,
            Self::Question(_) => RequestKind::Question,
            Self::Plan(_) => RequestKind::Plan,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::Permission(r) => &r.request_id,
            Self::Question(r) => &r.request_id,
            Self::Plan(r) => &r.request_id,
        }
    }

    /// Write the request record into the exchange directory.
    pub async fn write_to(&self, dir: &ExchangeDir) -> Result<()> {
        let name = self.kind().request_file_name(self.request_id());
        match self {
            Self::Permission(r) => dir.write_record(&name, r).await,
            Self::Question(r) => dir.write_record(&name, r).await,
            Self::Plan(r) => dir.write_record(&name, r).await,
        }
    }
}

/// A response from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum ResponseFrame {
    Permission(PermissionResponseRecord),
    Question(QuestionResponseRecord),
    Plan(PlanResponseRecord),
}

impl ResponseFrame {
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::Permission(_) => RequestKind::Permission,
            Self::Question(_) => RequestKind::Question,
            Self::Plan(_) => RequestKind::Plan,
        }
    }

    /// The fail-closed response for a sub-protocol.
    pub fn fail_closed(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Permission => Self::Permission(PermissionResponseRecord { allow: false }),
            RequestKind::Question => Self::Question(QuestionResponseRecord::default()),
            RequestKind::Plan => Self::Plan(PlanResponseRecord::rejected()),
        }
    }

    /// Write the response record for `id` into the exchange directory.
    pub async fn write_to(&self, dir: &ExchangeDir, id: &str) -> Result<()> {
        let name = self.kind().response_file_name(id);
        match self {
            Self::Permission(r) => dir.write_record(&name, r).await,
            Self::Question(r) => dir.write_record(&name, r).await,
            Self::Plan(r) => dir.write_record(&name, r).await,
        }
    }

    /// Read the response record for `id`, if it has been written.
    pub async fn read_from(dir: &ExchangeDir, kind: RequestKind, id: &str) -> Result<Option<Self>> {
        let name = kind.response_file_name(id);
        Ok(match kind {
            RequestKind::Permission => dir.read_record(&name).await?.map(Self::Permission),
            RequestKind::Question => dir.read_record(&name).await?.map(Self::Question),
            RequestKind::Plan => dir.read_record(&name).await?.map(Self::Plan),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_are_tagged_by_kind() {
        let frame = ResponseFrame::Permission(PermissionResponseRecord { allow: true });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"kind": "permission", "record": {"allow": true}}));

        let parsed: RequestFrame = serde_json::from_value(json!({
            "kind": "plan",
            "record": {"requestId": "p1", "allowedPrompts": [], "timestamp": 1}
        }))
        .unwrap();
        assert_eq!(parsed.kind(), RequestKind::Plan);
        assert_eq!(parsed.request_id(), "p1");
    }

    #[test]
    fn fail_closed_responses_are_negative() {
        assert_eq!(
            ResponseFrame::fail_closed(RequestKind::Permission),
            ResponseFrame::Permission(PermissionResponseRecord { allow: false })
        );
        let ResponseFrame::Plan(plan) = ResponseFrame::fail_closed(RequestKind::Plan) else {
            unreachable!()
        };
        assert!(!plan.approved);
        assert_eq!(plan.target_mode, "default");
    }

    #[tokio::test]
    async fn file_round_trip_uses_contract_names() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ExchangeDir::open(tmp.path()).unwrap();

        let response = ResponseFrame::Question(QuestionResponseRecord::default());
        response.write_to(&dir, "q1").await.unwrap();
        assert!(tmp.path().join("ask-user-question-response-q1.json").exists());

        let read = ResponseFrame::read_from(&dir, RequestKind::Question, "q1")
            .await
            .unwrap();
        assert_eq!(read, Some(response));
        assert!(
            ResponseFrame::read_from(&dir, RequestKind::Plan, "q1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
