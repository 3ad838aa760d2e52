//! Shared exchange directory between the agent and the host.
//!
//! The directory is the only channel between the two processes. Every
//! negotiation is a pair of JSON records: a request written by the agent and a
//! response written by the host, named after a shared request id.
//!
//! | Request file                  | Response file                          |
//! |-------------------------------|----------------------------------------|
//! | `request-{id}.json`           | `response-{id}.json`                   |
//! | `ask-user-question-{id}.json` | `ask-user-question-response-{id}.json` |
//! | `plan-approval-{id}.json`     | `plan-approval-response-{id}.json`     |
//!
//! Records are written to a hidden temporary sibling and renamed into place,
//! so a reader never sees a partially written file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Environment variable overriding the exchange directory location.
pub const DIR_ENV: &str = "PARLEY_PERMISSION_DIR";

/// Subdirectory of the system temp dir used when [`DIR_ENV`] is unset.
pub const DEFAULT_DIR_NAME: &str = "parley-permissions";

/// Socket file name used by the socket transport.
pub const SOCKET_FILE_NAME: &str = "parley.sock";

const RECORD_EXTENSION: &str = ".json";
const TEMP_EXTENSION: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The three negotiation sub-protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Plain tool permission.
    Permission,
    /// Ask-user-question answers.
    Question,
    /// Plan approval.
    Plan,
}

impl RequestKind {
    pub const ALL: [Self; 3] = [Self::Permission, Self::Question, Self::Plan];

    const fn request_prefix(self) -> &'static str {
        match self {
            Self::Permission => "request-",
            Self::Question => "ask-user-question-",
            Self::Plan => "plan-approval-",
        }
    }

    const fn response_prefix(self) -> &'static str {
        match self {
            Self::Permission => "response-",
            Self::Question => "ask-user-question-response-",
            Self::Plan => "plan-approval-response-",
        }
    }

    /// File name of the request record for `id`.
    pub fn request_file_name(self, id: &str) -> String {
        format!("{}{id}{RECORD_EXTENSION}", self.request_prefix())
    }

    /// File name of the response record for `id`.
    pub fn response_file_name(self, id: &str) -> String {
        format!("{}{id}{RECORD_EXTENSION}", self.response_prefix())
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Question => "question",
            Self::Plan => "plan",
        }
    }
}

/// Which side of a negotiation a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRole {
    Request,
    Response,
}

/// A recognised file name in the exchange directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeFile {
    pub kind: RequestKind,
    pub role: RecordRole,
    pub id: String,
}

/// Classify a file name against the naming contract.
///
/// Response prefixes are tried first because `ask-user-question-response-x`
/// also starts with the question request prefix.
pub fn classify(file_name: &str) -> Option<ExchangeFile> {
    const ORDER: [(RequestKind, RecordRole); 6] = [
        (RequestKind::Question, RecordRole::Response),
        (RequestKind::Plan, RecordRole::Response),
        (RequestKind::Question, RecordRole::Request),
        (RequestKind::Plan, RecordRole::Request),
        (RequestKind::Permission, RecordRole::Response),
        (RequestKind::Permission, RecordRole::Request),
    ];

    let stem = file_name.strip_suffix(RECORD_EXTENSION)?;
    if stem.starts_with('.') {
        return None;
    }

    ORDER.iter().find_map(|&(kind, role)| {
        let prefix = match role {
            RecordRole::Request => kind.request_prefix(),
            RecordRole::Response => kind.response_prefix(),
        };
        let id = stem.strip_prefix(prefix)?;
        (!id.is_empty()).then(|| ExchangeFile {
            kind,
            role,
            id: id.to_string(),
        })
    })
}

/// Milliseconds since the unix epoch, for record timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// `request-{id}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestRecord {
    pub request_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub timestamp: u64,
}

/// `response-{id}.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResponseRecord {
    pub allow: bool,
}

/// One option of an ask-user-question prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single question the agent wants answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default, alias = "multi_select")]
    pub multi_select: bool,
}

/// `ask-user-question-{id}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequestRecord {
    pub request_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub timestamp: u64,
}

/// An answer: one label, or several for multi-select questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Multiple(Vec<String>),
}

/// Answers keyed by question text.
pub type Answers = BTreeMap<String, Answer>;

/// `ask-user-question-response-{id}.json`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionResponseRecord {
    #[serde(default)]
    pub answers: Answers,
}

/// `plan-approval-{id}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequestRecord {
    pub request_id: String,
    #[serde(default)]
    pub allowed_prompts: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
}

/// `plan-approval-response-{id}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponseRecord {
    pub approved: bool,
    pub target_mode: String,
}

impl PlanResponseRecord {
    /// The fail-closed plan verdict.
    pub fn rejected() -> Self {
        Self {
            approved: false,
            target_mode: crate::permissions::PermissionMode::Default.to_string(),
        }
    }
}

/// Handle to the exchange directory.
#[derive(Debug, Clone)]
pub struct ExchangeDir {
    root: PathBuf,
}

impl ExchangeDir {
    /// Resolve the directory from [`DIR_ENV`], else the system temp dir, and
    /// create it if absent.
    pub fn resolve() -> Result<Self> {
        Self::open(default_dir())
    }

    /// Use an explicit directory, creating it if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            Error::Config(format!(
                "Failed to create exchange directory {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Default socket location for the socket transport.
    pub fn socket_path(&self) -> PathBuf {
        self.root.join(SOCKET_FILE_NAME)
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Atomically write a record under `file_name`.
    pub async fn write_record<T: Serialize + Sync>(&self, file_name: &str, record: &T) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let temp = self.root.join(format!(
            ".{file_name}.{}.{}{TEMP_EXTENSION}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, self.file_path(file_name)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(file = file_name, "Wrote exchange record");
        Ok(())
    }

    /// Read and decode a record.
    ///
    /// Returns `Ok(None)` when the file no longer exists, which callers treat
    /// as "already handled".
    pub async fn read_record<T: DeserializeOwned>(&self, file_name: &str) -> Result<Option<T>> {
        let path = self.file_path(file_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::MalformedRecord {
                path,
                reason: e.to_string(),
            })
    }

    /// Delete a record. Returns `false` when it was already gone.
    pub async fn remove(&self, file_name: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.file_path(file_name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a record currently exists.
    pub async fn exists(&self, file_name: &str) -> bool {
        tokio::fs::try_exists(self.file_path(file_name))
            .await
            .unwrap_or(false)
    }

    /// List request records currently waiting in the directory.
    pub async fn pending_requests(&self) -> Result<Vec<(String, ExchangeFile)>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(file) = classify(&name) {
                if file.role == RecordRole::Request {
                    found.push((name, file));
                }
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    /// Delete every request/response record and leftover temporary file.
    pub async fn sweep_stale(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let stale = classify(&name).is_some()
                || (name.starts_with('.') && name.ends_with(TEMP_EXTENSION));
            if !stale {
                continue;
            }
            match self.remove(&name).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(file = %name, error = %e, "Failed to remove stale record"),
            }
        }
        Ok(removed)
    }
}

fn default_dir() -> PathBuf {
    match std::env::var(DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join(DEFAULT_DIR_NAME),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_distinguishes_requests_and_responses() {
        let file = classify("ask-user-question-response-abc.json").unwrap();
        assert_eq!(file.kind, RequestKind::Question);
        assert_eq!(file.role, RecordRole::Response);
        assert_eq!(file.id, "abc");

        let file = classify("ask-user-question-abc.json").unwrap();
        assert_eq!(file.role, RecordRole::Request);

        let file = classify("response-42.json").unwrap();
        assert_eq!(file.kind, RequestKind::Permission);
        assert_eq!(file.role, RecordRole::Response);

        let file = classify("plan-approval-7.json").unwrap();
        assert_eq!((file.kind, file.role), (RequestKind::Plan, RecordRole::Request));
    }

    #[test]
    fn classify_rejects_foreign_names() {
        assert!(classify("request-.json").is_none());
        assert!(classify("request-1.txt").is_none());
        assert!(classify(".request-1.json.123.0.tmp").is_none());
        assert!(classify("notes.json").is_none());
    }

    #[test]
    fn file_names_follow_contract() {
        assert_eq!(RequestKind::Permission.request_file_name("x"), "request-x.json");
        assert_eq!(
            RequestKind::Plan.response_file_name("x"),
            "plan-approval-response-x.json"
        );
    }

    #[test]
    fn records_use_camel_case_on_the_wire() {
        let record = PermissionRequestRecord {
            request_id: "1".into(),
            tool_name: "Bash".into(),
            inputs: json!({"command": "ls"}).as_object().cloned().unwrap(),
            timestamp: 5,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["requestId"], "1");
        assert_eq!(value["toolName"], "Bash");

        let plan: PlanResponseRecord =
            serde_json::from_str(r#"{"approved":true,"targetMode":"acceptEdits"}"#).unwrap();
        assert_eq!(plan.target_mode, "acceptEdits");
    }

    #[test]
    fn answers_accept_single_and_multiple() {
        let record: QuestionResponseRecord =
            serde_json::from_str(r#"{"answers":{"Color?":"red","Toppings?":["a","b"]}}"#).unwrap();
        assert_eq!(record.answers["Color?"], Answer::Single("red".into()));
        assert_eq!(
            record.answers["Toppings?"],
            Answer::Multiple(vec!["a".into(), "b".into()])
        );
    }

    #[tokio::test]
    async fn write_then_read_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ExchangeDir::open(tmp.path()).unwrap();
        let name = RequestKind::Permission.response_file_name("a");

        dir.write_record(&name, &PermissionResponseRecord { allow: true })
            .await
            .unwrap();
        let read: Option<PermissionResponseRecord> = dir.read_record(&name).await.unwrap();
        assert_eq!(read, Some(PermissionResponseRecord { allow: true }));

        assert!(dir.remove(&name).await.unwrap());
        assert!(!dir.remove(&name).await.unwrap());
        let gone: Option<PermissionResponseRecord> = dir.read_record(&name).await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn malformed_record_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ExchangeDir::open(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("request-bad.json"), b"{not json").unwrap();

        let result: Result<Option<PermissionRequestRecord>> =
            dir.read_record("request-bad.json").await;
        assert!(matches!(result, Err(Error::MalformedRecord { .. })));
    }

    #[tokio::test]
    async fn sweep_removes_only_protocol_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ExchangeDir::open(tmp.path()).unwrap();
        for name in [
            "request-1.json",
            "response-1.json",
            "plan-approval-2.json",
            ".request-3.json.1.0.tmp",
            "keep.txt",
        ] {
            std::fs::write(tmp.path().join(name), b"{}").unwrap();
        }

        let removed = dir.sweep_stale().await.unwrap();
        assert_eq!(removed, 4);
        assert!(tmp.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn pending_requests_lists_only_requests() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ExchangeDir::open(tmp.path()).unwrap();
        for name in ["request-1.json", "response-1.json", "ask-user-question-2.json"] {
            std::fs::write(tmp.path().join(name), b"{}").unwrap();
        }

        let pending = dir.pending_requests().await.unwrap();
        let names: Vec<_> = pending.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["ask-user-question-2.json", "request-1.json"]);
    }
}
