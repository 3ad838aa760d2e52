//! Permission vocabulary shared by the host and the agent.
//!
//! Decisions, global modes, and the key derivation used for
//! parameter-scoped decision memory.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A human verdict on a single permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    /// Allow this invocation only.
    Allow,
    /// Allow and remember for the tool.
    AllowAlways,
    /// Deny this invocation.
    Deny,
}

impl PermissionDecision {
    /// Whether the decision lets the tool run.
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow | Self::AllowAlways)
    }

    /// Build a one-shot decision from a boolean verdict.
    pub const fn from_allow(allow: bool) -> Self {
        if allow { Self::Allow } else { Self::Deny }
    }
}

/// Host-wide permission mode, consulted after decision memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Every request not answered by memory goes to a dialog.
    #[default]
    Default,
    /// File-mutating tools are allowed without a dialog.
    AcceptEdits,
    /// Everything is allowed without a dialog.
    AllowAll,
    /// Everything is denied without a dialog.
    DenyAll,
}

impl PermissionMode {
    /// Resolve a tool under this mode.
    ///
    /// Returns `None` when the mode has no opinion and a dialog is needed.
    pub fn resolve(self, tool_name: &str) -> Option<bool> {
        match self {
            Self::Default => None,
            Self::AllowAll => Some(true),
            Self::DenyAll => Some(false),
            Self::AcceptEdits => is_edit_tool(tool_name).then_some(true),
        }
    }

    /// Wire name used in config files and plan-approval responses.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::AllowAll => "allowAll",
            Self::DenyAll => "denyAll",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" | "accept-edits" | "accept_edits" => Ok(Self::AcceptEdits),
            "allowAll" | "allow-all" | "allow_all" | "bypassPermissions" => Ok(Self::AllowAll),
            "denyAll" | "deny-all" | "deny_all" => Ok(Self::DenyAll),
            other => Err(format!("unknown permission mode: {other}")),
        }
    }
}

/// Tools that only create, modify, or relocate files.
const EDIT_TOOLS: &[&str] = &[
    "write",
    "edit",
    "multiedit",
    "notebookedit",
    "writefile",
    "editfile",
    "replace",
    "move",
    "movefile",
    "rename",
    "copy",
    "copyfile",
    "createdirectory",
    "mkdir",
];

/// Check whether a tool belongs to the write/edit/move/copy/create-directory
/// family that `AcceptEdits` auto-approves.
///
/// Matching ignores case, `_`, `-` and an `mcp__<server>__` prefix.
pub fn is_edit_tool(tool_name: &str) -> bool {
    let bare = tool_name
        .strip_prefix("mcp__")
        .and_then(|rest| rest.split_once("__").map(|(_, tool)| tool))
        .unwrap_or(tool_name);
    let normalized: String = bare
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    EDIT_TOOLS.contains(&normalized.as_str())
}

/// Key for parameter-scoped decision memory: `tool:sha256(inputs)`.
///
/// `serde_json::Map` keeps keys sorted, so the serialization is canonical for
/// equal inputs regardless of the order the agent produced them in.
pub fn parameter_key(tool_name: &str, inputs: &Map<String, Value>) -> String {
    let canonical = serde_json::to_string(inputs).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{tool_name}:{hex}")
}
