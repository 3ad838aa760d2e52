//! Path pre-checks applied before a permission request leaves the agent.
//!
//! Paths under a sensitive system prefix are refused outright. Paths under a
//! temp directory are moved under the project root so the tool works inside
//! the workspace the user trusts.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use parley_core::config::PermissionConfig;
use parley_core::paths::{PATH_FIELDS, is_file_in_project, normalize_path, normalize_separators};

/// One path moved under the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rewrite {
    pub field: String,
    pub from: String,
    pub to: String,
}

/// Deny-list and temp-path rewriting for tool inputs.
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Normalized, each ending in `/`.
    deny_prefixes: Vec<String>,
    /// Normalized, each ending in `/`, longest first.
    temp_prefixes: Vec<String>,
    project_root: Option<String>,
}

impl PathGuard {
    pub fn new(deny_prefixes: &[String], temp_prefixes: &[String], project_root: Option<&Path>) -> Self {
        let deny_prefixes = deny_prefixes.iter().map(|p| dir_prefix(p)).collect();

        let mut temp: Vec<String> = temp_prefixes.iter().map(|p| dir_prefix(p)).collect();
        let process_temp = dir_prefix(&std::env::temp_dir().to_string_lossy());
        if !temp.contains(&process_temp) {
            temp.push(process_temp);
        }
        temp.retain(|p| p != "/");
        temp.sort_by_key(|p| std::cmp::Reverse(p.len()));

        let project_root = project_root
            .map(|root| {
                normalize_separators(&root.to_string_lossy())
                    .trim_end_matches('/')
                    .to_string()
            })
            .filter(|root| !root.is_empty());

        Self {
            deny_prefixes,
            temp_prefixes: temp,
            project_root,
        }
    }

    pub fn from_config(config: &PermissionConfig, project_root: Option<&Path>) -> Self {
        Self::new(&config.deny_prefixes, &config.temp_prefixes, project_root)
    }

    pub fn project_root(&self) -> Option<&str> {
        self.project_root.as_deref()
    }

    /// The first path-bearing input under a denied prefix, after `.` and `..`
    /// segments are resolved.
    pub fn denied_path(&self, inputs: &Map<String, Value>) -> Option<String> {
        PATH_FIELDS
            .iter()
            .filter_map(|field| inputs.get(*field).and_then(Value::as_str))
            .map(|path| normalize_path(path.trim()))
            .find(|path| self.is_denied(path))
    }

    fn is_denied(&self, path: &str) -> bool {
        self.deny_prefixes
            .iter()
            .any(|prefix| has_dir_prefix(path, prefix))
    }

    /// Move temp-dir paths under the project root, in place.
    pub fn rewrite(&self, inputs: &mut Map<String, Value>) -> Vec<Rewrite> {
        let Some(root) = &self.project_root else {
            return Vec::new();
        };
        let mut rewrites = Vec::new();
        for field in PATH_FIELDS {
            let Some(Value::String(path)) = inputs.get_mut(*field) else {
                continue;
            };
            let normalized = normalize_path(path.trim());
            if is_file_in_project(&normalized, root) {
                continue;
            }
            let relative = self
                .temp_prefixes
                .iter()
                .find_map(|prefix| normalized.strip_prefix(prefix.as_str()));
            let Some(relative) = relative.filter(|r| !r.is_empty()) else {
                continue;
            };

            let target = format!("{root}/{relative}");
            if self.is_denied(&target) {
                warn!(field, to = %target, "Temp path would land on a denied path, left as is");
                continue;
            }
            info!(field, from = %normalized, to = %target, "Rewrote temp path into project");
            rewrites.push(Rewrite {
                field: (*field).to_string(),
                from: std::mem::replace(path, target.clone()),
                to: target,
            });
        }
        rewrites
    }
}

/// Normalize a directory prefix so it ends in exactly one `/`.
fn dir_prefix(prefix: &str) -> String {
    let mut normalized = normalize_separators(prefix.trim())
        .trim_end_matches('/')
        .to_string();
    normalized.push('/');
    normalized
}

/// `path` is the directory itself or lies under it. Drive-letter prefixes
/// compare case-insensitively.
fn has_dir_prefix(path: &str, prefix: &str) -> bool {
    let bare = prefix.trim_end_matches('/');
    if bare.is_empty() {
        return path.starts_with('/');
    }
    if is_drive_path(prefix) {
        let path = path.to_ascii_lowercase();
        let prefix = prefix.to_ascii_lowercase();
        return path.starts_with(&prefix) || path == prefix.trim_end_matches('/');
    }
    path.starts_with(prefix) || path == bare
}

fn is_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
