//! Session-scoped decision memory.
//!
//! Remembers verdicts per tool name, or per tool name plus exact inputs.
//! Lookups consult the tool-only map first.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use parley_core::permissions::parameter_key;

/// Which memory map answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryScope {
    Tool,
    Parameters,
}

/// A remembered verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryHit {
    pub allow: bool,
    pub scope: MemoryScope,
}

/// Remembered verdicts for the current session.
#[derive(Debug, Default)]
pub struct DecisionMemory {
    by_tool: RwLock<HashMap<String, bool>>,
    by_params: RwLock<HashMap<String, bool>>,
}

impl DecisionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a remembered verdict for a request.
    pub async fn lookup(&self, tool_name: &str, inputs: &Map<String, Value>) -> Option<MemoryHit> {
        if let Some(&allow) = self.by_tool.read().await.get(tool_name) {
            return Some(MemoryHit {
                allow,
                scope: MemoryScope::Tool,
            });
        }
        let key = parameter_key(tool_name, inputs);
        self.by_params
            .read()
            .await
            .get(&key)
            .map(|&allow| MemoryHit {
                allow,
                scope: MemoryScope::Parameters,
            })
    }

    /// Remember a verdict for every invocation of `tool_name`.
    pub async fn remember_tool(&self, tool_name: &str, allow: bool) {
        self.by_tool
            .write()
            .await
            .insert(tool_name.to_string(), allow);
        debug!(tool_name, allow, "Remembered tool decision");
    }

    /// Remember a verdict for `tool_name` with exactly these inputs.
    pub async fn remember_params(&self, tool_name: &str, inputs: &Map<String, Value>, allow: bool) {
        let key = parameter_key(tool_name, inputs);
        self.by_params.write().await.insert(key, allow);
        debug!(tool_name, allow, "Remembered parameter decision");
    }

    /// Drop the tool-only verdict for `tool_name`.
    pub async fn forget_tool(&self, tool_name: &str) -> bool {
        self.by_tool.write().await.remove(tool_name).is_some()
    }

    /// Forget everything (new session).
    pub async fn clear(&self) {
        self.by_tool.write().await.clear();
        self.by_params.write().await.clear();
    }

    /// Total number of remembered verdicts.
    pub async fn len(&self) -> usize {
        self.by_tool.read().await.len() + self.by_params.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn tool_scope_wins_over_parameters() {
        let memory = DecisionMemory::new();
        let args = inputs(json!({"command": "ls"}));

        memory.remember_params("Bash", &args, false).await;
        memory.remember_tool("Bash", true).await;

        let hit = memory.lookup("Bash", &args).await.unwrap();
        assert!(hit.allow);
        assert_eq!(hit.scope, MemoryScope::Tool);
    }

    #[tokio::test]
    async fn parameters_match_exact_inputs_only() {
        let memory = DecisionMemory::new();
        memory
            .remember_params("Bash", &inputs(json!({"command": "ls", "cwd": "/p"})), true)
            .await;

        let reordered = inputs(json!({"cwd": "/p", "command": "ls"}));
        let hit = memory.lookup("Bash", &reordered).await.unwrap();
        assert_eq!(hit.scope, MemoryScope::Parameters);

        assert!(
            memory
                .lookup("Bash", &inputs(json!({"command": "rm"})))
                .await
                .is_none()
        );
        assert!(memory.lookup("Write", &reordered).await.is_none());
    }

    #[tokio::test]
    async fn clear_and_forget() {
        let memory = DecisionMemory::new();
        memory.remember_tool("Read", true).await;
        memory.remember_params("Bash", &Map::new(), false).await;
        assert_eq!(memory.len().await, 2);

        assert!(memory.forget_tool("Read").await);
        assert!(!memory.forget_tool("Read").await);
        assert_eq!(memory.len().await, 1);

        memory.clear().await;
        assert!(memory.is_empty().await);
    }
}
