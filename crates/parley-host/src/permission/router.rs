//! Routes dialogs to the workspace surface that owns the request.
//!
//! Several host windows may be open at once, each rooted at a workspace
//! directory. A request goes to the window whose root contains the path the
//! tool touches, preferring the deepest root; requests without a usable path
//! go to the last-active window, else the first one registered.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use parley_core::paths::{extract_candidate_path, is_file_in_project, normalize_separators};

struct Registration<T: ?Sized> {
    root: String,
    surface: Arc<T>,
}

/// Workspace-root to surface registry.
pub struct DialogRouter<T: ?Sized> {
    registrations: Vec<Registration<T>>,
    last_active: Option<String>,
}

impl<T: ?Sized> Default for DialogRouter<T> {
    fn default() -> Self {
        Self {
            registrations: Vec::new(),
            last_active: None,
        }
    }
}

fn normalize_root(root: &str) -> String {
    let normalized = normalize_separators(root);
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl<T: ?Sized> DialogRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a surface for a workspace root, replacing any previous one.
    pub fn register(&mut self, root: &str, surface: Arc<T>) {
        let root = normalize_root(root);
        if let Some(existing) = self.registrations.iter_mut().find(|r| r.root == root) {
            existing.surface = surface;
        } else {
            self.registrations.push(Registration {
                root: root.clone(),
                surface,
            });
        }
        debug!(root, "Registered dialog surface");
    }

    /// Remove the surface for a workspace root.
    pub fn unregister(&mut self, root: &str) -> bool {
        let root = normalize_root(root);
        let before = self.registrations.len();
        self.registrations.retain(|r| r.root != root);
        if self.last_active.as_deref() == Some(root.as_str()) {
            self.last_active = None;
        }
        self.registrations.len() != before
    }

    /// Record that the user last interacted with this workspace.
    pub fn mark_active(&mut self, root: &str) -> bool {
        let root = normalize_root(root);
        if self.registrations.iter().any(|r| r.root == root) {
            self.last_active = Some(root);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Pick the surface for a request's tool inputs.
    pub fn route(&self, inputs: &Map<String, Value>) -> Option<Arc<T>> {
        let path = extract_candidate_path(inputs);
        self.route_path(path.as_deref())
    }

    /// Pick the surface for an optional filesystem path.
    pub fn route_path(&self, path: Option<&str>) -> Option<Arc<T>> {
        if let Some(path) = path {
            let best = self
                .registrations
                .iter()
                .filter(|r| is_file_in_project(path, &r.root))
                .max_by_key(|r| r.root.len());
            if let Some(found) = best {
                debug!(path, root = %found.root, "Routed by path containment");
                return Some(Arc::clone(&found.surface));
            }
        }

        if let Some(active) = &self.last_active {
            if let Some(found) = self.registrations.iter().find(|r| &r.root == active) {
                return Some(Arc::clone(&found.surface));
            }
        }

        self.registrations.first().map(|r| Arc::clone(&r.surface))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn router() -> DialogRouter<str> {
        let mut router = DialogRouter::<str>::new();
        router.register("/work/a", Arc::from("a"));
        router.register("/work/a/b/", Arc::from("ab"));
        router.register("/work/c", Arc::from("c"));
        router
    }

    #[test]
    fn deepest_root_wins() {
        let router = router();
        assert_eq!(&*router.route_path(Some("/work/a/b/x.rs")).unwrap(), "ab");
        assert_eq!(&*router.route_path(Some("/work/a/x.rs")).unwrap(), "a");
        assert_eq!(&*router.route_path(Some("/work/a/bc/x.rs")).unwrap(), "a");
    }

    #[test]
    fn pathless_requests_use_last_active_then_first() {
        let mut router = router();
        assert_eq!(&*router.route_path(None).unwrap(), "a");
        assert_eq!(&*router.route_path(Some("/elsewhere/x")).unwrap(), "a");

        assert!(router.mark_active("/work/c/"));
        assert_eq!(&*router.route_path(None).unwrap(), "c");

        assert!(router.unregister("/work/c"));
        assert_eq!(&*router.route_path(None).unwrap(), "a");
        assert!(!router.mark_active("/work/c"));
    }

    #[test]
    fn routes_from_tool_inputs() {
        let router = router();
        let inputs = json!({"command": "cat '/work/a/b/notes.md' | wc -l"});
        let surface = router.route(inputs.as_object().unwrap()).unwrap();
        assert_eq!(&*surface, "ab");

        let inputs = json!({"file_path": r"\work\c\main.rs"});
        let surface = router.route(inputs.as_object().unwrap()).unwrap();
        assert_eq!(&*surface, "c");
    }

    #[test]
    fn register_replaces_same_root() {
        let mut router = router();
        router.register("/work/a/", Arc::from("a2"));
        assert_eq!(router.len(), 3);
        assert_eq!(&*router.route_path(Some("/work/a/y")).unwrap(), "a2");
    }

    #[test]
    fn empty_router_routes_nowhere() {
        let router = DialogRouter::<str>::new();
        assert!(router.is_empty());
        assert!(router.route_path(Some("/x")).is_none());
    }
}
