//! Path helpers for permission requests.
//!
//! Tool inputs arrive as loosely-typed JSON from the agent. These helpers pull
//! a filesystem path out of them and answer containment questions using
//! segment boundaries rather than raw string prefixes.

use serde_json::{Map, Value};

/// Input fields that carry a path directly, in lookup order.
pub const PATH_FIELDS: &[&str] = &[
    "file_path",
    "path",
    "notebook_path",
    "source",
    "destination",
    "target",
    "cwd",
];

/// Input fields that carry a shell command line.
const COMMAND_FIELDS: &[&str] = &["command", "cmd"];

/// Replace Windows separators with `/`.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Resolve `.` and `..` segments and repeated separators without touching
/// the filesystem. `..` never climbs above the root of an absolute path.
///
/// The result has `/` separators and no trailing separator, except for the
/// filesystem root itself.
pub fn normalize_path(path: &str) -> String {
    let path = normalize_separators(path);
    let (prefix, rest) = if let Some(rest) = path.strip_prefix('/') {
        ("/", rest)
    } else if is_drive_absolute(&path) {
        path.split_at(3)
    } else {
        ("", path.as_str())
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if prefix.is_empty() => segments.push(".."),
                _ => {}
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if prefix.is_empty() && joined.is_empty() {
        return ".".to_string();
    }
    format!("{prefix}{joined}")
}

fn is_drive_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Whether `file` lies inside (or is) the directory `root`.
///
/// Both sides are normalized first, so `/home/u/app/../etc` is not inside
/// `/home/u/app`. The root gets a trailing separator before comparing, so
/// `/home/u/app` never contains `/home/u/app-v2/x`.
pub fn is_file_in_project(file: &str, root: &str) -> bool {
    let file = normalize_path(file);
    let root = if root.trim().is_empty() {
        String::new()
    } else {
        normalize_path(root)
    };
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        // Only the filesystem root itself, which contains every absolute path.
        return file.starts_with('/');
    }
    if file == root {
        return true;
    }
    let mut prefix = String::with_capacity(root.len() + 1);
    prefix.push_str(root);
    prefix.push('/');
    file.starts_with(&prefix)
}

/// Extract the most likely filesystem path referenced by tool inputs.
///
/// Direct path fields win; otherwise the first absolute-looking token of a
/// shell command is used. The result has normalized separators.
pub fn extract_candidate_path(inputs: &Map<String, Value>) -> Option<String> {
    for field in PATH_FIELDS {
        if let Some(path) = inputs.get(*field).and_then(Value::as_str) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(normalize_separators(&expand_home(trimmed)));
            }
        }
    }

    COMMAND_FIELDS
        .iter()
        .filter_map(|field| inputs.get(*field).and_then(Value::as_str))
        .find_map(scan_command_for_path)
}

/// Best-effort scan of a shell command for an absolute path token.
pub fn scan_command_for_path(command: &str) -> Option<String> {
    command
        .split(|c: char| c.is_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')' | '<' | '>'))
        .map(|token| token.trim_matches(|c| c == '"' || c == '\'' || c == '`'))
        .map(|token| token.rsplit_once('=').map_or(token, |(_, value)| value))
        .find(|token| looks_absolute(token))
        .map(|token| normalize_separators(&expand_home(token)))
}

fn looks_absolute(token: &str) -> bool {
    if token.len() < 2 {
        return false;
    }
    if token.starts_with('/') || token.starts_with("~/") {
        return true;
    }
    let bytes = token.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}/{rest}", home.to_string_lossy()),
        _ => path.to_string(),
    }
}
