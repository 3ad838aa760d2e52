//! Configuration resolution for Parley.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/parley/settings.json`)
//! 3. Project config (`.parley/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::exchange::{DIR_ENV, ExchangeDir, RequestKind};
use crate::permissions::PermissionMode;

/// Complete Parley configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            timeouts: TimeoutConfig::default(),
            permissions: PermissionConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Exchange channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Explicit exchange directory; falls back to `PARLEY_PERMISSION_DIR`
    /// and then the system temp dir.
    pub dir: Option<PathBuf>,
    /// Host-side directory poll interval (milliseconds).
    pub broker_poll_interval_ms: u64,
    /// Agent-side response poll interval (milliseconds).
    pub emitter_poll_interval_ms: u64,
    /// Also serve requests over a Unix domain socket.
    pub socket_enabled: bool,
    /// Socket path override; defaults to `parley.sock` in the exchange dir.
    pub socket_path: Option<PathBuf>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            dir: None,
            broker_poll_interval_ms: 500,
            emitter_poll_interval_ms: 100,
            socket_enabled: false,
            socket_path: None,
        }
    }
}

impl ExchangeConfig {
    pub const fn broker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.broker_poll_interval_ms)
    }

    pub const fn emitter_poll_interval(&self) -> Duration {
        Duration::from_millis(self.emitter_poll_interval_ms)
    }

    /// Open the configured exchange directory, or the resolved default.
    pub fn open_dir(&self) -> Result<ExchangeDir> {
        match &self.dir {
            Some(dir) => ExchangeDir::open(dir.clone()),
            None => ExchangeDir::resolve(),
        }
    }

    /// Socket location for the socket transport.
    pub fn socket_path(&self, dir: &ExchangeDir) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| dir.socket_path())
    }
}

/// Negotiation timeouts.
///
/// The agent waits for the full emitter timeout; the host gives up on its
/// dialog `host_margin_secs` earlier, so the host always settles first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub permission_secs: u64,
    pub question_secs: u64,
    pub plan_secs: u64,
    pub host_margin_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            permission_secs: 60,
            question_secs: 60,
            plan_secs: 300,
            host_margin_secs: 5,
        }
    }
}

impl TimeoutConfig {
    /// How long the agent polls for a response.
    pub const fn emitter_timeout(&self, kind: RequestKind) -> Duration {
        Duration::from_secs(match kind {
            RequestKind::Permission => self.permission_secs,
            RequestKind::Question => self.question_secs,
            RequestKind::Plan => self.plan_secs,
        })
    }

    /// How long the host keeps a dialog open before failing closed.
    pub fn dialog_timeout(&self, kind: RequestKind) -> Duration {
        let emitter = self.emitter_timeout(kind);
        let margin = Duration::from_secs(self.host_margin_secs);
        if emitter > margin {
            emitter - margin
        } else {
            emitter / 2
        }
    }
}

/// Permission policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Initial global mode of the host.
    pub mode: PermissionMode,
    /// System prefixes the agent refuses to touch without asking anyone.
    pub deny_prefixes: Vec<String>,
    /// Temp prefixes the agent rewrites under the project root.
    pub temp_prefixes: Vec<String>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            mode: PermissionMode::Default,
            deny_prefixes: [
                "/etc/",
                "/System/",
                "/usr/",
                "/bin/",
                "/sbin/",
                "/boot/",
                "/dev/",
                "/proc/",
                "/sys/",
                "C:/Windows/",
                "C:/Program Files/",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            temp_prefixes: ["/tmp/", "/var/tmp/", "/private/tmp/"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let layers = [
        global_config_path(),
        project_dir.map(|dir| dir.join(".parley").join("settings.json")),
    ];
    let mut config = load_layers(layers.into_iter().flatten())?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Merge existing config files, lowest priority first, over the defaults.
///
/// Layers merge key by key, so a file only replaces the fields it names.
fn load_layers(paths: impl IntoIterator<Item = PathBuf>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in paths {
        if path.exists() {
            merge_values(&mut merged, load_config_file(&path)?);
        }
    }
    serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("parley").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var(DIR_ENV) {
        if !val.trim().is_empty() {
            config.exchange.dir = Some(PathBuf::from(val));
        }
    }
    if let Ok(val) = std::env::var("PARLEY_MODE") {
        match val.parse() {
            Ok(mode) => config.permissions.mode = mode,
            Err(e) => tracing::warn!(error = %e, "Ignoring PARLEY_MODE"),
        }
    }
    if let Ok(val) = std::env::var("PARLEY_LOG_LEVEL") {
        config.log_level = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_protocol() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(
            timeouts.emitter_timeout(RequestKind::Permission),
            Duration::from_secs(60)
        );
        assert_eq!(
            timeouts.emitter_timeout(RequestKind::Question),
            Duration::from_secs(60)
        );
        assert_eq!(
            timeouts.emitter_timeout(RequestKind::Plan),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn host_dialog_gives_up_before_agent() {
        let timeouts = TimeoutConfig::default();
        for kind in RequestKind::ALL {
            assert!(timeouts.dialog_timeout(kind) < timeouts.emitter_timeout(kind));
        }

        let tight = TimeoutConfig {
            permission_secs: 2,
            host_margin_secs: 5,
            ..TimeoutConfig::default()
        };
        assert_eq!(
            tight.dialog_timeout(RequestKind::Permission),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn default_poll_intervals() {
        let exchange = ExchangeConfig::default();
        assert_eq!(exchange.broker_poll_interval(), Duration::from_millis(500));
        assert_eq!(exchange.emitter_poll_interval(), Duration::from_millis(100));
    }

    fn write_settings(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn partial_project_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let project = write_settings(
            tmp.path(),
            "project.json",
            r#"{"permissions":{"mode":"acceptEdits"},"timeouts":{"plan_secs":120}}"#,
        );

        let config = load_layers([project]).unwrap();
        assert_eq!(config.permissions.mode, PermissionMode::AcceptEdits);
        assert_eq!(
            config.permissions.deny_prefixes,
            PermissionConfig::default().deny_prefixes
        );
        assert_eq!(config.timeouts.plan_secs, 120);
        assert_eq!(config.timeouts.permission_secs, 60);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn project_layer_keeps_unrelated_global_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let global = write_settings(
            tmp.path(),
            "global.json",
            r#"{"permissions":{"deny_prefixes":["/srv/secrets/"]},"timeouts":{"permission_secs":30}}"#,
        );
        let project = write_settings(
            tmp.path(),
            "project.json",
            r#"{"exchange":{"dir":"/run/parley"},"timeouts":{"plan_secs":90}}"#,
        );

        let config = load_layers([global, project, tmp.path().join("missing.json")]).unwrap();
        assert_eq!(config.exchange.dir, Some(PathBuf::from("/run/parley")));
        assert_eq!(config.permissions.deny_prefixes, vec!["/srv/secrets/".to_string()]);
        assert_eq!(config.timeouts.permission_secs, 30);
        assert_eq!(config.timeouts.plan_secs, 90);
        assert_eq!(config.exchange.broker_poll_interval_ms, 500);
    }

    #[test]
    fn malformed_layer_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = write_settings(tmp.path(), "bad.json", r#"{"timeouts":{"plan_secs":"soon"}}"#);
        assert!(matches!(load_layers([bad]), Err(Error::Config(_))));
    }
}
