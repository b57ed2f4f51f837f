use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub observers: ObserversConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            state: StateConfig::default(),
            session: SessionConfig::default(),
            context: ContextConfig::default(),
            observers: ObserversConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "ckstate_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Per-key value history kept by the engine.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Per-(type, id) event bucket bound in the event store.
    #[serde(default = "default_max_events_per_key")]
    pub max_events_per_key: usize,

    #[serde(default = "default_event_retention_secs")]
    pub event_retention_secs: u64,

    #[serde(default = "default_event_cleanup_interval_secs")]
    pub event_cleanup_interval_secs: u64,

    /// Bounded observer queue; events are dropped (and counted) when full.
    #[serde(default = "default_observer_queue_capacity")]
    pub observer_queue_capacity: usize,
}

fn default_history_limit() -> usize {
    100
}

fn default_max_events_per_key() -> usize {
    1000
}

fn default_event_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_event_cleanup_interval_secs() -> u64 {
    60 * 60
}

fn default_observer_queue_capacity() -> usize {
    1024
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_events_per_key: default_max_events_per_key(),
            event_retention_secs: default_event_retention_secs(),
            event_cleanup_interval_secs: default_event_cleanup_interval_secs(),
            observer_queue_capacity: default_observer_queue_capacity(),
        }
    }
}

impl StateConfig {
    pub fn event_retention(&self) -> Duration {
        Duration::from_secs(self.event_retention_secs)
    }

    pub fn event_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.event_cleanup_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_sessions() -> usize {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl SessionConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_cache_max_entries() -> usize {
    1000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

impl ContextConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserversConfig {
    #[serde(default = "default_true")]
    pub logging: bool,

    #[serde(default = "default_true")]
    pub metrics: bool,

    #[serde(default = "default_true")]
    pub audit: bool,

    #[serde(default)]
    pub alerting: bool,

    #[serde(default = "default_metrics_window_secs")]
    pub metrics_window_secs: u64,

    #[serde(default = "default_audit_max_entries")]
    pub audit_max_entries: usize,
}

fn default_true() -> bool {
    true
}

fn default_metrics_window_secs() -> u64 {
    5 * 60
}

fn default_audit_max_entries() -> usize {
    1000
}

impl Default for ObserversConfig {
    fn default() -> Self {
        Self {
            logging: true,
            metrics: true,
            audit: true,
            alerting: false,
            metrics_window_secs: default_metrics_window_secs(),
            audit_max_entries: default_audit_max_entries(),
        }
    }
}

impl ObserversConfig {
    pub fn metrics_window(&self) -> Duration {
        Duration::from_secs(self.metrics_window_secs.max(1))
    }
}
