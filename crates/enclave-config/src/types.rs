use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
    /// Execution supervisor settings.
    pub executor: ExecutorSection,
    /// Session negotiator settings.
    pub multichain: MultichainSection,
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["enclave_executor=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutorSection
// ---------------------------------------------------------------------------

/// Execution supervisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Buffered messages per direction on each runtime channel.
    pub channel_capacity: usize,
    /// Lifecycle events buffered on the event bus.
    pub event_capacity: usize,
    /// Program and arguments the process backend spawns per plugin.
    pub runtime_command: Vec<String>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            event_capacity: 1024,
            runtime_command: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// MultichainSection
// ---------------------------------------------------------------------------

/// Session negotiator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultichainSection {
    /// Approval request type used for conflict resolution.
    pub approval_type: String,
    /// Whether bound plugins receive a disconnect notification on close.
    pub notify_on_close: bool,
}

impl Default for MultichainSection {
    fn default() -> Self {
        Self {
            approval_type: "multichain_connect".to_owned(),
            notify_on_close: true,
        }
    }
}
