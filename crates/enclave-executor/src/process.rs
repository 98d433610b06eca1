//! A runtime backend that runs each plugin in its own child process.
//!
//! Messages travel as newline-delimited JSON over the child's stdin and
//! stdout. The child's stderr is inherited so runtime diagnostics land next to
//! the host's own logs.

use std::process::Stdio;

use async_trait::async_trait;
use enclave_config::ExecutorSection;
use enclave_core::PluginId;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{RuntimeBackend, RuntimeChannel};
use crate::error::{ExecutorError, ExecutorResult};

/// Longest line accepted from a runtime (16 MB). Longer lines are dropped.
const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// How to launch a runtime process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBackendConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments placed before the plugin id, which is always last.
    pub args: Vec<String>,
    /// Buffered messages per direction.
    pub channel_capacity: usize,
}

impl ProcessBackendConfig {
    /// Launch `program` with no extra arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            channel_capacity: 64,
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl TryFrom<&ExecutorSection> for ProcessBackendConfig {
    type Error = ExecutorError;

    fn try_from(section: &ExecutorSection) -> ExecutorResult<Self> {
        let (program, args) = section
            .runtime_command
            .split_first()
            .ok_or_else(|| ExecutorError::Backend("executor.runtime_command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            channel_capacity: section.channel_capacity,
        })
    }
}

/// Spawns one child process per plugin.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    config: ProcessBackendConfig,
}

impl ProcessBackend {
    /// Create a backend launching runtimes as described by `config`.
    #[must_use]
    pub fn new(config: ProcessBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RuntimeBackend for ProcessBackend {
    async fn spawn(&self, plugin_id: &PluginId) -> ExecutorResult<RuntimeChannel> {
        info!(
            plugin_id = %plugin_id,
            program = %self.config.program,
            "Spawning runtime process"
        );

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(plugin_id.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutorError::Backend(format!("failed to spawn {}: {e}", self.config.program))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutorError::Backend("runtime stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::Backend("runtime stdout not available".into()))?;

        let capacity = self.config.channel_capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);

        tokio::spawn(write_loop(plugin_id.clone(), child, stdin, out_rx));
        tokio::spawn(read_loop(plugin_id.clone(), stdout, in_tx));

        Ok(RuntimeChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Owns the child. Kills it once the host drops the outbound sender.
async fn write_loop(
    plugin_id: PluginId,
    mut child: Child,
    mut stdin: ChildStdin,
    mut outbound: mpsc::Receiver<Value>,
) {
    while let Some(message) = outbound.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!(plugin_id = %plugin_id, error = %e, "Failed to encode message for runtime");
                continue;
            },
        };
        line.push(b'\n');
        if let Err(e) = stdin.write_all(&line).await {
            debug!(plugin_id = %plugin_id, error = %e, "Runtime stdin closed");
            break;
        }
        if let Err(e) = stdin.flush().await {
            debug!(plugin_id = %plugin_id, error = %e, "Runtime stdin closed");
            break;
        }
    }

    drop(stdin);
    if let Err(e) = child.kill().await {
        debug!(plugin_id = %plugin_id, error = %e, "Runtime process already gone");
    }
    debug!(plugin_id = %plugin_id, "Runtime process stopped");
}

/// Forwards stdout lines as JSON values. Closing `inbound` tells the host the
/// runtime is gone.
async fn read_loop(plugin_id: PluginId, stdout: ChildStdout, inbound: mpsc::Sender<Value>) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.len() > MAX_LINE_LENGTH {
                    warn!(plugin_id = %plugin_id, len = trimmed.len(), "Dropping oversized runtime message");
                    continue;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(message) => {
                        if inbound.send(message).await.is_err() {
                            break;
                        }
                    },
                    Err(e) => {
                        warn!(plugin_id = %plugin_id, error = %e, "Skipping malformed runtime output");
                    },
                }
            },
            Err(e) => {
                warn!(plugin_id = %plugin_id, error = %e, "Error reading runtime stdout");
                break;
            },
        }
    }
    debug!(plugin_id = %plugin_id, "Runtime stdout closed");
}

#[cfg(all(test, unix))]
mod tests {
    use serde_json::json;

    use super::*;

    fn sh(script: &str) -> ProcessBackend {
        ProcessBackend::new(
            ProcessBackendConfig::new("sh")
                .with_arg("-c")
                .with_arg(script)
                .with_arg("sh"),
        )
    }

    #[tokio::test]
    async fn test_messages_round_trip_through_child() {
        let backend = sh("exec cat");
        let mut channel = backend.spawn(&PluginId::from_static("npm:a")).await.unwrap();

        channel.outbound.send(json!({"id": 1, "result": "x"})).await.unwrap();
        assert_eq!(channel.inbound.recv().await.unwrap(), json!({"id": 1, "result": "x"}));
    }

    #[tokio::test]
    async fn test_plugin_id_is_last_argument() {
        let backend = sh("printf '{\"arg\":\"%s\"}\\n' \"$1\"; exec cat");
        let mut channel = backend.spawn(&PluginId::from_static("npm:a")).await.unwrap();
        assert_eq!(channel.inbound.recv().await.unwrap(), json!({"arg": "npm:a"}));
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() {
        let backend = sh("echo not-json; echo '{\"ok\":true}'");
        let mut channel = backend.spawn(&PluginId::from_static("npm:a")).await.unwrap();
        assert_eq!(channel.inbound.recv().await.unwrap(), json!({"ok": true}));
        assert!(channel.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_exit_closes_inbound() {
        let backend = sh("exit 0");
        let mut channel = backend.spawn(&PluginId::from_static("npm:a")).await.unwrap();
        assert!(channel.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let backend = ProcessBackend::new(ProcessBackendConfig::new("/nonexistent/runtime"));
        let err = backend.spawn(&PluginId::from_static("npm:a")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Backend(_)));
    }

    #[test]
    fn test_config_from_section() {
        let section = ExecutorSection {
            runtime_command: vec!["node".into(), "runtime.js".into()],
            channel_capacity: 8,
            ..Default::default()
        };
        let config = ProcessBackendConfig::try_from(&section).unwrap();
        assert_eq!(config.program, "node");
        assert_eq!(config.args, vec!["runtime.js"]);
        assert_eq!(config.channel_capacity, 8);

        assert!(ProcessBackendConfig::try_from(&ExecutorSection::default()).is_err());
    }
}
