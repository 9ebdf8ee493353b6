//! Remote-shell session bootstrap.
//!
//! Starts the shell-sharing process inside a container and scans its
//! streamed output for the session address. Never fails: the result is
//! always a resolved address, a direct fallback, or an error sentinel.

use futures::StreamExt;
use hearth_runtime::{ExecStream, RuntimeAdapter, RuntimeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Default deadline for finding the session marker.
pub const DEFAULT_SESSION_DEADLINE: Duration = Duration::from_secs(30);

/// How to reach an instance's shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SessionDescriptor {
    /// Address announced by the shell-sharing process.
    Resolved(String),
    /// Direct SSH command against the published host port.
    Fallback(String),
    /// Bootstrap could not run; holds the cause.
    Error(String),
}

impl SessionDescriptor {
    /// Whether the shell-sharing process announced an address.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Whether bootstrap failed outright.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for SessionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(addr) | Self::Fallback(addr) => write!(f, "{addr}"),
            Self::Error(cause) => write!(f, "session-error: {cause}"),
        }
    }
}

/// Session bootstrap settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Command that starts the shell-sharing process in the foreground.
    pub command: Vec<String>,
    /// Text preceding the address on the announcement line.
    pub marker: String,
    /// Deadline for the whole output scan.
    pub deadline: Duration,
    /// Host used in the direct fallback command.
    pub fallback_host: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: vec!["tmate".to_string(), "-F".to_string()],
            marker: "ssh session:".to_string(),
            deadline: DEFAULT_SESSION_DEADLINE,
            fallback_host: "localhost".to_string(),
        }
    }
}

/// Starts the shell-sharing process and extracts its address.
pub struct SessionBootstrapper {
    runtime: Arc<dyn RuntimeAdapter>,
    config: SessionConfig,
}

impl SessionBootstrapper {
    /// Create a bootstrapper over the given runtime.
    pub fn new(runtime: Arc<dyn RuntimeAdapter>, config: SessionConfig) -> Self {
        Self { runtime, config }
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Direct SSH command for a published host port.
    pub fn fallback_for(&self, host_port: u16) -> SessionDescriptor {
        SessionDescriptor::Fallback(format!(
            "ssh root@{} -p {host_port}",
            self.config.fallback_host
        ))
    }

    /// Bootstrap a session inside `container`.
    pub async fn bootstrap(&self, container: &str, host_port: u16) -> SessionDescriptor {
        let start = std::time::Instant::now();
        tracing::debug!(container = %container, cmd = ?self.config.command, "Starting session process");

        let stream = match self.runtime.exec(container, &self.config.command, true).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(container = %container, error = %e, "Session exec failed");
                return SessionDescriptor::Error(e.to_string());
            }
        };

        match timeout(self.config.deadline, scan_for_marker(stream, &self.config.marker)).await {
            Ok(Ok(Some(addr))) => {
                tracing::info!(
                    container = %container,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Session address resolved"
                );
                SessionDescriptor::Resolved(addr)
            }
            Ok(Ok(None)) => {
                tracing::warn!(container = %container, "Session output ended without marker, using direct address");
                self.fallback_for(host_port)
            }
            Ok(Err(e)) => {
                tracing::warn!(container = %container, error = %e, "Session output stream failed");
                SessionDescriptor::Error(e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    container = %container,
                    deadline_secs = self.config.deadline.as_secs(),
                    "Session marker not seen before deadline, using direct address"
                );
                self.fallback_for(host_port)
            }
        }
    }
}

/// Read the stream line by line until a line carries `marker`.
///
/// Returns on the first match, dropping the rest of the stream.
async fn scan_for_marker(mut stream: ExecStream, marker: &str) -> Result<Option<String>, RuntimeError> {
    let mut buffer = String::new();
    while let Some(chunk) = stream.next().await {
        buffer.push_str(&chunk?);
        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            if let Some(addr) = parse_marker_line(&line, marker) {
                return Ok(Some(addr));
            }
        }
    }
    Ok(parse_marker_line(&buffer, marker))
}

/// Extract the address following `marker` on a line, if present.
fn parse_marker_line(line: &str, marker: &str) -> Option<String> {
    let (_, rest) = line.split_once(marker)?;
    let addr = rest.trim();
    (!addr.is_empty()).then(|| addr.to_string())
}
