//! Fire-and-forget workflow log sinks.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

pub trait WorkflowLogger: Send + Sync {
    /// Records one message for a workflow. Sink failures are swallowed.
    fn record(&self, workflow: &str, message: &str);
}

/// Default sink: one `tracing` event per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl WorkflowLogger for TracingLogger {
    fn record(&self, workflow: &str, message: &str) {
        let timestamp = Utc::now().to_rfc3339();
        if message.starts_with("Error") {
            tracing::warn!(workflow, %timestamp, "{message}");
        } else {
            tracing::info!(workflow, %timestamp, "{message}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub workflow: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Keeps entries in memory, for audit trails and tests.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl WorkflowLogger for MemoryLogger {
    fn record(&self, workflow: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                workflow: workflow.to_string(),
                timestamp: Utc::now(),
                message: message.to_string(),
            });
        }
    }
}
