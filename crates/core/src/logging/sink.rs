use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, error, info, trace, warn};

use crate::logging::log_entry::StandardLogEntry;
use crate::logging::log_level::LogLevel;

/// Destination for structured log entries.
pub trait LogSink: Send + Sync {
    fn write(&self, entry: &StandardLogEntry);
}

/// One JSON object per line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, entry: &StandardLogEntry) {
        let output = entry
            .to_json()
            .unwrap_or_else(|_| "Invalid log entry".to_string());
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{output}");
    }
}

/// Re-emits entries as `tracing` events so they go through the installed subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, entry: &StandardLogEntry) {
        let context = entry.context.as_deref().unwrap_or_default();
        let method = entry.method_name.as_deref().unwrap_or_default();
        let transaction_id = entry.transaction_id.as_deref().unwrap_or_default();
        let processing_time = entry.processing_time.as_deref().unwrap_or_default();
        let request = entry.request.as_ref().map(ToString::to_string).unwrap_or_default();
        let response = entry.response.as_ref().map(ToString::to_string).unwrap_or_default();

        macro_rules! emit {
            ($macro:ident) => {
                $macro!(
                    context,
                    method_name = method,
                    transaction_id,
                    processing_time,
                    request,
                    response,
                    "{}",
                    entry.message
                )
            };
        }

        match entry.level {
            LogLevel::Trace => emit!(trace),
            LogLevel::Debug => emit!(debug),
            LogLevel::Info => emit!(info),
            LogLevel::Warn => emit!(warn),
            LogLevel::Error => emit!(error),
        }
    }
}

/// Keeps entries in memory. Used by tests and embedders that inspect output.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<StandardLogEntry>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry written so far
    pub fn entries(&self) -> Vec<StandardLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages in write order
    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|entry| entry.message).collect()
    }

    /// Number of entries written
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every captured entry
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Entries written under the given transaction id, in write order
    pub fn for_transaction(&self, transaction_id: &str) -> Vec<StandardLogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.transaction_id.as_deref() == Some(transaction_id))
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, entry: &StandardLogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}
