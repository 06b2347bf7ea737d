use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::context;
use crate::logging::log_config::{LogConfig, SinkKind};
use crate::logging::log_entry::{LogMetadata, StandardLogEntry};
use crate::logging::log_level::LogLevel;
use crate::logging::sink::{LogSink, StdoutSink, TracingSink};
use crate::serializer::{serialize_for_log, SafeLog};
use crate::timer::{ExecutionTimer, ZERO_ELAPSED};

/// Leveled JSON logger bound to a context name (usually the owning type).
///
/// Cloning is cheap: clones share the same sink.
#[derive(Clone)]
pub struct StructuredLogger {
    /// Name stamped on every entry
    context: String,
    /// Minimum level written
    log_level: LogLevel,
    /// Payload size limit in characters
    max_log_size: Option<usize>,
    /// Destination of every entry
    sink: Arc<dyn LogSink>,
}

impl StructuredLogger {
    /// INFO logger writing JSON lines to stdout
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            log_level: LogLevel::Info,
            max_log_size: None,
            sink: Arc::new(StdoutSink),
        }
    }

    /// Logger configured from a [`LogConfig`]
    pub fn with_config(context: impl Into<String>, config: &LogConfig) -> Self {
        let sink: Arc<dyn LogSink> = match config.sink {
            SinkKind::Stdout => Arc::new(StdoutSink),
            SinkKind::Tracing => Arc::new(TracingSink),
        };
        Self {
            context: context.into(),
            log_level: config.level,
            max_log_size: config.max_log_size,
            sink,
        }
    }

    /// Write to `sink` instead
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Set the minimum level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Bound request and response payloads; `None` or `0` disables the limit
    pub fn with_max_log_size(mut self, max_log_size: Option<usize>) -> Self {
        self.max_log_size = max_log_size.filter(|size| *size > 0);
        self
    }

    /// Same sink and settings under another context name
    pub fn for_context(&self, context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..self.clone()
        }
    }

    /// Context name
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Payload size limit in characters, `None` when unlimited
    pub fn max_log_size(&self) -> Option<usize> {
        self.max_log_size
    }

    /// Minimum level written
    pub fn level(&self) -> LogLevel {
        self.log_level
    }

    /// Change the minimum level in place
    pub fn set_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }

    /// Alias of [`StructuredLogger::info`]
    pub fn log(&self, message: &str, metadata: LogMetadata) {
        self.write(LogLevel::Info, message, metadata, None);
    }

    /// Write an INFO entry
    pub fn info(&self, message: &str, metadata: LogMetadata) {
        self.write(LogLevel::Info, message, metadata, None);
    }

    /// Write an ERROR entry
    pub fn error(&self, message: &str, metadata: LogMetadata) {
        self.write(LogLevel::Error, message, metadata, None);
    }

    /// Write a WARN entry
    pub fn warn(&self, message: &str, metadata: LogMetadata) {
        self.write(LogLevel::Warn, message, metadata, None);
    }

    /// Write a DEBUG entry
    pub fn debug(&self, message: &str, metadata: LogMetadata) {
        self.write(LogLevel::Debug, message, metadata, None);
    }

    /// Write a TRACE entry
    pub fn trace(&self, message: &str, metadata: LogMetadata) {
        self.write(LogLevel::Trace, message, metadata, None);
    }

    /// Write one entry, optionally under a context name other than the logger's.
    ///
    /// Entries below the configured level are dropped before any payload is
    /// serialized. The transaction id comes from `metadata` or, failing that,
    /// from the active transaction context.
    pub fn write(
        &self,
        level: LogLevel,
        message: &str,
        metadata: LogMetadata,
        context: Option<&str>,
    ) {
        if level < self.log_level {
            return;
        }

        let transaction_id = metadata
            .transaction_id
            .or_else(context::current_transaction_id);

        let entry = StandardLogEntry {
            level,
            message: message.to_string(),
            timestamp: Utc::now(),
            context: Some(context.unwrap_or(&self.context).to_string()),
            method_name: metadata.method_name,
            transaction_id,
            request: metadata.request.map(|value| self.bound(value)),
            response: metadata.response.map(|value| self.bound(value)),
            processing_time: metadata.processing_time,
            extra: metadata.extra,
        };

        self.sink.write(&entry);
    }

    /// Log a start entry now and return a handle that logs the matching end entry.
    pub fn start_process(&self, message: &str, metadata: LogMetadata) -> ProcessHandle {
        let metadata = match metadata.transaction_id {
            Some(_) => metadata,
            None => match context::current_transaction_id() {
                Some(transaction_id) => metadata.with_transaction_id(transaction_id),
                None => metadata,
            },
        };

        self.info(
            message,
            metadata.clone().with_processing_time(ZERO_ELAPSED),
        );

        ProcessHandle {
            logger: self.clone(),
            message: message.to_string(),
            metadata,
            timer: ExecutionTimer::start(),
        }
    }

    fn bound(&self, value: Value) -> Value {
        if let SafeLog::Truncated(text) = serialize_for_log(&value, self.max_log_size) {
            return Value::String(text);
        }
        value
    }
}

impl std::fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("context", &self.context)
            .field("log_level", &self.log_level)
            .field("max_log_size", &self.max_log_size)
            .finish_non_exhaustive()
    }
}

/// Pending start/end pair created by [`StructuredLogger::start_process`].
#[derive(Debug)]
pub struct ProcessHandle {
    /// Logger that wrote the start entry
    logger: StructuredLogger,
    /// Start message, reused for the default end message
    message: String,
    /// Start metadata, merged into the end entry
    metadata: LogMetadata,
    /// Started with the start entry
    timer: ExecutionTimer,
}

impl ProcessHandle {
    /// Log the end entry with the time elapsed since the start entry.
    ///
    /// Defaults: message `"<start message> - finalizado"`, level INFO. Start
    /// metadata is carried over and overlaid with `end_metadata`.
    pub fn end_process(
        self,
        end_message: Option<&str>,
        end_metadata: Option<LogMetadata>,
        level: Option<LogLevel>,
    ) {
        let message = end_message
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} - finalizado", self.message));
        let metadata = self
            .metadata
            .merge(end_metadata.unwrap_or_default())
            .with_processing_time(self.timer.end());

        self.logger
            .write(level.unwrap_or(LogLevel::Info), &message, metadata, None);
    }
}
