//! Core building blocks of the execution instrumentation layer: transaction
//! context propagation, safe serialization, timing, the error envelope and
//! the structured logger.

pub mod config;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod logging;
pub mod serializer;
pub mod timer;

pub use config::{ApmConfig, ServerConfig, TrazaConfig};
pub use context::{
    current, current_transaction_id, resolve_transaction_id, run, run_sync, spawn_in_context,
    SequentialGenerator, TransactionContext, TransactionIdGenerator, UuidGenerator,
};
pub use envelope::ApiErrorEnvelope;
pub use errors::{TrazaError, TrazaResult};
pub use logging::{
    LogConfig, LogLevel, LogMetadata, LogSink, MemorySink, OutputFormat, ProcessHandle,
    SinkKind, StandardLogEntry, StdoutSink, StructuredLogger, TracingSink,
};
pub use serializer::{serialize_for_log, to_log_string, to_log_value, SafeLog, Shared};
pub use timer::ExecutionTimer;
