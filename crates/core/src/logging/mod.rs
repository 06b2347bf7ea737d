pub mod log_config;
pub mod log_entry;
pub mod log_level;
pub mod sink;
pub mod structured_logger;

pub use log_config::{parse_max_log_size, LogConfig, OutputFormat, SinkKind};
pub use log_entry::{LogMetadata, StandardLogEntry};
pub use log_level::LogLevel;
pub use sink::{LogSink, MemorySink, StdoutSink, TracingSink};
pub use structured_logger::{ProcessHandle, StructuredLogger};
