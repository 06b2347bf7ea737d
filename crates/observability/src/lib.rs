//! Tracing adapter, telemetry bootstrap and execution metrics.

pub mod apm;
pub mod metrics_collector;
pub mod otel_backend;
pub mod telemetry_setup;
pub mod tracer;

pub use apm::{
    sanitize_label_key, ApmBackend, ApmError, ApmResult, CapturedError, LabelValue, Outcome,
    SpanHandle,
};
pub use metrics_collector::{init_metrics, MetricsCollector};
pub use otel_backend::OtelApmBackend;
pub use telemetry_setup::{
    build_tracer_provider, init_structured_logging, init_telemetry, TelemetryGuard,
};
pub use tracer::{in_transaction, ApmTracer, TraceSpan, TraceTransaction};
