//! Backend seam of the tracing adapter.
//!
//! An [`ApmBackend`] opens transactions and spans and hands back
//! [`SpanHandle`]s. Every method is fallible so the façade in
//! [`crate::tracer`] can contain failures; implementations never need to
//! guard themselves.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApmError {
    #[error("APM backend unavailable: {0}")]
    Unavailable(String),

    #[error("APM span already ended: {0}")]
    AlreadyEnded(String),

    #[error("APM backend error: {0}")]
    Backend(String),
}

pub type ApmResult<T> = std::result::Result<T, ApmError>;

/// Result of a transaction as reported to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Str(value) => f.write_str(value),
            LabelValue::Int(value) => write!(f, "{value}"),
            LabelValue::Float(value) => write!(f, "{value}"),
            LabelValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Str(value.to_string())
    }
}

impl From<String> for LabelValue {
    fn from(value: String) -> Self {
        LabelValue::Str(value)
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        LabelValue::Int(value)
    }
}

impl From<f64> for LabelValue {
    fn from(value: f64) -> Self {
        LabelValue::Float(value)
    }
}

impl From<bool> for LabelValue {
    fn from(value: bool) -> Self {
        LabelValue::Bool(value)
    }
}

/// Error as handed to the backend: type name, message and cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct CapturedError {
    pub name: String,
    pub message: String,
    pub chain: Vec<String>,
}

impl CapturedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            chain: Vec::new(),
        }
    }

    /// Capture an error together with its `source()` chain.
    pub fn from_error(name: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            name: name.into(),
            message: error.to_string(),
            chain,
        }
    }

    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.chain = chain;
        self
    }
}

/// A live transaction or span inside the backend.
pub trait SpanHandle: Send + Sync {
    fn name(&self) -> &str;

    /// `key` arrives already sanitized
    fn set_label(&self, key: &str, value: LabelValue) -> ApmResult<()>;

    fn set_outcome(&self, outcome: Outcome) -> ApmResult<()>;

    fn capture_error(&self, error: &CapturedError) -> ApmResult<()>;

    fn end(&self) -> ApmResult<()>;

    /// OpenTelemetry context of this handle, when the backend has one
    fn otel_context(&self) -> Option<opentelemetry::Context> {
        None
    }
}

/// APM-style tracing service.
pub trait ApmBackend: Send + Sync {
    fn is_active(&self) -> bool;

    /// Start a top-level transaction of the given kind (e.g. `request`)
    fn start_transaction(&self, name: &str, kind: &str) -> ApmResult<Arc<dyn SpanHandle>>;

    /// Start a span, as a child of `parent` when given
    fn start_span(
        &self,
        parent: Option<&dyn SpanHandle>,
        name: &str,
        span_type: &str,
        subtype: Option<&str>,
        action: Option<&str>,
    ) -> ApmResult<Arc<dyn SpanHandle>>;

    /// Record an error that happened outside any transaction
    fn capture_orphan_error(&self, error: &CapturedError) -> ApmResult<()>;
}

/// Make a label key acceptable to strict backends.
///
/// `.` becomes `_`, every character outside `[a-zA-Z0-9_]` becomes `_`, and
/// the result is lower-cased.
pub fn sanitize_label_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
