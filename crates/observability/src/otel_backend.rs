use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::apm::{
    ApmBackend, ApmError, ApmResult, CapturedError, LabelValue, Outcome, SpanHandle,
};

pub const INSTRUMENTATION_NAME: &str = "traza";

/// [`ApmBackend`] on top of an OpenTelemetry tracer.
///
/// Transactions are `Server` spans parented on the current `tracing` span,
/// spans are `Internal` children, labels become attributes and outcomes
/// become span status.
pub struct OtelApmBackend {
    tracer: BoxedTracer,
    active: bool,
}

impl OtelApmBackend {
    pub fn new(tracer: BoxedTracer, active: bool) -> Self {
        Self { tracer, active }
    }

    pub fn from_provider(provider: &SdkTracerProvider, active: bool) -> Self {
        Self::new(
            BoxedTracer::new(Box::new(provider.tracer(INSTRUMENTATION_NAME))),
            active,
        )
    }

    /// Use whatever provider is installed globally
    pub fn from_global(active: bool) -> Self {
        Self::new(opentelemetry::global::tracer(INSTRUMENTATION_NAME), active)
    }

    fn start(
        &self,
        name: &str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        parent: &Context,
    ) -> OtelSpanHandle {
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);

        OtelSpanHandle {
            name: name.to_string(),
            context: parent.with_span(span),
            ended: AtomicBool::new(false),
        }
    }
}

impl ApmBackend for OtelApmBackend {
    fn is_active(&self) -> bool {
        self.active
    }

    fn start_transaction(&self, name: &str, kind: &str) -> ApmResult<Arc<dyn SpanHandle>> {
        let parent = tracing::Span::current().context();
        let attributes = vec![KeyValue::new("transaction.type", kind.to_string())];
        Ok(Arc::new(self.start(name, SpanKind::Server, attributes, &parent)))
    }

    fn start_span(
        &self,
        parent: Option<&dyn SpanHandle>,
        name: &str,
        span_type: &str,
        subtype: Option<&str>,
        action: Option<&str>,
    ) -> ApmResult<Arc<dyn SpanHandle>> {
        let parent = parent
            .and_then(|handle| handle.otel_context())
            .unwrap_or_else(|| tracing::Span::current().context());

        let mut attributes = vec![KeyValue::new("span.type", span_type.to_string())];
        if let Some(subtype) = subtype {
            attributes.push(KeyValue::new("span.subtype", subtype.to_string()));
        }
        if let Some(action) = action {
            attributes.push(KeyValue::new("span.action", action.to_string()));
        }

        Ok(Arc::new(self.start(name, SpanKind::Internal, attributes, &parent)))
    }

    fn capture_orphan_error(&self, error: &CapturedError) -> ApmResult<()> {
        let parent = tracing::Span::current().context();
        let handle = self.start("error", SpanKind::Internal, Vec::new(), &parent);
        handle.capture_error(error)?;
        handle.end()
    }
}

struct OtelSpanHandle {
    name: String,
    context: Context,
    ended: AtomicBool,
}

impl OtelSpanHandle {
    fn ensure_live(&self) -> ApmResult<()> {
        if self.ended.load(Ordering::Acquire) {
            return Err(ApmError::AlreadyEnded(self.name.clone()));
        }
        Ok(())
    }
}

fn otel_value(value: LabelValue) -> opentelemetry::Value {
    match value {
        LabelValue::Str(value) => value.into(),
        LabelValue::Int(value) => value.into(),
        LabelValue::Float(value) => value.into(),
        LabelValue::Bool(value) => value.into(),
    }
}

impl SpanHandle for OtelSpanHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_label(&self, key: &str, value: LabelValue) -> ApmResult<()> {
        self.ensure_live()?;
        self.context
            .span()
            .set_attribute(KeyValue::new(key.to_string(), otel_value(value)));
        Ok(())
    }

    fn set_outcome(&self, outcome: Outcome) -> ApmResult<()> {
        self.ensure_live()?;
        let span = self.context.span();
        span.set_attribute(KeyValue::new("outcome", outcome.as_str()));
        span.set_status(match outcome {
            Outcome::Success => Status::Ok,
            Outcome::Failure => Status::error("failure"),
            Outcome::Unknown => Status::Unset,
        });
        Ok(())
    }

    fn capture_error(&self, error: &CapturedError) -> ApmResult<()> {
        self.ensure_live()?;
        let span = self.context.span();
        span.record_error(error);
        span.set_attribute(KeyValue::new("error.type", error.name.clone()));
        span.set_status(Status::error(error.message.clone()));
        Ok(())
    }

    fn end(&self) -> ApmResult<()> {
        if self.ended.swap(true, Ordering::AcqRel) {
            return Err(ApmError::AlreadyEnded(self.name.clone()));
        }
        self.context.span().end();
        Ok(())
    }

    fn otel_context(&self) -> Option<Context> {
        Some(self.context.clone())
    }
}
