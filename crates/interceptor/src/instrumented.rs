//! The execution wrapper.
//!
//! Every call through [`Instrumented::execute`] goes Entry, then either
//! Exit-success or Exit-failure. Per call it logs a start entry and one
//! closing entry, keeps the trace transaction labelled, and turns every
//! failure into exactly one [`ApiErrorEnvelope`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use traza_core::context::{self, TransactionContext, TransactionIdGenerator, UuidGenerator};
use traza_core::serializer::{
    bound_text, is_empty_value, serialize_for_log, to_log_string, to_log_value, SafeLog,
};
use traza_core::timer::{ExecutionTimer, ZERO_ELAPSED};
use traza_core::{ApiErrorEnvelope, LogMetadata, StructuredLogger};
use traza_observability::{
    in_transaction, ApmTracer, MetricsCollector, Outcome, TraceSpan, TraceTransaction,
};

use crate::component::ComponentType;
use crate::failure::Failure;
use crate::request::{extract_request_snapshot, CallArg};

/// Kind reported for transactions started by the wrapper.
pub const TRANSACTION_KIND: &str = "request";

/// Trace state of one call.
enum TraceScope {
    /// This call started the transaction and is the only one that ends it
    Started(TraceTransaction),
    /// An enclosing call owns the transaction; this call gets its own span
    Nested {
        transaction: TraceTransaction,
        span: Option<TraceSpan>,
    },
}

impl TraceScope {
    fn transaction(&self) -> &TraceTransaction {
        match self {
            TraceScope::Started(transaction) => transaction,
            TraceScope::Nested { transaction, .. } => transaction,
        }
    }
}

/// Instrumentation state of one component (controller, service, repository...).
///
/// Build it once per component instance and route each method call through
/// [`Instrumented::execute`].
pub struct Instrumented {
    class_name: String,
    component: ComponentType,
    logger: StructuredLogger,
    tracer: ApmTracer,
    metrics: MetricsCollector,
    generator: Arc<dyn TransactionIdGenerator>,
    cached_transaction_id: Mutex<Option<String>>,
}

impl Instrumented {
    /// Defaults: a stdout logger named after the class, no tracing backend, UUID ids.
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            component: ComponentType::classify(&class_name),
            logger: StructuredLogger::new(class_name.clone()),
            tracer: ApmTracer::disabled(),
            metrics: MetricsCollector::new(),
            generator: Arc::new(UuidGenerator),
            cached_transaction_id: Mutex::new(None),
            class_name,
        }
    }

    /// Use an already configured logger instead of the default one
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_tracer(mut self, tracer: ApmTracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn TransactionIdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn component_type(&self) -> ComponentType {
        self.component
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Run `future` as the instrumented method `method` called with `args`.
    ///
    /// The value is returned unchanged on success. On failure the caller gets
    /// an [`ApiErrorEnvelope`]: the one raised inside, if any, otherwise the
    /// generic internal error. Panics inside `future` count as failures.
    pub async fn execute<T, F>(
        &self,
        method: &str,
        args: &[CallArg],
        future: F,
    ) -> Result<T, ApiErrorEnvelope>
    where
        T: Serialize,
        F: Future<Output = anyhow::Result<T>>,
    {
        let timer = ExecutionTimer::start();
        let active = context::current();
        let transaction_id = match &active {
            Some(context) => context.transaction_id().to_string(),
            None => self.fallback_transaction_id(),
        };

        let snapshot = extract_request_snapshot(args);
        let trace = self.begin_trace(method, &transaction_id, &snapshot);

        self.logger.info(
            &self.message("Iniciando ejecución del método", method),
            LogMetadata::new()
                .with_method_name(method)
                .with_transaction_id(&transaction_id)
                .with_request(&snapshot)
                .with_processing_time(ZERO_ELAPSED),
        );

        let guarded = AssertUnwindSafe(future).catch_unwind();
        let traced = async {
            match &trace {
                Some(TraceScope::Started(transaction)) => {
                    in_transaction(transaction.clone(), guarded).await
                }
                _ => guarded.await,
            }
        };
        let result = match active {
            Some(_) => traced.await,
            None => context::run(TransactionContext::new(transaction_id.clone()), traced).await,
        };

        match result {
            Ok(Ok(value)) => {
                self.on_success(method, &transaction_id, &value, timer, trace);
                Ok(value)
            }
            Ok(Err(error)) => Err(self.on_failure(
                method,
                &transaction_id,
                Failure::from_error(error),
                timer,
                trace,
            )),
            Err(payload) => Err(self.on_failure(
                method,
                &transaction_id,
                Failure::from_panic(payload),
                timer,
                trace,
            )),
        }
    }

    /// Id used when no context scope is active: cached on first use so calls
    /// on this instance stay correlated.
    fn fallback_transaction_id(&self) -> String {
        let mut cached = self
            .cached_transaction_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cached
            .get_or_insert_with(|| self.generator.generate())
            .clone()
    }

    fn message(&self, action: &str, method: &str) -> String {
        format!(
            "[{}] {action} {method} en {}",
            self.component, self.class_name
        )
    }

    fn begin_trace(
        &self,
        method: &str,
        transaction_id: &str,
        snapshot: &Map<String, Value>,
    ) -> Option<TraceScope> {
        if !self.tracer.is_active() {
            return None;
        }

        let name = format!("{}.{method}", self.component);
        let scope = match self.tracer.current_transaction() {
            Some(transaction) => {
                let span = self.tracer.start_span(
                    &name,
                    "app",
                    Some(&self.component.as_str().to_lowercase()),
                    Some(method),
                );
                TraceScope::Nested { transaction, span }
            }
            None => TraceScope::Started(self.tracer.start_transaction(&name, TRANSACTION_KIND)?),
        };

        // Request labels obey the same size limit as logged payloads.
        let max_log_size = self.logger.max_log_size();
        let mut labels = vec![
            ("component".to_string(), self.component.as_str().to_string()),
            ("class".to_string(), self.class_name.clone()),
            ("method".to_string(), method.to_string()),
            ("transaction.id".to_string(), transaction_id.to_string()),
        ];
        for key in ["body", "params", "query"] {
            if let Some(value) = snapshot.get(key).filter(|v| !is_empty_value(v)) {
                let text = match serialize_for_log(value, max_log_size) {
                    SafeLog::Original(value) => to_log_string(value),
                    SafeLog::Truncated(text) => text,
                };
                labels.push((format!("request.{key}"), text));
            }
        }
        for key in ["value", "data"] {
            if let Some(value) = snapshot.get(key) {
                let scalar = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                labels.push((format!("request.{key}"), bound_text(scalar, max_log_size)));
            }
        }

        match &scope {
            TraceScope::Started(transaction) => {
                for (key, value) in labels {
                    transaction.set_label(&key, value);
                }
            }
            TraceScope::Nested {
                span: Some(span), ..
            } => {
                for (key, value) in labels {
                    span.set_label(&key, value);
                }
            }
            TraceScope::Nested { span: None, .. } => {}
        }

        Some(scope)
    }

    fn finish_trace(&self, trace: Option<TraceScope>, outcome: Outcome) {
        match trace {
            Some(TraceScope::Started(transaction)) => {
                transaction.set_outcome(outcome);
                self.tracer.end_transaction(transaction);
            }
            Some(TraceScope::Nested {
                span: Some(span), ..
            }) => {
                span.set_outcome(outcome);
                self.tracer.end_span(span);
            }
            Some(TraceScope::Nested { span: None, .. }) | None => {}
        }
    }

    fn on_success<T: Serialize>(
        &self,
        method: &str,
        transaction_id: &str,
        value: &T,
        timer: ExecutionTimer,
        trace: Option<TraceScope>,
    ) {
        let elapsed = timer.elapsed();
        let response = loggable_response(to_log_value(value));

        self.logger.info(
            &self.message("Ejecución exitosa del método", method),
            LogMetadata {
                response: Some(response),
                ..LogMetadata::new()
                    .with_method_name(method)
                    .with_transaction_id(transaction_id)
                    .with_processing_time(timer.end())
            },
        );

        self.finish_trace(trace, Outcome::Success);
        self.metrics
            .record_invocation(self.component.as_str(), Outcome::Success, elapsed);
    }

    fn on_failure(
        &self,
        method: &str,
        transaction_id: &str,
        failure: Failure,
        timer: ExecutionTimer,
        trace: Option<TraceScope>,
    ) -> ApiErrorEnvelope {
        if self.tracer.is_active() {
            let captured = failure.captured();
            match &trace {
                Some(scope) => scope.transaction().capture_error(&captured),
                None => self.tracer.capture_error(&captured),
            }
        }
        self.finish_trace(trace, Outcome::Failure);

        let elapsed = timer.elapsed();
        self.logger.error(
            &format!(
                "{}: {}",
                self.message("Error en ejecución del método", method),
                failure.message()
            ),
            LogMetadata {
                response: Some(failure.log_detail()),
                ..LogMetadata::new()
                    .with_method_name(method)
                    .with_transaction_id(transaction_id)
                    .with_processing_time(timer.end())
            },
        );
        self.metrics
            .record_invocation(self.component.as_str(), Outcome::Failure, elapsed);

        failure.into_envelope(transaction_id)
    }
}

impl std::fmt::Debug for Instrumented {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumented")
            .field("class_name", &self.class_name)
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

/// Results wrapping their payload in `data` are logged by that payload.
fn loggable_response(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) if !data.is_null() => data,
            Some(data) => {
                map.insert("data".to_string(), data);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}
