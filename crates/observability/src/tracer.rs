//! Tracing adapter façade.
//!
//! [`ApmTracer`] wraps an optional [`ApmBackend`]. When the backend is missing
//! or reports inactive, every operation is a no-op returning `None`. Backend
//! failures and panics are contained here and only reported at `debug`.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::apm::{
    sanitize_label_key, ApmBackend, ApmResult, CapturedError, LabelValue, Outcome, SpanHandle,
};

tokio::task_local! {
    static CURRENT_TRANSACTION: TraceTransaction;
}

/// Run a backend call, swallowing errors and panics.
fn guarded<T>(operation: &str, call: impl FnOnce() -> ApmResult<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            debug!(apm.operation = operation, error = %e, "Ignoring APM backend error");
            None
        }
        Err(_) => {
            debug!(apm.operation = operation, "Ignoring APM backend panic");
            None
        }
    }
}

/// Handle to a trace transaction. Clones refer to the same transaction.
#[derive(Clone)]
pub struct TraceTransaction {
    handle: Arc<dyn SpanHandle>,
}

impl TraceTransaction {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn set_label(&self, key: &str, value: impl Into<LabelValue>) {
        let key = sanitize_label_key(key);
        let value = value.into();
        guarded("set_label", || self.handle.set_label(&key, value));
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        guarded("set_outcome", || self.handle.set_outcome(outcome));
    }

    pub fn capture_error(&self, error: &CapturedError) {
        guarded("capture_error", || self.handle.capture_error(error));
    }

    pub fn handle(&self) -> &dyn SpanHandle {
        self.handle.as_ref()
    }

    pub fn same_as(&self, other: &TraceTransaction) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl std::fmt::Debug for TraceTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceTransaction")
            .field("name", &self.name())
            .finish()
    }
}

/// Handle to a span nested under a transaction.
#[derive(Clone)]
pub struct TraceSpan {
    handle: Arc<dyn SpanHandle>,
}

impl TraceSpan {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn set_label(&self, key: &str, value: impl Into<LabelValue>) {
        let key = sanitize_label_key(key);
        let value = value.into();
        guarded("span.set_label", || self.handle.set_label(&key, value));
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        guarded("span.set_outcome", || self.handle.set_outcome(outcome));
    }
}

impl std::fmt::Debug for TraceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSpan").field("name", &self.name()).finish()
    }
}

/// Make `transaction` the current one for the extent of `future`.
pub fn in_transaction<F>(transaction: TraceTransaction, future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT_TRANSACTION.scope(transaction, future)
}

/// Null-safe façade over an APM backend.
#[derive(Clone, Default)]
pub struct ApmTracer {
    backend: Option<Arc<dyn ApmBackend>>,
}

impl ApmTracer {
    pub fn new(backend: Arc<dyn ApmBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A tracer with no backend: every call is a no-op
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_active(&self) -> bool {
        self.active_backend().is_some()
    }

    fn active_backend(&self) -> Option<&Arc<dyn ApmBackend>> {
        self.backend.as_ref().filter(|backend| {
            guarded("is_active", || Ok(backend.is_active())).unwrap_or(false)
        })
    }

    pub fn start_transaction(&self, name: &str, kind: &str) -> Option<TraceTransaction> {
        let backend = self.active_backend()?;
        guarded("start_transaction", || backend.start_transaction(name, kind))
            .map(|handle| TraceTransaction { handle })
    }

    /// The transaction made current by [`in_transaction`], if any.
    pub fn current_transaction(&self) -> Option<TraceTransaction> {
        self.active_backend()?;
        CURRENT_TRANSACTION.try_with(Clone::clone).ok()
    }

    /// Start a span under the current transaction (or at top level without one).
    pub fn start_span(
        &self,
        name: &str,
        span_type: &str,
        subtype: Option<&str>,
        action: Option<&str>,
    ) -> Option<TraceSpan> {
        let backend = self.active_backend()?;
        let parent = CURRENT_TRANSACTION.try_with(Clone::clone).ok();
        guarded("start_span", || {
            backend.start_span(
                parent.as_ref().map(TraceTransaction::handle),
                name,
                span_type,
                subtype,
                action,
            )
        })
        .map(|handle| TraceSpan { handle })
    }

    /// Label the current transaction.
    pub fn set_label(&self, key: &str, value: impl Into<LabelValue>) {
        if let Some(transaction) = self.current_transaction() {
            transaction.set_label(key, value);
        }
    }

    /// Record an error on the current transaction, or as an orphan without one.
    pub fn capture_error(&self, error: &CapturedError) {
        let Some(backend) = self.active_backend() else {
            return;
        };
        match CURRENT_TRANSACTION.try_with(Clone::clone).ok() {
            Some(transaction) => transaction.capture_error(error),
            None => {
                guarded("capture_orphan_error", || backend.capture_orphan_error(error));
            }
        }
    }

    pub fn end_transaction(&self, transaction: TraceTransaction) {
        guarded("end_transaction", || transaction.handle.end());
    }

    pub fn end_span(&self, span: TraceSpan) {
        guarded("end_span", || span.handle.end());
    }
}

impl std::fmt::Debug for ApmTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApmTracer")
            .field("has_backend", &self.backend.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apm::ApmError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubHandle {
        name: String,
        labels: Mutex<Vec<(String, LabelValue)>>,
        ended: AtomicUsize,
    }

    impl SpanHandle for StubHandle {
        fn name(&self) -> &str {
            &self.name
        }
        fn set_label(&self, key: &str, value: LabelValue) -> ApmResult<()> {
            self.labels.lock().unwrap().push((key.to_string(), value));
            Ok(())
        }
        fn set_outcome(&self, _outcome: Outcome) -> ApmResult<()> {
            Ok(())
        }
        fn capture_error(&self, _error: &CapturedError) -> ApmResult<()> {
            Err(ApmError::Backend("rejected".to_string()))
        }
        fn end(&self) -> ApmResult<()> {
            self.ended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubBackend {
        active: AtomicBool,
        last: Mutex<Option<Arc<StubHandle>>>,
        panic_on_orphan: bool,
    }

    impl StubBackend {
        fn new(active: bool) -> Self {
            Self {
                active: AtomicBool::new(active),
                last: Mutex::new(None),
                panic_on_orphan: true,
            }
        }
    }

    impl ApmBackend for StubBackend {
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
        fn start_transaction(&self, name: &str, _kind: &str) -> ApmResult<Arc<dyn SpanHandle>> {
            let handle = Arc::new(StubHandle {
                name: name.to_string(),
                ..StubHandle::default()
            });
            *self.last.lock().unwrap() = Some(handle.clone());
            Ok(handle)
        }
        fn start_span(
            &self,
            _parent: Option<&dyn SpanHandle>,
            _name: &str,
            _span_type: &str,
            _subtype: Option<&str>,
            _action: Option<&str>,
        ) -> ApmResult<Arc<dyn SpanHandle>> {
            Err(ApmError::Unavailable("no spans".to_string()))
        }
        fn capture_orphan_error(&self, _error: &CapturedError) -> ApmResult<()> {
            if self.panic_on_orphan {
                panic!("backend exploded");
            }
            Ok(())
        }
    }

    #[test]
    fn test_disabled_tracer_is_noop() {
        let tracer = ApmTracer::disabled();
        assert!(!tracer.is_active());
        assert!(tracer.start_transaction("X.y", "request").is_none());
        assert!(tracer.current_transaction().is_none());
        assert!(tracer.start_span("s", "db", None, None).is_none());
        tracer.set_label("k", "v");
        tracer.capture_error(&CapturedError::new("Error", "boom"));
    }

    #[test]
    fn test_inactive_backend_is_noop() {
        let tracer = ApmTracer::new(Arc::new(StubBackend::new(false)));
        assert!(!tracer.is_active());
        assert!(tracer.start_transaction("X.y", "request").is_none());
    }

    #[test]
    fn test_labels_are_sanitized() {
        let backend = Arc::new(StubBackend::new(true));
        let tracer = ApmTracer::new(backend.clone());

        let transaction = tracer.start_transaction("Service.create", "request").unwrap();
        transaction.set_label("Transaction.ID", "T-1");

        let handle = backend.last.lock().unwrap().clone().unwrap();
        let labels = handle.labels.lock().unwrap().clone();
        assert_eq!(
            labels,
            vec![("transaction_id".to_string(), LabelValue::from("T-1"))]
        );
    }

    #[test]
    fn test_backend_failures_are_swallowed() {
        let tracer = ApmTracer::new(Arc::new(StubBackend::new(true)));

        assert!(tracer.start_span("query", "db", Some("oracle"), None).is_none());
        tracer.capture_error(&CapturedError::new("Error", "boom"));

        let transaction = tracer.start_transaction("X.y", "request").unwrap();
        transaction.capture_error(&CapturedError::new("Error", "boom"));
        tracer.end_transaction(transaction);
    }

    #[tokio::test]
    async fn test_current_transaction_scoped() {
        let backend = Arc::new(StubBackend::new(true));
        let tracer = ApmTracer::new(backend.clone());
        let transaction = tracer.start_transaction("Controller.get", "request").unwrap();

        let inner = tracer.clone();
        let seen = in_transaction(transaction.clone(), async move {
            inner.set_label("component", "Controller");
            inner.current_transaction()
        })
        .await;

        assert!(seen.unwrap().same_as(&transaction));
        assert!(tracer.current_transaction().is_none());

        tracer.end_transaction(transaction);
        let handle = backend.last.lock().unwrap().clone().unwrap();
        assert_eq!(handle.ended.load(Ordering::SeqCst), 1);
        assert_eq!(handle.labels.lock().unwrap().len(), 1);
    }
}
