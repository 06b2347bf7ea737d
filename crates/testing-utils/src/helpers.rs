//! Test helper utilities and common testing patterns

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use traza_core::{MemorySink, StructuredLogger};
use traza_observability::ApmTracer;

use crate::mocks::RecordingApmBackend;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }
}

/// Logger writing into a fresh [`MemorySink`].
pub fn memory_logger(context: &str) -> (StructuredLogger, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let logger = StructuredLogger::new(context).with_sink(sink.clone());
    (logger, sink)
}

/// Active tracer backed by a [`RecordingApmBackend`].
pub fn recording_tracer() -> (ApmTracer, RecordingApmBackend) {
    let backend = RecordingApmBackend::new();
    let tracer = ApmTracer::new(Arc::new(backend.clone()));
    (tracer, backend)
}

/// Whether `text` looks like `<digits>[.<digits>]ms`.
pub fn is_elapsed_format(text: &str) -> bool {
    let Some(number) = text.strip_suffix("ms") else {
        return false;
    };
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (number, None),
    };
    let digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    digits(whole) && fraction.map_or(true, digits)
}
