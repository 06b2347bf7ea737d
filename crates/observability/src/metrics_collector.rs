use std::time::Duration;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::apm::Outcome;

pub const INVOCATIONS_TOTAL: &str = "traza_invocations_total";
pub const INVOCATION_DURATION_SECONDS: &str = "traza_invocation_duration_seconds";
pub const MESSAGES_TOTAL: &str = "traza_messages_total";
pub const JOB_RUNS_TOTAL: &str = "traza_job_runs_total";

/// Records execution metrics through the `metrics` facade.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn record_invocation(&self, component: &str, outcome: Outcome, duration: Duration) {
        counter!(
            INVOCATIONS_TOTAL,
            "component" => component.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        histogram!(INVOCATION_DURATION_SECONDS, "component" => component.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_message(&self, topic: &str, disposition: &'static str) {
        counter!(MESSAGES_TOTAL, "topic" => topic.to_string(), "disposition" => disposition)
            .increment(1);
    }

    pub fn record_job_run(&self, job: &str, outcome: Outcome) {
        counter!(JOB_RUNS_TOTAL, "job" => job.to_string(), "outcome" => outcome.as_str())
            .increment(1);
    }
}

fn describe_metrics() {
    describe_counter!(INVOCATIONS_TOTAL, "Instrumented invocations by component and outcome");
    describe_histogram!(
        INVOCATION_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of instrumented invocations"
    );
    describe_counter!(MESSAGES_TOTAL, "Consumed messages by topic and disposition");
    describe_counter!(JOB_RUNS_TOTAL, "Scheduled job runs by outcome");
}

/// Install the global Prometheus recorder; render it through the returned handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;
    describe_metrics();

    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_metrics_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let collector = MetricsCollector::new();
            collector.record_invocation("Service", Outcome::Success, Duration::from_millis(5));
            collector.record_invocation("Service", Outcome::Failure, Duration::from_millis(7));
            collector.record_message("payments.events", "ack");
        });

        let rendered = handle.render();
        assert!(rendered.contains(INVOCATIONS_TOTAL));
        assert!(rendered.contains("outcome=\"failure\""));
        assert!(rendered.contains("component=\"Service\""));
        assert!(rendered.contains(INVOCATION_DURATION_SECONDS));
        assert!(rendered.contains("disposition=\"ack\""));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        MetricsCollector::new().record_job_run("reconciliation", Outcome::Success);
    }
}
