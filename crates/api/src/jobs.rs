//! Scheduled-job entry point: every run gets a fresh transaction id.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;
use traza_core::context;
use traza_core::{
    LogMetadata, StructuredLogger, TransactionContext, TransactionIdGenerator, UuidGenerator,
};
use traza_observability::{MetricsCollector, Outcome};

/// Runs jobs, each execution under a fresh transaction id.
#[derive(Clone)]
pub struct JobRunner {
    /// Source of per-run transaction ids
    generator: Arc<dyn TransactionIdGenerator>,
    /// Logger for failed runs
    logger: StructuredLogger,
    /// Job run counters
    metrics: MetricsCollector,
}

impl JobRunner {
    /// Runner with UUID ids and a stdout logger
    pub fn new() -> Self {
        Self {
            generator: Arc::new(UuidGenerator),
            logger: StructuredLogger::new("JobRunner"),
            metrics: MetricsCollector::new(),
        }
    }

    /// Use `generator` for run ids
    pub fn with_generator(mut self, generator: Arc<dyn TransactionIdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Use an already configured logger
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Run one job execution in a new context scope.
    ///
    /// Failures are logged at ERROR with the run's transaction id and handed
    /// back; they never take the scheduler down.
    pub async fn run<F, T>(&self, name: &str, job: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let transaction_id = self.generator.generate();
        let result = context::run(TransactionContext::new(transaction_id.clone()), job).await;

        match &result {
            Ok(_) => self.metrics.record_job_run(name, Outcome::Success),
            Err(error) => {
                self.logger.error(
                    &format!("Error en la ejecución del job {name}: {error}"),
                    LogMetadata::new()
                        .with_method_name(name)
                        .with_transaction_id(&transaction_id)
                        .with_field("error", &format!("{error:#}")),
                );
                self.metrics.record_job_run(name, Outcome::Failure);
            }
        }
        result
    }

    /// Run `job` every `period` until shutdown is signalled. The first run happens immediately.
    pub async fn run_periodic<F, Fut>(
        &self,
        name: &str,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
        mut job: F,
    ) where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut interval = tokio::time::interval(period);
        info!(job = name, period_secs = period.as_secs(), "Job scheduled");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let _ = self.run(name, job()).await;
                }
                _ = shutdown_rx.recv() => {
                    info!(job = name, "Job loop received shutdown signal");
                    break;
                }
            }
        }
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `job` once with a default [`JobRunner`].
pub async fn run_job<F, T>(name: &str, job: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    JobRunner::new().run(name, job).await
}
