use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{debug, info, warn};
use traza_api::health::health_check;
use traza_api::middleware::{
    cors_layer, request_logging, request_timeout, trace_layer, transaction_context,
};
use traza_api::{JobRunner, MessageConsumer, MessageEnvelope, TransactionSeed};
use traza_core::{
    LogConfig, LogSink, StructuredLogger, TransactionIdGenerator, TrazaConfig, UuidGenerator,
};
use traza_interceptor::Instrumented;
use traza_observability::ApmTracer;

use crate::payments::{
    self, InMemoryPaymentRepository, PaymentEventsHandler, PaymentsController, PaymentsService,
};
use crate::shutdown::ShutdownManager;

pub const RECONCILIATION_JOB: &str = "payments-reconciliation";
const EVENTS_CAPACITY: usize = 256;

/// Shared wiring for instrumented components: one log configuration, one
/// tracer and one id generator for the whole process.
#[derive(Clone)]
pub struct Instrumentation {
    log_config: LogConfig,
    sink: Option<Arc<dyn LogSink>>,
    tracer: ApmTracer,
    generator: Arc<dyn TransactionIdGenerator>,
}

impl Instrumentation {
    pub fn new(log_config: LogConfig, tracer: ApmTracer) -> Self {
        Self {
            log_config,
            sink: None,
            tracer,
            generator: Arc::new(UuidGenerator),
        }
    }

    /// Route every structured log entry to `sink` instead of the configured one
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn TransactionIdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn generator(&self) -> Arc<dyn TransactionIdGenerator> {
        Arc::clone(&self.generator)
    }

    pub fn logger(&self, context: &str) -> StructuredLogger {
        let logger = StructuredLogger::with_config(context, &self.log_config);
        match &self.sink {
            Some(sink) => logger.with_sink(Arc::clone(sink)),
            None => logger,
        }
    }

    pub fn instrument(&self, class_name: &str) -> Instrumented {
        Instrumented::new(class_name)
            .with_logger(self.logger(class_name))
            .with_tracer(self.tracer.clone())
            .with_generator(self.generator())
    }
}

/// The reference payments service.
pub struct Application {
    config: TrazaConfig,
    instrumentation: Instrumentation,
    service: Arc<PaymentsService>,
    controller: Arc<PaymentsController>,
    consumer: Arc<MessageConsumer>,
    jobs: JobRunner,
    events_tx: mpsc::Sender<MessageEnvelope>,
    events_rx: Mutex<Option<mpsc::Receiver<MessageEnvelope>>>,
    metrics: Option<PrometheusHandle>,
}

impl Application {
    pub fn new(config: TrazaConfig, instrumentation: Instrumentation) -> Self {
        info!(
            bind = %config.server.bind_address,
            apm_active = config.apm.active,
            "Initializing application"
        );

        let (events_tx, events_rx) = mpsc::channel(EVENTS_CAPACITY);

        let repository = Arc::new(InMemoryPaymentRepository::new(
            instrumentation.instrument("PaymentsRepository"),
        ));
        let service = Arc::new(
            PaymentsService::new(repository, instrumentation.instrument("PaymentsService"))
                .with_events(events_tx.clone()),
        );
        let controller = Arc::new(PaymentsController::new(
            Arc::clone(&service),
            instrumentation.instrument("PaymentsController"),
        ));

        let consumer = Arc::new(
            MessageConsumer::new(Arc::new(PaymentEventsHandler::new(Arc::clone(&service))))
                .with_generator(instrumentation.generator())
                .with_logger(instrumentation.logger("MessageConsumer"))
                .with_max_retries(config.server.consumer_max_retries),
        );
        let jobs = JobRunner::new()
            .with_generator(instrumentation.generator())
            .with_logger(instrumentation.logger("JobRunner"));

        Self {
            config,
            instrumentation,
            service,
            controller,
            consumer,
            jobs,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            metrics: None,
        }
    }

    /// Serve the Prometheus handle's rendering at `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn service(&self) -> Arc<PaymentsService> {
        Arc::clone(&self.service)
    }

    pub fn consumer(&self) -> Arc<MessageConsumer> {
        Arc::clone(&self.consumer)
    }

    /// Sender feeding the in-process payment events consumer
    pub fn events(&self) -> mpsc::Sender<MessageEnvelope> {
        self.events_tx.clone()
    }

    /// Receiving end of the events queue; `None` once taken.
    pub fn take_events(&self) -> Option<mpsc::Receiver<MessageEnvelope>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// HTTP surface with the context, logging and timeout layers applied.
    pub fn router(&self) -> Router {
        let seed = TransactionSeed::new(self.instrumentation.generator());
        let timeout = Duration::from_millis(self.config.server.request_timeout_ms);
        let metrics = self.metrics.clone();

        Router::new()
            .route("/health", get(health_check))
            .route(
                "/metrics",
                get(move || {
                    let metrics = metrics.clone();
                    async move {
                        match metrics {
                            Some(handle) => handle.render().into_response(),
                            None => StatusCode::NOT_FOUND.into_response(),
                        }
                    }
                }),
            )
            .merge(payments::routes(Arc::clone(&self.controller)))
            .layer(middleware::from_fn_with_state(timeout, request_timeout))
            .layer(middleware::from_fn(request_logging))
            .layer(middleware::from_fn_with_state(seed, transaction_context))
            .layer(trace_layer())
            .layer(cors_layer())
    }

    /// Serve HTTP and run the consumer and reconciliation loops until shutdown.
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        let addr = self.config.bind_address()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(%addr, "HTTP server listening");

        let events_rx = self
            .take_events()
            .context("Application is already running")?;

        let consumer_task = {
            let consumer = self.consumer();
            let shutdown_rx = shutdown.subscribe().await;
            tokio::spawn(async move { consumer.run(events_rx, shutdown_rx).await })
        };

        let job_task = {
            let jobs = self.jobs.clone();
            let service = self.service();
            let period = Duration::from_secs(self.config.server.reconciliation_interval_secs);
            let shutdown_rx = shutdown.subscribe().await;
            tokio::spawn(async move {
                jobs.run_periodic(RECONCILIATION_JOB, period, shutdown_rx, move || {
                    let service = Arc::clone(&service);
                    async move {
                        let settled = service.reconcile().await?;
                        debug!(settled, "Reconciliation finished");
                        anyhow::Ok(())
                    }
                })
                .await
            })
        };

        let mut http_shutdown = shutdown.subscribe().await;
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.recv().await;
            })
            .await
            .context("HTTP server failed");

        shutdown.shutdown().await;
        for (name, handle) in [("consumer", consumer_task), ("reconciliation", job_task)] {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Background task ended abnormally");
            }
        }

        info!("Application stopped");
        served
    }
}
