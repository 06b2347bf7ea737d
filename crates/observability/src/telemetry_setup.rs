use std::sync::Arc;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use traza_core::{ApmConfig, LogConfig, OutputFormat, TrazaConfig};

use crate::otel_backend::{OtelApmBackend, INSTRUMENTATION_NAME};
use crate::tracer::ApmTracer;

/// Keeps the tracer provider alive; flush it with [`TelemetryGuard::shutdown`].
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
    tracer: ApmTracer,
}

impl TelemetryGuard {
    /// Façade wired to the installed backend (disabled when APM is off)
    pub fn tracer(&self) -> ApmTracer {
        self.tracer.clone()
    }

    pub fn is_apm_active(&self) -> bool {
        self.provider.is_some()
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "Tracer provider shutdown failed");
            }
        }
        info!("OpenTelemetry observability shutdown completed");
    }
}

/// Build the OTLP/HTTP tracer provider and install it globally.
pub fn build_tracer_provider(apm: &ApmConfig) -> Result<SdkTracerProvider> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let host_name = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let resource = Resource::builder()
        .with_attribute(KeyValue::new(SERVICE_NAME, apm.service_name.clone()))
        .with_attribute(KeyValue::new(SERVICE_VERSION, apm.service_version.clone()))
        .with_attribute(KeyValue::new(
            "deployment.environment.name",
            apm.environment.clone(),
        ))
        .with_attribute(KeyValue::new("host.name", host_name))
        .build();

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(apm.otlp_endpoint.clone())
        .build()
        .context("Failed to build OTLP span exporter")?;

    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());
    Ok(provider)
}

fn init_subscriber(config: &LogConfig, provider: Option<&SdkTracerProvider>) -> Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));
    let otel_layer = provider.map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(INSTRUMENTATION_NAME))
    });

    let registry = tracing_subscriber::registry().with(env_filter).with(otel_layer);

    let installed = match config.format {
        OutputFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id)
                .with_thread_names(config.include_thread_name)
                .with_span_events(FmtSpan::CLOSE);

            registry.with(fmt_layer).try_init()
        }
        OutputFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id)
                .with_thread_names(config.include_thread_name);

            registry.with(fmt_layer).try_init()
        }
        OutputFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id)
                .with_thread_names(config.include_thread_name);

            registry.with(fmt_layer).try_init()
        }
    };
    installed.context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Install the diagnostic subscriber without any tracing backend.
pub fn init_structured_logging(config: &LogConfig) -> Result<()> {
    init_subscriber(config, None)?;

    info!(
        logging.format = ?config.format,
        logging.level = config.level.as_filter(),
        logging.location = config.include_location,
        "Structured logging initialized"
    );
    Ok(())
}

/// Install logging and, when APM is active, the OpenTelemetry pipeline.
pub fn init_telemetry(config: &TrazaConfig) -> Result<TelemetryGuard> {
    let provider = if config.apm.active {
        Some(build_tracer_provider(&config.apm)?)
    } else {
        None
    };

    init_subscriber(&config.logging, provider.as_ref())?;

    let tracer = match &provider {
        Some(provider) => ApmTracer::new(Arc::new(OtelApmBackend::from_provider(provider, true))),
        None => ApmTracer::disabled(),
    };

    info!(
        logging.format = ?config.logging.format,
        logging.level = config.logging.level.as_filter(),
        apm.active = config.apm.active,
        apm.endpoint = %config.apm.otlp_endpoint,
        service.name = %config.apm.service_name,
        "Logging and tracing initialized"
    );

    Ok(TelemetryGuard { provider, tracer })
}
