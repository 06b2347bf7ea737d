use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use traza::cli;
use traza::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use traza::{Application, Instrumentation};
use traza_core::TrazaConfig;
use traza_observability::{init_metrics, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::command().get_matches();
    let config_path = matches.get_one::<String>("config").map(String::as_str);

    let mut config = TrazaConfig::load(config_path).context("Failed to load configuration")?;
    cli::apply_overrides(&mut config, &matches).context("Invalid command-line override")?;

    let telemetry = init_telemetry(&config).context("Failed to initialize telemetry")?;
    let metrics = init_metrics().context("Failed to install metrics recorder")?;

    info!(
        config = config_path.unwrap_or("<defaults>"),
        service = %config.apm.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting traza"
    );

    let instrumentation = Instrumentation::new(config.logging.clone(), telemetry.tracer());
    let app = Arc::new(Application::new(config, instrumentation).with_metrics(metrics));
    let shutdown = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = app.run(&shutdown).await {
                error!(error = %format!("{e:#}"), "Application failed");
            }
        })
    };

    let signalled = tokio::select! {
        _ = wait_for_shutdown_signal() => true,
        result = &mut app_handle => {
            if let Err(e) = result {
                error!(error = %e, "Application task panicked");
            }
            false
        }
    };

    if signalled {
        info!("Shutdown signal received, stopping gracefully");
        shutdown.shutdown().await;
        match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
            Ok(Ok(())) => info!("Application stopped gracefully"),
            Ok(Err(e)) => error!(error = %e, "Application task failed during shutdown"),
            Err(_) => warn!("Shutdown timed out, exiting"),
        }
    }

    telemetry.shutdown();
    info!("traza exited");
    Ok(())
}
