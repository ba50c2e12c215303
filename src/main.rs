//! Exoplanet Classifier API - Main Entry Point
//!
//! Loads every configured model artifact, then serves predictions, the KOI
//! listing and diagnostics over HTTP.

use anyhow::{Context, Result};
use exoplanet_classifier::{
    api::{self, AppState},
    config::{AppConfig, LoggingConfig},
    dataset::KoiDataset,
    metrics::{MetricsReporter, ServiceMetrics},
    models::{InferenceAdapter, ModelRegistry},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("exoplanet_classifier={},tower_http=info", logging.level)))
        .context("Invalid log filter")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Exoplanet Classifier API");
    info!(
        models_dir = %config.models.models_dir,
        default_model = %config.models.default_model,
        "Configuration loaded successfully"
    );

    let registry = match ModelRegistry::load(&config.models) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to load models");
            return Err(e.into());
        }
    };
    if registry.get(&config.models.default_model).is_err() {
        anyhow::bail!(
            "default model '{}' is not among the configured artifacts {:?}",
            config.models.default_model,
            registry.selectors()
        );
    }
    info!(
        labels = ?registry.canonical_labels(),
        "Model registry initialized with {} models: {:?}",
        registry.len(),
        registry.selectors()
    );

    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let dataset = KoiDataset::new(&config.dataset.csv_path, config.dataset.max_rows);
    if !dataset.path().exists() {
        warn!(
            path = %dataset.path().display(),
            "KOI dataset not found, /koi/list will fail until it exists"
        );
    }

    let state = AppState {
        adapter: InferenceAdapter::new(Arc::new(registry)),
        dataset: Arc::new(dataset),
        metrics: metrics.clone(),
        default_model: Arc::from(config.models.default_model.as_str()),
    };
    let app = api::router(state, api::cors_layer(&config.server.allowed_origins));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    metrics.print_summary();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
