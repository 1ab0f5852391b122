use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use partner_secrets::config::{AppConfig, LogFormat};
use partner_secrets::crypto::{PgpEngine, RpgpEngine};
use partner_secrets::{store, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    telemetry::init(
        config
            .as_ref()
            .map(|config| config.log_format)
            .unwrap_or(LogFormat::Json),
    );
    let config = config.map_err(|error| {
        tracing::error!(%error, "invalid configuration");
        error
    })?;

    let store = store::connect(&config.store)
        .await
        .context("failed to connect secret store")?;
    let engine: Arc<dyn PgpEngine> = Arc::new(RpgpEngine::new(config.key_bits));
    let state = AppState::new(&config, store, engine);

    let seeded = state
        .registry
        .seed_partner_keys(&config.partners)
        .await
        .context("failed to seed partner keys")?;
    tracing::info!(
        partners = state.policy.len(),
        seeded,
        product = %config.product_name,
        env = %config.env,
        "partner configuration loaded"
    );

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = partner_secrets::app(&state)
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.bind_port)
        .parse()
        .context("invalid bind address")?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
