//! Main entry point for the Image Transform Gateway

use img_transform_gateway::{
    api,
    config::{EngineKind, Settings},
    coordinator::RequestCoordinator,
    engine::{http::HttpEngine, mock::MockEngine, InferenceEngine},
    resource::ModelResource,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration before logging so the level can come from it
    let settings = Settings::load()?;
    settings.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    if settings.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!("Starting Image Transform Gateway");
    let settings = Arc::new(settings);

    // Build the engine the configuration selects
    let engine: Arc<dyn InferenceEngine> = match settings.engine.kind {
        EngineKind::Http => Arc::new(
            HttpEngine::new(&settings.engine)
                .map_err(|e| anyhow::anyhow!("engine setup failed: {e}"))?,
        ),
        EngineKind::Mock => {
            warn!("running with the mock engine; outputs are synthetic");
            Arc::new(MockEngine::new())
        }
    };

    // Startup load is fatal on failure: we never bind as healthy without it
    let model = Arc::new(
        ModelResource::load(engine, &settings.model, &settings.resource)
            .await
            .map_err(|e| anyhow::anyhow!("startup failed: {e}"))?,
    );

    let coordinator = Arc::new(RequestCoordinator::new(settings.clone(), model.clone()));

    // Periodically drop lapsed rate-limit windows
    {
        let coordinator = coordinator.clone();
        let period = Duration::from_secs(
            settings
                .rate_limit
                .global
                .window_secs
                .max(settings.rate_limit.per_client.window_secs),
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                coordinator.purge_expired_windows();
            }
        });
    }

    let app_state = Arc::new(AppState {
        settings: settings.clone(),
        coordinator,
    });
    let app = api::create_router(app_state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drain any in-flight transformation before releasing device memory
    info!("Shutting down, draining model resource");
    model.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
}
