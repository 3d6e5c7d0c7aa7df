// main.rs
mod config;
mod controller;
mod docs;
mod error;
mod events;
mod handlers;
mod metrics;
mod models;
mod registry;
mod storage;

use std::sync::Arc;

use axum::{
    Router,
    response::Redirect,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use controller::SyncController;
use models::AppState;
use registry::{DeviceTransport, MockRegistry, RegistryTuning, ThreadRandomness};
use storage::SnapshotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = config::Settings::new()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    if settings.metrics.enabled {
        metrics::setup(settings.metrics.port)?;
    }

    let tuning = RegistryTuning {
        control_failure_rate: settings.registry.control_failure_rate,
        reconnect_probability: settings.registry.reconnect_probability,
    };
    let transport: Arc<dyn DeviceTransport> =
        Arc::new(MockRegistry::seeded(tuning, Arc::new(ThreadRandomness)));

    let store = SnapshotStore::new(&settings.storage.snapshot_path);
    let controller = Arc::new(SyncController::new(transport.clone(), Some(store)));
    if let Err(err) = controller.restore().await {
        warn!(error = %err, "could not restore persisted device snapshot");
    }

    controller
        .events()
        .subscribe(|notification| info!(?notification, "notification"));

    if controller.devices().await.is_empty() {
        let controller = controller.clone();
        tokio::spawn(async move {
            let _ = controller.scan().await;
        });
    }

    let state = Arc::new(AppState::new(controller, transport));

    let app = Router::new()
        .route("/", get(|| async { Redirect::permanent("/static/") }))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/scan", post(handlers::scan_devices))
        .route("/api/devices/{id}/power", post(handlers::set_device_power))
        .route("/api/devices/{id}/status", get(handlers::device_status))
        .route("/api/devices/{id}/presence", post(handlers::simulate_presence))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", docs::ApiDoc::openapi()))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.server.address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind address: {}", e))?;

    info!("Server started on {}", settings.server.address);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
