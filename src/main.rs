mod config;
mod connection;
mod error;
mod frame;
mod hub;
mod model;
mod registry;
mod usecase;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue, Method},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use hub::Hub;
use registry::{MemoryRegistry, RoomRegistry};
use usecase::RoomUseCase;

// ─── AppState ───────────────────────────────────────────────────────────────

pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Config,
}

// ─── Health endpoint ────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "rooms_active": state.hub.room_count(),
        "clients_active": state.hub.client_count(),
    }))
}

// ─── CORS configuration ─────────────────────────────────────────────────────

fn build_cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins == "*" {
        warn!("CORS: permissive mode (allow all origins) — not suitable for production");
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<HeaderValue>().expect("invalid origin header value"))
            .collect();

        info!("CORS: restricted to {} origin(s)", origins.len());

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET])
            .allow_headers([HeaderName::from_static("content-type")])
    }
}

// ─── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let log_level = std::env::var("MESH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)))
        .init();

    let cfg = Config::from_env();
    let bind_addr = cfg.bind_addr.clone();
    let allowed_origins = cfg.allowed_origins.clone();
    let cfg_for_state = cfg.clone();

    let registry: Arc<dyn RoomRegistry> = Arc::new(MemoryRegistry::new());
    let usecase = Arc::new(RoomUseCase::new(registry, &cfg));
    let hub = Hub::spawn(usecase, Arc::new(cfg));

    let state = Arc::new(AppState { hub, config: cfg_for_state });

    let cors = build_cors_layer(&allowed_origins);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ws/room/:room_id", get(connection::ws_room_handler))
        .layer(cors)
        .with_state(state);

    info!("Signaling Hub listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
