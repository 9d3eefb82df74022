use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, routes, Build, Rocket, State};
use serde::Serialize;

use common::ServerConfig;

use crate::dedup::DedupStore;
use crate::dispatcher::Dispatcher;
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::sessions::ConnectionRegistry;

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub dedup: Arc<DedupStore>,
    pub health: Arc<HealthMonitor>,
}

/// Response structure for `/api/v1/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    active_connections: usize,
    queued: usize,
    notified: usize,
    health: HealthSnapshot,
}

/// 200 while the dedup store persists correctly, 503 after a failed write.
#[get("/health")]
async fn health(state: &State<AppState>) -> (Status, Json<HealthSnapshot>) {
    let snapshot = state.health.snapshot();
    let code = if snapshot.healthy {
        Status::Ok
    } else {
        Status::ServiceUnavailable
    };
    (code, Json(snapshot))
}

#[get("/api/v1/status")]
async fn status(state: &State<AppState>) -> Json<StatusResponse> {
    let health = state.health.snapshot();
    Json(StatusResponse {
        status: if health.healthy { "ok" } else { "degraded" },
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        active_connections: state.registry.active_count(),
        queued: state.dispatcher.queued(),
        notified: state.dedup.len().await,
        health,
    })
}

/// Build Rocket with managed state and mounted routes, bound per `[server]`.
pub fn build_rocket(state: AppState, server: &ServerConfig) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", server.bind.clone()))
        .merge(("port", server.port));

    rocket::custom(figment)
        .manage(state)
        .mount("/", routes![health, status])
        .mount("/ws", routes![crate::sessions::websocket::alerts_websocket])
}

/// Launch Rocket - this will run until shutdown (SIGINT/SIGTERM etc.)
pub async fn launch_rocket(state: AppState, server: &ServerConfig) -> Result<()> {
    tracing::info!(bind = %server.bind, port = server.port, "Starting Rocket HTTP server");
    build_rocket(state, server)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
