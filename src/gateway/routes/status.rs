// SPDX-License-Identifier: MIT
// gateway/routes/status.rs: Liveness probe and appliance status.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::gateway::respond;
use crate::registry::ProcessRole;
use crate::AppContext;

/// Unauthenticated probe; provisioning polls this until the gateway is up.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn status(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let config = ctx.store.document().await;
    let output = json!({
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
        "url": config.kiosk.url,
        "orientation": config.display.orientation.to_string(),
        "browser_running": ctx.registry.is_alive(ProcessRole::Browser),
        "playlist": {
            "enabled": config.playlist.enabled,
            "entries": config.playlist.urls.len(),
            "cycling": ctx.playlist.is_running().await,
        },
    });
    respond(started, Ok(output))
}
