// SPDX-License-Identifier: MIT
// gateway/mod.rs: Remote-control HTTP API.
//
// Axum HTTP server on the configured API port (default 5000). Every route
// except /api/health requires the shared-secret `api_key` query parameter.
//
// Endpoints:
//   GET  /api/health
//   GET  /api/status
//   GET  /api/url
//   POST /api/url
//   GET  /api/orientation
//   POST /api/orientation
//   GET  /api/playlist
//   POST /api/playlist/add
//   POST /api/playlist/remove
//   POST /api/playlist/replace
//   POST /api/playlist/enable
//   POST /api/playlist/disable
//   POST /api/playlist/clear
//   POST /api/service/start
//   POST /api/service/stop
//   POST /api/service/restart
//   GET  /api/logs

pub mod auth;
pub mod routes;

use anyhow::Result;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::KioskError;
use crate::AppContext;

pub use crate::config::DEFAULT_API_PORT;

pub async fn start_server(ctx: Arc<AppContext>) -> Result<()> {
    let port = ctx
        .store
        .get("api.port")
        .await
        .and_then(|v| v.as_u64())
        .map(|p| p as u16)
        .unwrap_or(DEFAULT_API_PORT);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    let router = build_router(ctx);

    info!("gateway listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let authed = Router::new()
        .route("/api/status", get(routes::status::status))
        .route(
            "/api/url",
            get(routes::url::get_url).post(routes::url::set_url),
        )
        .route(
            "/api/orientation",
            get(routes::orientation::get_orientation).post(routes::orientation::set_orientation),
        )
        .route("/api/playlist", get(routes::playlist::show))
        .route("/api/playlist/add", post(routes::playlist::add))
        .route("/api/playlist/remove", post(routes::playlist::remove))
        .route("/api/playlist/replace", post(routes::playlist::replace))
        .route("/api/playlist/enable", post(routes::playlist::enable))
        .route("/api/playlist/disable", post(routes::playlist::disable))
        .route("/api/playlist/clear", post(routes::playlist::clear))
        .route("/api/service/start", post(routes::service::start))
        .route("/api/service/stop", post(routes::service::stop))
        .route("/api/service/restart", post(routes::service::restart))
        .route("/api/logs", get(routes::logs::tail))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_api_key,
        ));

    Router::new()
        // Health (no auth), used by provisioning to wait for the gateway.
        .route("/api/health", get(routes::status::health))
        .merge(authed)
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

// ─── Response envelope ────────────────────────────────────────────────────────

/// Every response carries the same envelope: success flag, numeric code
/// (0 on success, HTTP-ish otherwise), operation output, optional error
/// string, and elapsed milliseconds.
pub fn envelope(
    success: bool,
    code: i64,
    output: Value,
    error: Option<String>,
    started: Instant,
) -> Json<Value> {
    Json(json!({
        "success": success,
        "code": code,
        "output": output,
        "error": error,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    }))
}

/// Map an operation result onto the envelope with the right status code.
pub fn respond(
    started: Instant,
    result: crate::error::Result<Value>,
) -> (StatusCode, Json<Value>) {
    match result {
        Ok(output) => (StatusCode::OK, envelope(true, 0, output, None, started)),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                envelope(
                    false,
                    status.as_u16() as i64,
                    Value::Null,
                    Some(e.to_string()),
                    started,
                ),
            )
        }
    }
}

/// 400 helper for request-shape problems axum extraction does not catch.
pub fn bad_request(started: Instant, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    respond(started, Err(KioskError::validation(message.into())))
}
