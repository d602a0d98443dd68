// SPDX-License-Identifier: MIT
// gateway/routes/url.rs: Single-URL mode.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::validate::validate_url;
use crate::gateway::{bad_request, respond};
use crate::AppContext;

pub async fn get_url(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let url = ctx.store.document().await.kiosk.url;
    respond(started, Ok(json!({ "url": url })))
}

/// Set the single display URL and navigate the live browser to it. The
/// config change is backed up first; a navigation failure rolls the
/// document back to that backup so config and screen stay in step.
pub async fn set_url(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();

    // A `urls` array here is a playlist request on the wrong endpoint.
    if body.get("urls").is_some() {
        return bad_request(
            started,
            "this endpoint sets a single url; use /api/playlist/* for playlists",
        );
    }
    let Some(url) = body.get("url").and_then(|v| v.as_str()) else {
        return bad_request(started, "missing 'url' field");
    };
    let url = match validate_url(url) {
        Ok(u) => u.to_string(),
        Err(e) => return respond(started, Err(e)),
    };

    let result = async {
        ctx.store.backup().await?;
        ctx.store
            .set_value("kiosk.url", Value::String(url.clone()))
            .await?;
        match ctx.navigator.navigate(&url).await {
            Ok(report) => {
                info!(url = %url, layer = %report.layer, "url set");
                Ok(json!({ "url": url, "layer": report.layer }))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "navigation failed, restoring config");
                if let Err(restore_err) = ctx.store.restore(None).await {
                    warn!(error = %restore_err, "backup restore failed");
                }
                Err(e)
            }
        }
    }
    .await;
    respond(started, result)
}
