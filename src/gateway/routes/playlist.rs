// SPDX-License-Identifier: MIT
// gateway/routes/playlist.rs: Playlist operations, 1:1 with PlaylistManager.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::gateway::{bad_request, envelope, respond};
use crate::playlist::AddMode;
use crate::AppContext;

pub async fn show(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let view = ctx.playlist.show().await;
    respond(started, Ok(json!(view)))
}

#[derive(Deserialize)]
pub struct AddRequest {
    pub url: String,
    pub display_time: Option<i64>,
    pub title: Option<String>,
    /// "append" (default) or "replace".
    pub mode: Option<String>,
}

pub async fn add(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<AddRequest>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let mode = match body.mode.as_deref() {
        None | Some("append") => AddMode::Append,
        Some("replace") => AddMode::Replace,
        Some(other) => {
            return bad_request(started, format!("unknown mode '{other}' (append|replace)"))
        }
    };
    let result = ctx
        .playlist
        .add_url(&body.url, body.display_time, body.title, mode)
        .await
        .map(|len| json!({ "length": len }));
    respond(started, result)
}

#[derive(Deserialize)]
pub struct RemoveRequest {
    pub index: usize,
}

pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<RemoveRequest>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let result = ctx
        .playlist
        .remove_url(body.index)
        .await
        .map(|removed| json!({ "removed": removed }));
    respond(started, result)
}

#[derive(Deserialize)]
pub struct ReplaceRequest {
    pub urls: Vec<String>,
}

/// Replace the whole playlist and enable cycling. Always answers with the
/// step report; a short-circuited step makes it a 400/500 depending on
/// what failed.
pub async fn replace(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<ReplaceRequest>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    if body.urls.is_empty() {
        return bad_request(started, "urls must not be empty");
    }
    let report = ctx.playlist.replace_all(&body.urls).await;
    if report.success {
        (StatusCode::OK, envelope(true, 0, json!(report), None, started))
    } else {
        let error = report.error.clone();
        (
            StatusCode::BAD_REQUEST,
            envelope(false, 400, json!(report), error, started),
        )
    }
}

pub async fn enable(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let result = ctx.playlist.enable().await.map(|_| json!({ "enabled": true }));
    respond(started, result)
}

pub async fn disable(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let result = ctx
        .playlist
        .disable()
        .await
        .map(|_| json!({ "enabled": false }));
    respond(started, result)
}

pub async fn clear(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let result = ctx.playlist.clear().await.map(|_| json!({ "cleared": true }));
    respond(started, result)
}
