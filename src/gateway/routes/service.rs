// SPDX-License-Identifier: MIT
// gateway/routes/service.rs: systemd control for the kiosk browser unit.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::gateway::respond;
use crate::service::{systemctl, KIOSK_SERVICE};
use crate::AppContext;

async fn control(ctx: Arc<AppContext>, verb: &str) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let result = systemctl(verb, KIOSK_SERVICE, &ctx.service_retry)
        .await
        .map(|outcome| json!(outcome));
    respond(started, result)
}

pub async fn start(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    control(ctx, "start").await
}

pub async fn stop(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    control(ctx, "stop").await
}

pub async fn restart(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    control(ctx, "restart").await
}
