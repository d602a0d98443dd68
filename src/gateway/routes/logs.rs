// SPDX-License-Identifier: MIT
// gateway/routes/logs.rs: Serve the tail of the daemon log.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::diag::tail_log;
use crate::gateway::respond;
use crate::AppContext;

const DEFAULT_LINES: usize = 100;
const MAX_LINES: usize = 2000;

#[derive(Deserialize)]
pub struct LogQuery {
    pub lines: Option<usize>,
}

pub async fn tail(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<LogQuery>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let lines = query.lines.unwrap_or(DEFAULT_LINES).min(MAX_LINES);
    let result = tail_log(&ctx.log_path, lines)
        .await
        .map(|lines| json!({ "lines": lines }));
    respond(started, result)
}
