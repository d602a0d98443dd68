// SPDX-License-Identifier: MIT
// gateway/routes/orientation.rs: Display rotation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Orientation;
use crate::display;
use crate::gateway::respond;
use crate::AppContext;

pub async fn get_orientation(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let orientation = ctx.store.document().await.display.orientation;
    respond(started, Ok(json!({ "orientation": orientation.to_string() })))
}

#[derive(Deserialize)]
pub struct SetOrientationRequest {
    pub orientation: String,
}

/// Persist and apply a rotation. On an xrandr failure the config document
/// is rolled back to the backup taken at the start, so the stored value
/// never disagrees with the screen.
pub async fn set_orientation(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SetOrientationRequest>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let orientation: Orientation = match body.orientation.parse() {
        Ok(o) => o,
        Err(e) => return respond(started, Err(e)),
    };

    let result = async {
        ctx.store.backup().await?;
        ctx.store
            .set_value(
                "display.orientation",
                Value::String(orientation.to_string()),
            )
            .await?;
        match display::apply_orientation(orientation).await {
            Ok(()) => {
                info!(orientation = %orientation, "orientation set");
                Ok(json!({ "orientation": orientation.to_string() }))
            }
            Err(e) => {
                warn!(orientation = %orientation, error = %e, "apply failed, restoring config");
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
