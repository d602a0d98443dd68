// SPDX-License-Identifier: MIT
// gateway/auth.rs: Shared-secret authentication.
//
// Every authenticated route requires `?api_key=<key>` matching the key in
// the config store. Mismatch or absence short-circuits with 401 before any
// handler runs. The key lives in the query string rather than a header so
// that curl one-liners and the provisioning scripts stay trivial.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::AppContext;

pub async fn require_api_key(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = query_param(request.uri().query().unwrap_or(""), "api_key");
    let expected = ctx
        .store
        .get("api.api_key")
        .await
        .and_then(|v| v.as_str().map(str::to_string));

    match (presented, expected) {
        (Some(p), Some(e)) if !e.is_empty() && constant_time_eq(&p, &e) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "rejected request with bad api key");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    let body: Json<Value> = Json(json!({
        "success": false,
        "code": 401,
        "output": Value::Null,
        "error": "invalid or missing api_key",
        "elapsed_ms": 0,
    }));
    (StatusCode::UNAUTHORIZED, body).into_response()
}

/// Extract one query parameter without building a full map.
fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// Length-safe comparison; key mismatch timing must not leak prefix length.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_extraction() {
        assert_eq!(
            query_param("api_key=abc123&x=1", "api_key").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            query_param("x=1&api_key=abc123", "api_key").as_deref(),
            Some("abc123")
        );
        assert_eq!(query_param("x=1", "api_key"), None);
        assert_eq!(query_param("", "api_key"), None);
    }

    #[test]
    fn comparison_requires_exact_match() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secreT"));
        assert!(!constant_time_eq("secret", "secret2"));
        assert!(!constant_time_eq("", "secret"));
    }
}
