// SPDX-License-Identifier: MIT
//! Page-level DevTools WebSocket channel.
//!
//! A deliberately small client: one connection to a single page target, one
//! command in flight at a time, responses correlated by auto-incrementing id.
//! Event frames arriving between a command and its response are skipped.
//! This is all the navigation layers need; there is no subscription surface.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::BrowserError;

/// Bound on a single command round-trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a DevTools command frame.
pub fn build_command(id: u64, method: &str, params: Value) -> Value {
    json!({ "id": id, "method": method, "params": params })
}

/// Split a received frame into `(id, result, error_message)` when it is a
/// command response; `None` for event frames.
pub fn parse_response(frame: &Value) -> Option<(u64, Option<Value>, Option<String>)> {
    let id = frame.get("id")?.as_u64()?;
    let error = frame
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string);
    Some((id, frame.get("result").cloned(), error))
}

/// Dedicated socket channel to one page target.
pub struct PageSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl PageSocket {
    /// Connect to a page's `webSocketDebuggerUrl`.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let connect = tokio_tungstenite::connect_async(ws_url);
        let (ws, _) = tokio::time::timeout(COMMAND_TIMEOUT, connect)
            .await
            .map_err(|_| BrowserError::timeout("page socket connect", COMMAND_TIMEOUT.as_secs()))?
            .map_err(|e| BrowserError::unreachable(format!("page socket: {e}")))?;
        debug!(url = ws_url, "page socket connected");
        Ok(Self { ws, next_id: 1 })
    }

    /// Send one command and wait for its correlated response.
    pub async fn send_command(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id;
        self.next_id += 1;

        let frame = build_command(id, method, params);
        let text = serde_json::to_string(&frame)
            .map_err(|e| BrowserError::protocol(format!("serialize command: {e}")))?;
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| BrowserError::protocol(format!("send command: {e}")))?;

        let deadline = tokio::time::Instant::now() + COMMAND_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(BrowserError::timeout(method, COMMAND_TIMEOUT.as_secs()));
            }
            let msg = tokio::time::timeout(remaining, self.ws.next())
                .await
                .map_err(|_| BrowserError::timeout(method, COMMAND_TIMEOUT.as_secs()))?
                .ok_or_else(|| BrowserError::protocol("page socket closed"))?
                .map_err(|e| BrowserError::protocol(format!("page socket read: {e}")))?;

            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => {
                    return Err(BrowserError::protocol("page socket closed by browser"))
                }
                _ => continue,
            };
            let frame: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => continue,
            };
            match parse_response(&frame) {
                Some((resp_id, result, error)) if resp_id == id => {
                    if let Some(message) = error {
                        return Err(BrowserError::Devtools {
                            code: frame
                                .get("error")
                                .and_then(|e| e.get("code"))
                                .and_then(|c| c.as_i64())
                                .unwrap_or(-1),
                            message,
                        });
                    }
                    return Ok(result.unwrap_or(Value::Null));
                }
                // Response to an older command, or an event, keep reading.
                _ => continue,
            }
        }
    }

    /// Enable page-domain events. Required before `Page.navigate` emits
    /// lifecycle events on some browser versions.
    pub async fn enable_page(&mut self) -> Result<(), BrowserError> {
        self.send_command("Page.enable", json!({})).await?;
        Ok(())
    }

    /// Drive this page to `url`. A response carrying `errorText` is a load
    /// failure even though the command itself succeeded.
    pub async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let result = self
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() {
                return Err(BrowserError::NavigationFailed {
                    reason: error_text.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Evaluate a script expression in the page context.
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("script exception")
                .to_string();
            return Err(BrowserError::protocol(message));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Close the channel. Errors on close are ignored; the tab stays open.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_shape() {
        let frame = build_command(7, "Page.navigate", json!({"url": "http://a.example"}));
        assert_eq!(frame["id"], 7);
        assert_eq!(frame["method"], "Page.navigate");
        assert_eq!(frame["params"]["url"], "http://a.example");
    }

    #[test]
    fn parse_response_success() {
        let frame = json!({"id": 3, "result": {"frameId": "F1"}});
        let (id, result, error) = parse_response(&frame).unwrap();
        assert_eq!(id, 3);
        assert_eq!(result.unwrap()["frameId"], "F1");
        assert!(error.is_none());
    }

    #[test]
    fn parse_response_error() {
        let frame = json!({"id": 4, "error": {"code": -32601, "message": "Method not found"}});
        let (id, result, error) = parse_response(&frame).unwrap();
        assert_eq!(id, 4);
        assert!(result.is_none());
        assert_eq!(error.as_deref(), Some("Method not found"));
    }

    #[test]
    fn events_are_not_responses() {
        let frame = json!({"method": "Page.loadEventFired", "params": {}});
        assert!(parse_response(&frame).is_none());
    }

    #[test]
    fn navigate_error_text_detection() {
        let result = json!({"frameId": "F1", "errorText": "net::ERR_NAME_NOT_RESOLVED"});
        let error_text = result.get("errorText").and_then(|v| v.as_str()).unwrap();
        assert_eq!(error_text, "net::ERR_NAME_NOT_RESOLVED");
    }
}
