// SPDX-License-Identifier: MIT
//! Lightweight HTTP client for CLI commands.
//!
//! CLI subcommands (`kioskd status`, `kioskd playlist show`, etc.) use this
//! to call the running gateway with the stored API key.

use anyhow::{bail, Context as _, Result};
use serde_json::Value;
use std::time::Duration;

/// A short-lived client for CLI-to-gateway calls.
pub struct GatewayClient {
    base: String,
    api_key: String,
    http: reqwest::Client,
}

impl GatewayClient {
    /// Create a client targeting the local gateway with the given key.
    pub fn new(port: u16, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            base: format!("http://127.0.0.1:{port}"),
            api_key,
            http,
        })
    }

    /// Check if the gateway is reachable (3-second bound on /api/health).
    pub async fn is_reachable(&self) -> bool {
        let probe = self.http.get(format!("{}/api/health", self.base)).send();
        matches!(
            tokio::time::timeout(Duration::from_secs(3), probe).await,
            Ok(Ok(resp)) if resp.status().is_success()
        )
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("gateway unreachable; is the kiosk service running?")?;
        Self::unwrap_envelope(resp).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .context("gateway unreachable; is the kiosk service running?")?;
        Self::unwrap_envelope(resp).await
    }

    fn url(&self, path: &str) -> String {
        let sep = if path.contains('?') { '&' } else { '?' };
        format!("{}{}{}api_key={}", self.base, path, sep, self.api_key)
    }

    /// Parse the response envelope; a `success: false` body becomes an error
    /// carrying the gateway's reason string.
    async fn unwrap_envelope(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .context("gateway returned a non-JSON response")?;
        if body.get("success").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(body);
        }
        let reason = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        bail!("gateway error ({status}): {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_port_is_not_reachable() {
        // Nothing should be listening on the discard port.
        let client = GatewayClient::new(9, "test-key-0123456789".into()).unwrap();
        assert!(!client.is_reachable().await);
    }
}
