// SPDX-License-Identifier: MIT
//! `BrowserControlClient`: the narrow seam over the browser's
//! remote-debugging interface.
//!
//! One real implementation speaks the DevTools HTTP endpoints on the fixed
//! local debugging port (tab list/create/close/activate) plus the per-tab
//! WebSocket for script evaluation; tests substitute a fake. Every call is
//! bounded by a short timeout so a hung browser can never stall a caller.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::cdp::PageSocket;
use super::BrowserError;

/// Per-call bound for the HTTP endpoints.
const HTTP_TIMEOUT: Duration = Duration::from_secs(4);
/// Per-command bound for WebSocket script evaluation.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// One entry from the DevTools tab list.
#[derive(Debug, Clone, Deserialize)]
pub struct TabInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, rename = "webSocketDebuggerUrl")]
    pub ws_url: Option<String>,
}

impl TabInfo {
    /// Whether this target is an ordinary page (not a worker or extension).
    pub fn is_page(&self) -> bool {
        self.kind.is_empty() || self.kind == "page"
    }
}

/// The operations the navigation layers need from the debugging interface.
#[async_trait]
pub trait BrowserControlClient: Send + Sync {
    /// List open tabs. An error here means the endpoint is unreachable.
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, BrowserError>;

    /// Open a new tab at `url`. Success requires a recognisable tab id in
    /// the response.
    async fn open_tab(&self, url: &str) -> Result<TabInfo, BrowserError>;

    async fn close_tab(&self, tab_id: &str) -> Result<(), BrowserError>;

    async fn activate_tab(&self, tab_id: &str) -> Result<(), BrowserError>;

    /// Evaluate a script in the given tab's page context.
    async fn evaluate_script(&self, tab: &TabInfo, expression: &str)
        -> Result<(), BrowserError>;

    /// Open the tab's dedicated page-level socket channel.
    async fn open_page_socket(&self, tab: &TabInfo) -> Result<PageSocket, BrowserError>;
}

// ─── Real implementation ──────────────────────────────────────────────────────

/// DevTools client bound to the fixed local debugging port.
pub struct DevToolsClient {
    base: String,
    http: reqwest::Client,
}

impl DevToolsClient {
    pub fn new(port: u16) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base: format!("http://127.0.0.1:{port}"),
            http,
        }
    }
}

#[async_trait]
impl BrowserControlClient for DevToolsClient {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, BrowserError> {
        let resp = self
            .http
            .get(format!("{}/json", self.base))
            .send()
            .await
            .map_err(|e| BrowserError::unreachable(e.to_string()))?;
        resp.json::<Vec<TabInfo>>()
            .await
            .map_err(|e| BrowserError::protocol(format!("tab list: {e}")))
    }

    async fn open_tab(&self, url: &str) -> Result<TabInfo, BrowserError> {
        // Newer Chromium requires PUT for /json/new.
        let resp = self
            .http
            .put(format!("{}/json/new?{url}", self.base))
            .send()
            .await
            .map_err(|e| BrowserError::unreachable(e.to_string()))?;
        let tab: TabInfo = resp
            .json()
            .await
            .map_err(|e| BrowserError::protocol(format!("new tab: {e}")))?;
        if tab.id.is_empty() {
            return Err(BrowserError::protocol("new tab response carried no id"));
        }
        Ok(tab)
    }

    async fn close_tab(&self, tab_id: &str) -> Result<(), BrowserError> {
        self.http
            .get(format!("{}/json/close/{tab_id}", self.base))
            .send()
            .await
            .map_err(|e| BrowserError::unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| BrowserError::protocol(format!("close tab: {e}")))?;
        Ok(())
    }

    async fn activate_tab(&self, tab_id: &str) -> Result<(), BrowserError> {
        self.http
            .get(format!("{}/json/activate/{tab_id}", self.base))
            .send()
            .await
            .map_err(|e| BrowserError::unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| BrowserError::protocol(format!("activate tab: {e}")))?;
        Ok(())
    }

    async fn evaluate_script(
        &self,
        tab: &TabInfo,
        expression: &str,
    ) -> Result<(), BrowserError> {
        let ws_url = tab.ws_url.as_deref().ok_or_else(|| BrowserError::NoSocket {
            tab_id: tab.id.clone(),
        })?;
        let mut socket = PageSocket::connect(ws_url).await?;
        let result = tokio::time::timeout(SCRIPT_TIMEOUT, socket.evaluate(expression))
            .await
            .map_err(|_| {
                BrowserError::timeout("script evaluation", SCRIPT_TIMEOUT.as_secs())
            })??;
        let _ = result;
        socket.close().await;
        Ok(())
    }

    async fn open_page_socket(&self, tab: &TabInfo) -> Result<PageSocket, BrowserError> {
        let ws_url = tab.ws_url.as_deref().ok_or_else(|| BrowserError::NoSocket {
            tab_id: tab.id.clone(),
        })?;
        PageSocket::connect(ws_url).await
    }
}
