// SPDX-License-Identifier: MIT
//! Browser subsystem: DevTools control client, page-level CDP channel,
//! layered navigation, and the process supervisor.

pub mod cdp;
pub mod control;
pub mod navigate;
pub mod supervisor;

use thiserror::Error;

/// Errors from the browser's remote-debugging interface and the processes
/// around it. These are transient by taxonomy: a failure at one navigation
/// layer degrades to the next layer rather than retrying the same one.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The debugging endpoint did not answer at all.
    #[error("debugging endpoint unreachable: {reason}")]
    Unreachable { reason: String },

    /// The endpoint answered with something we cannot recognise as success.
    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    /// A DevTools command reported an explicit error.
    #[error("devtools error {code}: {message}")]
    Devtools { code: i64, message: String },

    /// A bounded call did not finish in time.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Page.navigate reported a load failure (e.g. name resolution).
    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    /// The tab exposes no WebSocket debugger URL.
    #[error("tab {tab_id} has no page socket")]
    NoSocket { tab_id: String },

    /// The browser process could not be started.
    #[error("browser launch failed: {reason}")]
    LaunchFailed { reason: String },
}

impl BrowserError {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }
}
