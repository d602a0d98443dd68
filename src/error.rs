// SPDX-License-Identifier: MIT
//! Error taxonomy for the kiosk control daemon.
//!
//! Four families, each with a different propagation rule:
//! - validation errors are rejected at the boundary and never persisted,
//! - transient failures degrade to the next fallback layer or are retried,
//! - persistent failures abort the operation and surface to the caller,
//! - liveness failures are absorbed by the supervisor loops and only become
//!   visible through status queries.

use thiserror::Error;

/// Top-level daemon error.
#[derive(Debug, Error)]
pub enum KioskError {
    /// Input rejected at the boundary. The reason string is surfaced verbatim
    /// to the caller.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A playlist index outside `[0, len)`.
    #[error("index {index} out of range for playlist of {len} entries")]
    OutOfRange { index: usize, len: usize },

    /// The config document could not be persisted. The prior document on disk
    /// is untouched.
    #[error("config write failed: {0}")]
    ConfigWrite(String),

    /// A named backup does not exist or cannot be read.
    #[error("backup not found: {0}")]
    BackupNotFound(String),

    /// The cycling scheduler refused to start (playlist disabled or fewer
    /// than two entries).
    #[error("nothing to cycle: {0}")]
    NothingToCycle(String),

    /// Every navigation layer failed, including the full relaunch.
    #[error("navigation failed: {0}")]
    NavigationExhausted(String),

    /// No supported browser binary could be found on PATH.
    #[error("no browser binary found (tried: {0})")]
    NoBrowser(String),

    /// An external command (systemctl, xrandr) failed after bounded retries.
    #[error("external command failed: {0}")]
    External(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KioskError {
    /// Shorthand for a validation rejection.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// True for errors a gateway handler should map to HTTP 400.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::OutOfRange { .. } | Self::NothingToCycle(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KioskError>;
