// SPDX-License-Identifier: MIT
pub mod browser;
pub mod cli;
pub mod config;
pub mod diag;
pub mod display;
pub mod error;
pub mod gateway;
pub mod playlist;
pub mod registry;
pub mod retry;
pub mod service;

use std::path::PathBuf;
use std::sync::Arc;

use browser::navigate::Navigate;
use config::ConfigStore;
use playlist::PlaylistManager;
use registry::ProcessRegistry;
use retry::RetryConfig;

/// Shared state passed to every gateway handler.
pub struct AppContext {
    pub store: Arc<ConfigStore>,
    pub playlist: Arc<PlaylistManager>,
    pub navigator: Arc<dyn Navigate>,
    pub registry: Arc<dyn ProcessRegistry>,
    pub data_dir: PathBuf,
    /// Current daemon log file, served by the logs endpoint and captured
    /// into diagnostic snapshots.
    pub log_path: PathBuf,
    pub started_at: std::time::Instant,
    /// Retry policy for service-control commands; tests shrink it.
    pub service_retry: RetryConfig,
}
