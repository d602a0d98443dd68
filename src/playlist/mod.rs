// SPDX-License-Identifier: MIT
//! Playlist operations: the mutating surface over the config store, the
//! cursor, and the cycling scheduler.
//!
//! Every mutating operation backs up the config document first. Validation
//! happens before any state changes; nothing invalid is ever persisted.

pub mod cursor;
pub mod scheduler;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::browser::navigate::Navigate;
use crate::config::validate::{derive_title, validate_display_time, validate_url};
use crate::config::{ConfigStore, PlaylistEntry};
use crate::error::{KioskError, Result};
use crate::registry::ProcessRegistry;
use cursor::Cursor;
use scheduler::{SchedulerDeps, SchedulerHandle, SchedulerTiming};

/// How `add_url` treats the existing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    Append,
    Replace,
}

/// Read-only rendering of the playlist with the active entry marked.
#[derive(Debug, Serialize)]
pub struct PlaylistView {
    pub enabled: bool,
    /// Only meaningful while enabled.
    pub active_index: usize,
    pub entries: Vec<PlaylistEntry>,
}

/// Outcome of a multi-step replace: which steps ran, and where it stopped.
#[derive(Debug, Serialize)]
pub struct ReplaceReport {
    pub success: bool,
    pub steps_completed: usize,
    pub steps_total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Owns the scheduler handle and exposes the playlist operations the gateway
/// and CLI map onto.
pub struct PlaylistManager {
    store: Arc<ConfigStore>,
    cursor: Arc<Cursor>,
    navigator: Arc<dyn Navigate>,
    registry: Arc<dyn ProcessRegistry>,
    timing: SchedulerTiming,
    handle: Mutex<Option<SchedulerHandle>>,
}

impl PlaylistManager {
    pub fn new(
        store: Arc<ConfigStore>,
        cursor: Arc<Cursor>,
        navigator: Arc<dyn Navigate>,
        registry: Arc<dyn ProcessRegistry>,
        timing: SchedulerTiming,
    ) -> Self {
        Self {
            store,
            cursor,
            navigator,
            registry,
            timing,
            handle: Mutex::new(None),
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Whether the cycling scheduler task is live.
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }

    /// Validate and add a URL. Title defaults to the URL host; display time
    /// defaults to the playlist default (stored as "unset" so later default
    /// changes apply). Returns the new playlist length.
    pub async fn add_url(
        &self,
        url: &str,
        display_time: Option<i64>,
        title: Option<String>,
        mode: AddMode,
    ) -> Result<usize> {
        let url = validate_url(url)?.to_string();
        let display_time = match display_time {
            Some(secs) => Some(validate_display_time(secs)?),
            None => None,
        };
        let title = match title.filter(|t| !t.trim().is_empty()) {
            Some(t) => t,
            None => derive_title(&url),
        };

        self.store.backup().await?;

        let mut config = self.store.document().await;
        let entry = PlaylistEntry {
            url: url.clone(),
            display_time,
            title,
        };
        match mode {
            AddMode::Append => config.playlist.urls.push(entry),
            AddMode::Replace => config.playlist.urls = vec![entry],
        }
        let len = config.playlist.urls.len();
        self.store.replace(&config).await?;
        info!(url = %url, mode = ?mode, len, "playlist entry added");
        Ok(len)
    }

    /// Remove the entry at `index`. Out of range is a typed error and the
    /// playlist is left unchanged; the cursor is not adjusted here, the
    /// clamp-on-read rule covers any index shift.
    pub async fn remove_url(&self, index: usize) -> Result<PlaylistEntry> {
        let config = self.store.document().await;
        let len = config.playlist.urls.len();
        if index >= len {
            return Err(KioskError::OutOfRange { index, len });
        }

        self.store.backup().await?;

        let mut config = config;
        let removed = config.playlist.urls.remove(index);
        self.store.replace(&config).await?;
        info!(index, url = %removed.url, "playlist entry removed");
        Ok(removed)
    }

    /// Enable cycling: `enabled = true`, cursor reset to 0, scheduler started
    /// unless already live. A degenerate playlist (< 2 entries) leaves
    /// `enabled` set but reports the scheduler's refusal to the caller.
    pub async fn enable(&self) -> Result<()> {
        self.store
            .set_value("playlist.enabled", serde_json::Value::Bool(true))
            .await?;
        self.cursor.reset();

        let mut slot = self.handle.lock().await;
        if slot.as_ref().is_some_and(SchedulerHandle::is_running) {
            info!("cycling scheduler already running");
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            stale.stop();
        }

        let deps = SchedulerDeps {
            store: self.store.clone(),
            cursor: self.cursor.clone(),
            navigator: self.navigator.clone(),
            registry: self.registry.clone(),
        };
        match scheduler::start(deps, self.timing.clone()).await {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!(err = %e, "playlist enabled but scheduler did not start");
                Err(e)
            }
        }
    }

    /// Disable cycling: `enabled = false`, scheduler force-stopped, cursor
    /// cleared. Idempotent, a second call is a no-op that still succeeds.
    pub async fn disable(&self) -> Result<()> {
        self.store
            .set_value("playlist.enabled", serde_json::Value::Bool(false))
            .await?;
        if let Some(handle) = self.handle.lock().await.take() {
            handle.stop();
        }
        self.cursor.clear();
        Ok(())
    }

    /// Current entries with the active one marked by index.
    pub async fn show(&self) -> PlaylistView {
        let config = self.store.document().await;
        let len = config.playlist.urls.len();
        PlaylistView {
            enabled: config.playlist.enabled,
            active_index: self.cursor.read(len),
            entries: config.playlist.urls,
        }
    }

    /// Remove every entry and stop cycling.
    pub async fn clear(&self) -> Result<()> {
        self.store.backup().await?;
        let mut config = self.store.document().await;
        config.playlist.urls.clear();
        config.playlist.enabled = false;
        self.store.replace(&config).await?;
        if let Some(handle) = self.handle.lock().await.take() {
            handle.stop();
        }
        self.cursor.clear();
        info!("playlist cleared");
        Ok(())
    }

    /// Replace the whole playlist with `urls` and enable cycling: first entry
    /// with replace semantics, the rest appended, then `enable()`. Each
    /// step's failure short-circuits the remainder; the report names the
    /// failed step.
    pub async fn replace_all(&self, urls: &[String]) -> ReplaceReport {
        let steps_total = urls.len() + 1;
        let mut steps_completed = 0;

        for (i, url) in urls.iter().enumerate() {
            let mode = if i == 0 { AddMode::Replace } else { AddMode::Append };
            if let Err(e) = self.add_url(url, None, None, mode).await {
                return ReplaceReport {
                    success: false,
                    steps_completed,
                    steps_total,
                    failed_step: Some(format!("add entry {i} ({url})")),
                    error: Some(e.to_string()),
                };
            }
            steps_completed += 1;
        }

        if let Err(e) = self.enable().await {
            return ReplaceReport {
                success: false,
                steps_completed,
                steps_total,
                failed_step: Some("enable".to_string()),
                error: Some(e.to_string()),
            };
        }
        steps_completed += 1;

        ReplaceReport {
            success: true,
            steps_completed,
            steps_total,
            failed_step: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::navigate::NavigationReport;
    use crate::registry::InMemoryProcessRegistry;
    use async_trait::async_trait;

    struct NullNavigator;

    #[async_trait]
    impl Navigate for NullNavigator {
        async fn navigate(&self, _url: &str) -> Result<NavigationReport> {
            Ok(NavigationReport::success("test", 0))
        }
    }

    fn manager() -> (tempfile::TempDir, PlaylistManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
        let cursor = Arc::new(Cursor::new(dir.path()).unwrap());
        let manager = PlaylistManager::new(
            store,
            cursor,
            Arc::new(NullNavigator),
            Arc::new(InMemoryProcessRegistry::new()),
            SchedulerTiming::instant(),
        );
        (dir, manager)
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let (_dir, m) = manager();
        m.add_url("http://a.example", Some(60), Some("A".into()), AddMode::Append)
            .await
            .unwrap();
        m.add_url("http://b.example", Some(45), Some("B".into()), AddMode::Append)
            .await
            .unwrap();

        let view = m.show().await;
        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.entries[0].url, "http://a.example");
        assert_eq!(view.entries[0].display_time, Some(60));
        assert_eq!(view.entries[0].title, "A");
        assert_eq!(view.entries[1].url, "http://b.example");
        assert_eq!(view.entries[1].display_time, Some(45));
    }

    #[tokio::test]
    async fn replace_mode_discards_existing_and_derives_title() {
        let (_dir, m) = manager();
        m.add_url("http://a.example", Some(60), Some("A".into()), AddMode::Append)
            .await
            .unwrap();
        m.add_url("http://b.example", Some(45), Some("B".into()), AddMode::Append)
            .await
            .unwrap();

        m.add_url("http://x.example", Some(30), None, AddMode::Replace)
            .await
            .unwrap();

        let view = m.show().await;
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].url, "http://x.example");
        assert_eq!(view.entries[0].title, "x.example");
    }

    #[tokio::test]
    async fn invalid_url_rejected_before_mutation() {
        let (_dir, m) = manager();
        let err = m
            .add_url("not-a-url", None, None, AddMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::Validation(_)));
        assert!(m.show().await.entries.is_empty());
    }

    #[tokio::test]
    async fn remove_out_of_range_leaves_playlist_unchanged() {
        let (_dir, m) = manager();
        for url in ["http://a.example", "http://b.example", "http://c.example"] {
            m.add_url(url, None, None, AddMode::Append).await.unwrap();
        }
        let err = m.remove_url(5).await.unwrap_err();
        assert!(matches!(err, KioskError::OutOfRange { index: 5, len: 3 }));
        assert_eq!(m.show().await.entries.len(), 3);
    }

    #[tokio::test]
    async fn remove_shifts_subsequent_entries() {
        let (_dir, m) = manager();
        for url in ["http://a.example", "http://b.example", "http://c.example"] {
            m.add_url(url, None, None, AddMode::Append).await.unwrap();
        }
        let removed = m.remove_url(1).await.unwrap();
        assert_eq!(removed.url, "http://b.example");
        let view = m.show().await;
        assert_eq!(view.entries[1].url, "http://c.example");
    }

    #[tokio::test]
    async fn enable_sets_cursor_zero_and_starts_scheduler() {
        let (_dir, m) = manager();
        m.add_url("http://a.example", Some(60), None, AddMode::Append)
            .await
            .unwrap();
        m.add_url("http://b.example", Some(45), None, AddMode::Append)
            .await
            .unwrap();

        m.cursor().write(1).unwrap();
        m.enable().await.unwrap();
        assert_eq!(m.cursor().read_raw(), 0);
        assert!(m.is_running().await);

        m.disable().await.unwrap();
    }

    #[tokio::test]
    async fn disable_twice_is_idempotent() {
        let (_dir, m) = manager();
        m.add_url("http://a.example", None, None, AddMode::Append)
            .await
            .unwrap();
        m.add_url("http://b.example", None, None, AddMode::Append)
            .await
            .unwrap();
        m.enable().await.unwrap();

        m.disable().await.unwrap();
        assert!(!m.is_running().await);
        let first = m.show().await;
        assert!(!first.enabled);

        m.disable().await.unwrap();
        assert!(!m.is_running().await);
        assert!(!m.show().await.enabled);
    }

    #[tokio::test]
    async fn enable_with_single_entry_reports_nothing_to_cycle() {
        let (_dir, m) = manager();
        m.add_url("http://only.example", None, None, AddMode::Append)
            .await
            .unwrap();
        let err = m.enable().await.unwrap_err();
        assert!(matches!(err, KioskError::NothingToCycle(_)));
        assert!(!m.is_running().await);
    }

    #[tokio::test]
    async fn replace_all_short_circuits_on_bad_entry() {
        let (_dir, m) = manager();
        let report = m
            .replace_all(&[
                "http://ok.example".to_string(),
                "javascript:alert(1)".to_string(),
                "http://never.example".to_string(),
            ])
            .await;
        assert!(!report.success);
        assert_eq!(report.steps_completed, 1);
        assert_eq!(report.failed_step.as_deref(), Some("add entry 1 (javascript:alert(1))"));
        // The third entry was never attempted.
        assert_eq!(m.show().await.entries.len(), 1);
    }

    #[tokio::test]
    async fn replace_all_enables_on_success() {
        let (_dir, m) = manager();
        let report = m
            .replace_all(&[
                "http://a.example".to_string(),
                "http://b.example".to_string(),
            ])
            .await;
        assert!(report.success, "{report:?}");
        assert_eq!(report.steps_completed, 3);
        assert!(m.show().await.enabled);
        assert!(m.is_running().await);
        m.disable().await.unwrap();
    }
}
