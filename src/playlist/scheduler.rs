// SPDX-License-Identifier: MIT
//! Cycling scheduler: the background loop that walks the playlist.
//!
//! State machine: Idle → Running → (Stopped | Disabled). The scheduler only
//! starts when the playlist is enabled with more than one entry; anything
//! less is "nothing to cycle" and is reported as a failure instead of
//! spinning on a single page.
//!
//! Each iteration re-reads the authoritative config fresh from the store, so
//! external disables and playlist edits take effect within one cycle
//! boundary. The sleep is the sole suspension point; `disable()` does not
//! wait it out, it force-stops the task, mirroring the kill-based stop the
//! registry records for cross-process callers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::navigate::Navigate;
use crate::config::ConfigStore;
use crate::error::{KioskError, Result};
use crate::playlist::cursor::Cursor;
use crate::registry::{ProcessRegistry, ProcessRole};

/// Upper bound on a single navigation call so a hung browser cannot stall
/// the loop indefinitely.
const NAV_TIMEOUT: Duration = Duration::from_secs(15);

/// Timing knobs, separated out so tests can run the loop without real waits.
#[derive(Debug, Clone)]
pub struct SchedulerTiming {
    /// Wall-clock duration of one display-time second.
    pub sleep_unit: Duration,
    /// Bound on each navigation call.
    pub nav_timeout: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            sleep_unit: Duration::from_secs(1),
            nav_timeout: NAV_TIMEOUT,
        }
    }
}

impl SchedulerTiming {
    /// Millisecond-scale timing for tests.
    pub fn instant() -> Self {
        Self {
            sleep_unit: Duration::from_millis(1),
            nav_timeout: Duration::from_millis(200),
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Playlist was disabled under us.
    Disabled,
    /// Playlist shrank to one entry or fewer.
    Stopped,
}

/// Handle to a running scheduler task. Dropping the handle does not stop the
/// loop; call [`SchedulerHandle::stop`].
pub struct SchedulerHandle {
    task: JoinHandle<StopReason>,
    registry: Arc<dyn ProcessRegistry>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("running", &!self.task.is_finished())
            .finish()
    }
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Force-stop the loop, mid-sleep included, and clear the registry record.
    pub fn stop(self) {
        if !self.task.is_finished() {
            self.task.abort();
        }
        self.registry.clear(ProcessRole::Scheduler);
        info!("cycling scheduler stopped");
    }
}

/// Everything the loop needs, shared with the rest of the daemon.
pub struct SchedulerDeps {
    pub store: Arc<ConfigStore>,
    pub cursor: Arc<Cursor>,
    pub navigator: Arc<dyn Navigate>,
    pub registry: Arc<dyn ProcessRegistry>,
}

/// Start the cycling loop.
///
/// Fails with [`KioskError::NothingToCycle`] when the playlist is disabled or
/// has fewer than two entries, the degenerate case must not loop.
pub async fn start(deps: SchedulerDeps, timing: SchedulerTiming) -> Result<SchedulerHandle> {
    let config = deps.store.document().await;
    if !config.playlist.enabled {
        return Err(KioskError::NothingToCycle("playlist is disabled".into()));
    }
    let len = config.playlist.urls.len();
    if len <= 1 {
        return Err(KioskError::NothingToCycle(format!(
            "{len} playlist entries (need at least 2)"
        )));
    }

    // Only one scheduler at a time: the registry records this process as the
    // holder so a stale instance from a previous daemon run gets cleaned up.
    deps.registry
        .terminate(ProcessRole::Scheduler, Duration::from_secs(2))
        .await;
    deps.registry
        .record(ProcessRole::Scheduler, std::process::id());

    let registry = deps.registry.clone();
    info!(entries = len, "cycling scheduler started");
    let task = tokio::spawn(run_loop(deps, timing));

    Ok(SchedulerHandle { task, registry })
}

async fn run_loop(deps: SchedulerDeps, timing: SchedulerTiming) -> StopReason {
    loop {
        // Fresh read, never a cached copy.
        let config = deps.store.document().await;
        if !config.playlist.enabled {
            info!("playlist disabled, scheduler exiting");
            deps.registry.clear(ProcessRole::Scheduler);
            return StopReason::Disabled;
        }
        let len = config.playlist.urls.len();
        if len <= 1 {
            info!(entries = len, "playlist degenerate, scheduler exiting");
            deps.registry.clear(ProcessRole::Scheduler);
            return StopReason::Stopped;
        }

        let index = deps.cursor.read(len);
        let entry = &config.playlist.urls[index];
        let display_secs = config.resolve_display_time(entry);
        debug!(index, url = %entry.url, display_secs, "showing playlist entry");

        // Sole suspension point. Not cancellable from inside; disable()
        // aborts the task instead of waiting.
        tokio::time::sleep(timing.sleep_unit * display_secs as u32).await;

        // Re-read after the wake, the world may have changed while we slept.
        let config = deps.store.document().await;
        let len = config.playlist.urls.len();
        if !config.playlist.enabled {
            info!("playlist disabled during sleep, scheduler exiting");
            deps.registry.clear(ProcessRole::Scheduler);
            return StopReason::Disabled;
        }
        if len <= 1 {
            info!(entries = len, "playlist shrank, scheduler exiting");
            deps.registry.clear(ProcessRole::Scheduler);
            return StopReason::Stopped;
        }

        let next = deps.cursor.advance(len);
        let url = config.playlist.urls[next].url.clone();

        match tokio::time::timeout(timing.nav_timeout, deps.navigator.navigate(&url)).await {
            Ok(Ok(report)) => {
                debug!(index = next, url = %url, layer = %report.layer, "advanced playlist");
            }
            Ok(Err(e)) => {
                // Navigation failures are transient from the loop's point of
                // view; the next cycle tries the next entry regardless.
                warn!(url = %url, err = %e, "navigation failed, continuing cycle");
            }
            Err(_) => {
                warn!(url = %url, "navigation timed out, continuing cycle");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::navigate::NavigationReport;
    use crate::config::{KioskConfig, PlaylistEntry};
    use crate::registry::InMemoryProcessRegistry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingNavigator {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Navigate for RecordingNavigator {
        async fn navigate(&self, url: &str) -> Result<NavigationReport> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(NavigationReport::success("test", 0))
        }
    }

    fn entry(url: &str, secs: u64) -> PlaylistEntry {
        PlaylistEntry {
            url: url.to_string(),
            display_time: Some(secs),
            title: String::new(),
        }
    }

    async fn deps_with(config: KioskConfig) -> (tempfile::TempDir, SchedulerDeps, Arc<RecordingNavigator>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
        store.replace(&config).await.unwrap();
        let cursor = Arc::new(Cursor::new(dir.path()).unwrap());
        let navigator = Arc::new(RecordingNavigator {
            urls: Mutex::new(Vec::new()),
        });
        let deps = SchedulerDeps {
            store,
            cursor,
            navigator: navigator.clone(),
            registry: Arc::new(InMemoryProcessRegistry::new()),
        };
        (dir, deps, navigator)
    }

    #[tokio::test]
    async fn refuses_disabled_playlist() {
        let (_dir, deps, _nav) = deps_with(KioskConfig::default()).await;
        let err = start(deps, SchedulerTiming::instant()).await.unwrap_err();
        assert!(matches!(err, KioskError::NothingToCycle(_)));
    }

    #[tokio::test]
    async fn refuses_single_entry_playlist() {
        let mut config = KioskConfig::default();
        config.playlist.enabled = true;
        config.playlist.urls = vec![entry("http://only.example", 60)];
        let (_dir, deps, _nav) = deps_with(config).await;
        let err = start(deps, SchedulerTiming::instant()).await.unwrap_err();
        assert!(matches!(err, KioskError::NothingToCycle(_)));
    }

    #[tokio::test]
    async fn advances_cursor_and_navigates() {
        let mut config = KioskConfig::default();
        config.playlist.enabled = true;
        config.playlist.urls = vec![
            entry("http://a.example", 60),
            entry("http://b.example", 45),
        ];
        let (_dir, deps, nav) = deps_with(config.clone()).await;
        let store = deps.store.clone();

        let handle = start(deps, SchedulerTiming::instant()).await.unwrap();

        // 60 simulated seconds at 1 ms each, so the first advance lands
        // around 60 ms. Poll for it rather than sleeping a fixed interval;
        // the loop keeps cycling while we watch, so assert on the recorded
        // navigation sequence, not the live cursor.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while nav.urls.lock().unwrap().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // First advance goes from entry 0 to entry 1.
        assert_eq!(
            nav.urls.lock().unwrap().first().map(String::as_str),
            Some("http://b.example")
        );

        // Disable mid-flight: the loop notices at its next checkpoint.
        config.playlist.enabled = false;
        store.replace(&config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn stop_aborts_mid_sleep() {
        let mut config = KioskConfig::default();
        config.playlist.enabled = true;
        // Long display time so the loop parks in its sleep.
        config.playlist.urls = vec![
            entry("http://a.example", 86_400),
            entry("http://b.example", 86_400),
        ];
        let (_dir, deps, _nav) = deps_with(config).await;
        let registry = deps.registry.clone();

        let handle = start(deps, SchedulerTiming::default()).await.unwrap();
        assert!(handle.is_running());
        assert_eq!(registry.lookup(ProcessRole::Scheduler), Some(std::process::id()));

        handle.stop();
        assert_eq!(registry.lookup(ProcessRole::Scheduler), None);
    }
}
