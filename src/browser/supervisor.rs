// SPDX-License-Identifier: MIT
//! Browser process lifecycle and health monitoring.
//!
//! The supervisor owns launching the kiosk browser, the periodic health
//! loop that relaunches it on crash or memory pressure, and the escalation
//! path: repeated restarts within one monitoring session cross a threshold
//! and trigger a critical diagnostic snapshot. The memory ceiling is
//! derived once at startup from total system RAM and never re-sampled.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{ProcessesToUpdate, System};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ConfigStore;
use crate::diag;
use crate::display;
use crate::error::{KioskError, Result};
use crate::registry::{ProcessRegistry, ProcessRole};
use crate::retry::RetryConfig;
use crate::service::{systemctl, KIOSK_SERVICE};

use super::navigate::BrowserRelauncher;

/// Remote-debugging port the browser is always launched with.
pub const DEBUG_PORT: u16 = 9222;

/// Restarts within one monitoring session before escalating to a
/// diagnostic snapshot.
const RESTART_ESCALATION_THRESHOLD: u32 = 5;

/// Diagnostic snapshots kept on disk after each escalation.
const MAX_SNAPSHOTS: usize = 20;

/// Browser binaries probed on PATH, preferred order first.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium-browser",
    "chromium",
    "google-chrome",
    "chrome",
];

/// Profile lock files a crashed browser leaves behind. A relaunch against a
/// locked profile opens a restore dialog instead of the kiosk page.
const PROFILE_LOCKS: &[&str] = &["SingletonLock", "SingletonSocket", "SingletonCookie"];

// ─── Memory ceiling ───────────────────────────────────────────────────────────

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Pick the browser memory ceiling for a machine with `total_bytes` of RAM.
/// Tiers run from constrained single-board hardware up to desktop boxes.
pub fn memory_ceiling(total_bytes: u64) -> u64 {
    match total_bytes {
        t if t < GIB => 700 * MIB,
        t if t < 2 * GIB => 1 * GIB,
        t if t < 4 * GIB => 3 * GIB / 2,
        t if t < 8 * GIB => 3 * GIB,
        _ => 6 * GIB,
    }
}

// ─── Health decisions ─────────────────────────────────────────────────────────

/// One snapshot of what the health loop observed.
#[derive(Debug, Clone, Copy)]
pub struct HealthObservation {
    pub browser_alive: bool,
    pub memory_bytes: u64,
    pub display_responsive: bool,
}

/// What a health tick decided to do about the browser process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    None,
    /// Browser gone; counts toward the escalation threshold.
    RelaunchCrashed,
    /// Over the memory ceiling; relaunch but do not count as a crash.
    RelaunchMemory,
}

/// Pure decision function for one health tick.
pub fn decide(obs: &HealthObservation, ceiling: u64) -> BrowserAction {
    if !obs.browser_alive {
        BrowserAction::RelaunchCrashed
    } else if obs.memory_bytes > ceiling {
        BrowserAction::RelaunchMemory
    } else {
        BrowserAction::None
    }
}

// ─── Launch flags ─────────────────────────────────────────────────────────────

/// Build the full browser argument list. GPU flags differ on ARM boards,
/// where the default GL path stalls under compositing.
pub fn browser_args(url: &str, profile_dir: &str, arm: bool) -> Vec<String> {
    let mut args = vec![
        "--kiosk".to_string(),
        "--no-sandbox".to_string(),
        "--noerrdialogs".to_string(),
        "--disable-infobars".to_string(),
        "--disable-session-crashed-bubble".to_string(),
        "--disable-translate".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
        format!("--remote-debugging-port={DEBUG_PORT}"),
        format!("--user-data-dir={profile_dir}"),
    ];
    if arm {
        args.push("--use-gl=egl".to_string());
        args.push("--enable-features=VaapiVideoDecoder".to_string());
    } else {
        args.push("--disable-gpu-driver-bug-workarounds".to_string());
    }
    args.push(url.to_string());
    args
}

/// Find the first browser candidate present on PATH.
pub fn find_browser_binary() -> Result<String> {
    let path = std::env::var("PATH").unwrap_or_default();
    for candidate in BROWSER_CANDIDATES {
        for dir in path.split(':').filter(|d| !d.is_empty()) {
            let full = PathBuf::from(dir).join(candidate);
            if full.is_file() {
                return Ok(candidate.to_string());
            }
        }
    }
    Err(KioskError::NoBrowser(format!(
        "no browser binary on PATH (tried {})",
        BROWSER_CANDIDATES.join(", ")
    )))
}

// ─── Supervisor ───────────────────────────────────────────────────────────────

/// Timing knobs for the supervisor loops; tests shrink them.
#[derive(Debug, Clone)]
pub struct SupervisorTiming {
    /// Interval between health ticks.
    pub health_interval: Duration,
    /// How long a fast restart waits for a live browser before escalating
    /// to a full service restart.
    pub relaunch_wait: Duration,
    /// Poll step while waiting inside `relaunch_wait`.
    pub relaunch_poll: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(30),
            relaunch_wait: Duration::from_secs(10),
            relaunch_poll: Duration::from_millis(500),
        }
    }
}

impl SupervisorTiming {
    pub fn instant() -> Self {
        Self {
            health_interval: Duration::from_millis(5),
            relaunch_wait: Duration::from_millis(20),
            relaunch_poll: Duration::from_millis(2),
        }
    }
}

pub struct BrowserSupervisor {
    store: Arc<ConfigStore>,
    registry: Arc<dyn ProcessRegistry>,
    data_dir: PathBuf,
    log_path: PathBuf,
    profile_dir: PathBuf,
    binary: String,
    ceiling: u64,
    restart_count: AtomicU32,
    sys: Mutex<System>,
    timing: SupervisorTiming,
}

impl BrowserSupervisor {
    pub fn new(
        store: Arc<ConfigStore>,
        registry: Arc<dyn ProcessRegistry>,
        data_dir: PathBuf,
        log_path: PathBuf,
        timing: SupervisorTiming,
    ) -> Result<Self> {
        let binary = find_browser_binary()?;
        let mut sys = System::new();
        sys.refresh_memory();
        let ceiling = memory_ceiling(sys.total_memory());
        info!(
            binary,
            ceiling_mb = ceiling / MIB,
            total_mb = sys.total_memory() / MIB,
            "browser supervisor initialized"
        );
        Ok(Self {
            profile_dir: data_dir.join("browser-profile"),
            store,
            registry,
            data_dir,
            log_path,
            binary,
            ceiling,
            restart_count: AtomicU32::new(0),
            sys: Mutex::new(sys),
            timing,
        })
    }

    /// The memory ceiling selected at startup.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Launch the browser at `url`, replacing any instance the registry
    /// still knows about.
    pub async fn launch(&self, url: &str) -> Result<u32> {
        self.registry
            .terminate(ProcessRole::Browser, Duration::from_secs(3))
            .await;
        self.clear_profile_locks().await;
        display::wait_ready().await?;

        std::fs::create_dir_all(&self.profile_dir)?;
        let profile = self.profile_dir.to_string_lossy().into_owned();
        let arm = cfg!(target_arch = "aarch64") || cfg!(target_arch = "arm");
        let args = browser_args(url, &profile, arm);

        let child = Command::new(&self.binary)
            .args(&args)
            .spawn()
            .map_err(|e| {
                KioskError::External(format!("failed to launch {}: {e}", self.binary))
            })?;
        let pid = child
            .id()
            .ok_or_else(|| KioskError::External("browser exited before pid read".into()))?;
        self.registry.record(ProcessRole::Browser, pid);
        info!(pid, url, binary = %self.binary, "browser launched");
        Ok(pid)
    }

    async fn clear_profile_locks(&self) {
        for lock in PROFILE_LOCKS {
            let path = self.profile_dir.join(lock);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "removed stale profile lock"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove lock"),
            }
        }
    }

    /// Whether the registry's recorded browser process is alive.
    pub fn browser_running(&self) -> bool {
        self.registry.is_alive(ProcessRole::Browser)
    }

    /// Resident memory summed across all browser processes. The browser
    /// forks renderers, so a single-pid reading badly undercounts.
    pub async fn browser_memory_bytes(&self) -> u64 {
        let mut sys = self.sys.lock().await;
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys.processes()
            .values()
            .filter(|p| {
                p.name()
                    .to_string_lossy()
                    .to_ascii_lowercase()
                    .contains("chrom")
            })
            .map(|p| p.memory())
            .sum()
    }

    async fn current_url(&self) -> String {
        self.store
            .get("kiosk.url")
            .await
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "http://localhost".to_string())
    }

    /// Fast restart first: relaunch just the browser and wait a bounded
    /// interval for it to come up. Escalate to a full service restart when
    /// the fast path does not produce a running process in time.
    pub async fn restart_browser(&self, url: &str) -> Result<()> {
        match self.launch(url).await {
            Ok(_) => {
                let deadline = tokio::time::Instant::now() + self.timing.relaunch_wait;
                while tokio::time::Instant::now() < deadline {
                    if self.browser_running() {
                        return Ok(());
                    }
                    tokio::time::sleep(self.timing.relaunch_poll).await;
                }
                warn!(
                    wait_s = self.timing.relaunch_wait.as_secs(),
                    "browser did not come up after fast restart"
                );
            }
            Err(e) => warn!(error = %e, "fast browser restart failed"),
        }
        // Full restart: hand the whole session back to systemd.
        systemctl("restart", KIOSK_SERVICE, &RetryConfig::default()).await?;
        Ok(())
    }

    /// One health-loop iteration. Split from the loop so the decision and
    /// escalation paths are directly drivable in tests.
    pub async fn health_tick(&self) -> Result<BrowserAction> {
        let obs = HealthObservation {
            browser_alive: self.browser_running(),
            memory_bytes: self.browser_memory_bytes().await,
            display_responsive: display::is_responsive().await,
        };
        let action = decide(&obs, self.ceiling);

        match action {
            BrowserAction::RelaunchCrashed => {
                let restarts = self.restart_count.fetch_add(1, Ordering::SeqCst) + 1;
                error!(restarts, "browser process not running, relaunching");
                if restarts >= RESTART_ESCALATION_THRESHOLD {
                    self.restart_count.store(0, Ordering::SeqCst);
                    if let Err(e) = diag::capture_snapshot(
                        &self.data_dir,
                        &self.log_path,
                        &format!("{restarts} browser restarts in one monitoring session"),
                    )
                    .await
                    {
                        error!(error = %e, "failed to capture diagnostic snapshot");
                    }
                    if let Err(e) = diag::prune_snapshots(&self.data_dir, MAX_SNAPSHOTS) {
                        warn!(error = %e, "failed to prune diagnostic snapshots");
                    }
                }
                let url = self.current_url().await;
                self.restart_browser(&url).await?;
            }
            BrowserAction::RelaunchMemory => {
                warn!(
                    memory_mb = obs.memory_bytes / MIB,
                    ceiling_mb = self.ceiling / MIB,
                    "browser over memory ceiling, relaunching"
                );
                let url = self.current_url().await;
                self.restart_browser(&url).await?;
            }
            BrowserAction::None => {}
        }

        // Display health is independent of the browser process.
        if !obs.display_responsive {
            if let Err(e) = display::recover(&RetryConfig::default()).await {
                error!(error = %e, "display recovery failed");
            }
        }
        Ok(action)
    }

    /// Run the health loop forever. Spawn with `tokio::spawn`; liveness and
    /// memory failures are absorbed here, never surfaced to API callers.
    pub async fn run_health_loop(self: Arc<Self>) {
        self.registry
            .record(ProcessRole::HealthMonitor, std::process::id());
        let mut interval = tokio::time::interval(self.timing.health_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = self.health_tick().await {
                error!(error = %e, "health tick failed");
            }
        }
    }
}

#[async_trait]
impl BrowserRelauncher for BrowserSupervisor {
    async fn relaunch(&self, url: &str) -> Result<()> {
        self.restart_browser(url).await
    }
}
