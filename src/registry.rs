// SPDX-License-Identifier: MIT
//! Process registry: the shared point of truth for "which pid is playing
//! which role".
//!
//! Roles are the long-running actors: the browser process, the cycling
//! scheduler, and the health monitor. The file-backed implementation writes
//! one pid file per role under `{data_dir}/run/`; the in-memory one backs
//! tests. Terminating an already-dead pid is a no-op, which is what makes
//! concurrent restarts from the scheduler and the health monitor safe to
//! leave uncoordinated.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Roles tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    Browser,
    Scheduler,
    HealthMonitor,
}

impl ProcessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Scheduler => "scheduler",
            Self::HealthMonitor => "health-monitor",
        }
    }
}

/// Map from role to last known process identity.
#[async_trait]
pub trait ProcessRegistry: Send + Sync {
    /// Record `pid` as the current holder of `role`.
    fn record(&self, role: ProcessRole, pid: u32);

    /// The last recorded pid for `role`, if any.
    fn lookup(&self, role: ProcessRole) -> Option<u32>;

    /// Forget the recorded pid for `role`.
    fn clear(&self, role: ProcessRole);

    /// Whether the recorded pid for `role` refers to a live process.
    fn is_alive(&self, role: ProcessRole) -> bool {
        self.lookup(role).is_some_and(pid_alive)
    }

    /// Terminate the recorded process for `role`: graceful signal first, then
    /// a forced kill after `grace`. Clears the record afterwards. A dead or
    /// missing pid is a no-op. Async so the grace wait never ties up a
    /// runtime worker.
    async fn terminate(&self, role: ProcessRole, grace: std::time::Duration) {
        let Some(pid) = self.lookup(role) else {
            return;
        };
        if pid_alive(pid) {
            debug!(role = role.as_str(), pid, "terminating recorded process");
            signal_term(pid);
            let deadline = tokio::time::Instant::now() + grace;
            while pid_alive(pid) && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            if pid_alive(pid) {
                warn!(role = role.as_str(), pid, "graceful stop timed out, killing");
                signal_kill(pid);
            }
        }
        self.clear(role);
    }
}

// ─── File-backed implementation ───────────────────────────────────────────────

/// Pid files under `{data_dir}/run/{role}.pid`.
pub struct FileProcessRegistry {
    run_dir: PathBuf,
}

impl FileProcessRegistry {
    pub fn new(data_dir: &std::path::Path) -> std::io::Result<Self> {
        let run_dir = data_dir.join("run");
        std::fs::create_dir_all(&run_dir)?;
        Ok(Self { run_dir })
    }

    fn pid_path(&self, role: ProcessRole) -> PathBuf {
        self.run_dir.join(format!("{}.pid", role.as_str()))
    }
}

impl ProcessRegistry for FileProcessRegistry {
    fn record(&self, role: ProcessRole, pid: u32) {
        if let Err(e) = std::fs::write(self.pid_path(role), pid.to_string()) {
            warn!(role = role.as_str(), pid, err = %e, "failed to write pid file");
        }
    }

    fn lookup(&self, role: ProcessRole) -> Option<u32> {
        let content = std::fs::read_to_string(self.pid_path(role)).ok()?;
        content.trim().parse().ok()
    }

    fn clear(&self, role: ProcessRole) {
        let _ = std::fs::remove_file(self.pid_path(role));
    }
}

// ─── In-memory implementation (tests) ─────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryProcessRegistry {
    pids: Mutex<HashMap<ProcessRole, u32>>,
}

impl InMemoryProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessRegistry for InMemoryProcessRegistry {
    fn record(&self, role: ProcessRole, pid: u32) {
        self.pids.lock().expect("registry lock").insert(role, pid);
    }

    fn lookup(&self, role: ProcessRole) -> Option<u32> {
        self.pids.lock().expect("registry lock").get(&role).copied()
    }

    fn clear(&self, role: ProcessRole) {
        self.pids.lock().expect("registry lock").remove(&role);
    }
}

// ─── Signals ──────────────────────────────────────────────────────────────────

/// True when `pid` refers to a live process (signal 0 probe).
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    // kill(pid, 0) succeeds, or fails with EPERM, iff the process exists.
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn signal_term(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn signal_term(_pid: u32) {}

#[cfg(unix)]
fn signal_kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn signal_kill(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_record_lookup_clear() {
        let reg = InMemoryProcessRegistry::new();
        assert_eq!(reg.lookup(ProcessRole::Browser), None);
        reg.record(ProcessRole::Browser, 4242);
        assert_eq!(reg.lookup(ProcessRole::Browser), Some(4242));
        reg.clear(ProcessRole::Browser);
        assert_eq!(reg.lookup(ProcessRole::Browser), None);
    }

    #[test]
    fn file_registry_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let reg = FileProcessRegistry::new(dir.path()).unwrap();
        reg.record(ProcessRole::Scheduler, 999_999);
        assert_eq!(reg.lookup(ProcessRole::Scheduler), Some(999_999));
        reg.clear(ProcessRole::Scheduler);
        assert_eq!(reg.lookup(ProcessRole::Scheduler), None);
    }

    #[tokio::test]
    async fn terminate_missing_pid_is_noop() {
        let reg = InMemoryProcessRegistry::new();
        // No record, must not panic or block.
        reg.terminate(ProcessRole::Browser, std::time::Duration::from_millis(10))
            .await;
    }

    #[tokio::test]
    async fn terminate_dead_pid_clears_record() {
        let reg = InMemoryProcessRegistry::new();
        // Above the default kernel pid_max, so certainly not alive.
        reg.record(ProcessRole::Browser, 4_000_000);
        reg.terminate(ProcessRole::Browser, std::time::Duration::from_millis(10))
            .await;
        assert_eq!(reg.lookup(ProcessRole::Browser), None);
    }

    #[cfg(unix)]
    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn bogus_pid_is_dead() {
        // Pid 4000000 is above the default kernel pid_max.
        assert!(!pid_alive(4_000_000));
    }
}
