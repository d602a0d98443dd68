// SPDX-License-Identifier: MIT
//! X display probes, rotation, and recovery.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::Orientation;
use crate::error::{KioskError, Result};
use crate::retry::{retry_fixed, RetryConfig};
use crate::service::run_command;

/// How long `wait_ready` keeps polling before giving up.
const READY_POLLS: u32 = 30;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// True when the X server answers a `xset q` probe.
pub async fn is_responsive() -> bool {
    match run_command("xset", &["q"]).await {
        Ok(outcome) => outcome.success,
        Err(_) => false,
    }
}

/// Poll until the display server is up. The browser must not be launched
/// against a display that is still starting.
pub async fn wait_ready() -> Result<()> {
    for attempt in 1..=READY_POLLS {
        if is_responsive().await {
            if attempt > 1 {
                info!(attempt, "display became ready");
            }
            return Ok(());
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
    Err(KioskError::External(format!(
        "display not ready after {READY_POLLS}s"
    )))
}

/// Apply a screen rotation via xrandr.
pub async fn apply_orientation(orientation: Orientation) -> Result<()> {
    let rotation = orientation.xrandr_rotation();
    let outcome = run_command("xrandr", &["--orientation", rotation]).await?;
    if outcome.success {
        info!(rotation, "applied display orientation");
        Ok(())
    } else {
        Err(KioskError::External(format!(
            "xrandr --orientation {rotation} failed: {}",
            outcome.output()
        )))
    }
}

/// Display-recovery action for an unresponsive X server: nudge DPMS and
/// force the screen back on. Idempotent, so retried with fixed delay.
pub async fn recover(retry: &RetryConfig) -> Result<()> {
    warn!("display unresponsive, attempting recovery");
    retry_fixed(retry, || async {
        let outcome = run_command("xset", &["dpms", "force", "on"]).await?;
        if outcome.success {
            Ok(())
        } else {
            Err(KioskError::External(format!(
                "xset dpms force on failed: {}",
                outcome.output()
            )))
        }
    })
    .await?;
    // Re-probe so callers learn whether recovery actually worked.
    if is_responsive().await {
        info!("display recovered");
        Ok(())
    } else {
        Err(KioskError::External("display still unresponsive".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotations_map_to_xrandr_names() {
        assert_eq!(Orientation::Normal.xrandr_rotation(), "normal");
        assert_eq!(Orientation::Left.xrandr_rotation(), "left");
        assert_eq!(Orientation::Right.xrandr_rotation(), "right");
        assert_eq!(Orientation::Inverted.xrandr_rotation(), "inverted");
    }
}
