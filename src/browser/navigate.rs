// SPDX-License-Identifier: MIT
//! Layered remote navigation.
//!
//! `Navigator::navigate` drives the live browser to a new URL without a
//! process restart when it can, degrading through progressively heavier
//! strategies and only relaunching the browser as the last resort. Each
//! layer is independent: a failed attempt must leave the browser in a state
//! the next layer can still work with.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::validate::validate_url;
use crate::error::{KioskError, Result};

use super::control::{BrowserControlClient, TabInfo};
use super::BrowserError;

/// How a navigation request was ultimately satisfied.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationReport {
    /// Name of the strategy layer that reported success.
    pub layer: String,
    /// Number of layers tried before the successful one.
    pub attempts: u32,
}

impl NavigationReport {
    pub fn success(layer: impl Into<String>, attempts: u32) -> Self {
        Self {
            layer: layer.into(),
            attempts,
        }
    }
}

/// Entry point used by the scheduler and the gateway alike.
#[async_trait]
pub trait Navigate: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<NavigationReport>;
}

/// Full-restart escape hatch. Implemented by the browser supervisor.
#[async_trait]
pub trait BrowserRelauncher: Send + Sync {
    /// Relaunch the browser process with `url` as its startup page.
    async fn relaunch(&self, url: &str) -> Result<()>;
}

/// One in-place navigation strategy.
#[async_trait]
trait NavigationStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(
        &self,
        client: &dyn BrowserControlClient,
        tabs: &[TabInfo],
        url: &str,
    ) -> std::result::Result<(), BrowserError>;
}

/// Open a fresh tab at the target, then retire the old one. The old tab is
/// only closed after the replacement is confirmed to exist, so a failure
/// here never leaves the kiosk blank.
struct ReplaceTab;

#[async_trait]
impl NavigationStrategy for ReplaceTab {
    fn name(&self) -> &'static str {
        "replace-tab"
    }

    async fn attempt(
        &self,
        client: &dyn BrowserControlClient,
        tabs: &[TabInfo],
        url: &str,
    ) -> std::result::Result<(), BrowserError> {
        let new_tab = client.open_tab(url).await?;
        if new_tab.id.is_empty() {
            return Err(BrowserError::protocol("new tab has no id"));
        }
        for old in tabs.iter().filter(|t| t.is_page() && t.id != new_tab.id) {
            if let Err(e) = client.close_tab(&old.id).await {
                // Leftover tab is cosmetic; the new page is already up.
                warn!(tab = %old.id, error = %e, "failed to close previous tab");
            }
        }
        Ok(())
    }
}

/// Point the existing page at the target via a location-change script.
struct ActivateScript;

#[async_trait]
impl NavigationStrategy for ActivateScript {
    fn name(&self) -> &'static str {
        "activate-script"
    }

    async fn attempt(
        &self,
        client: &dyn BrowserControlClient,
        tabs: &[TabInfo],
        url: &str,
    ) -> std::result::Result<(), BrowserError> {
        let tab = tabs
            .iter()
            .find(|t| t.is_page())
            .ok_or_else(|| BrowserError::protocol("no page tab to activate"))?;
        client.activate_tab(&tab.id).await?;
        let script = location_script(url);
        client.evaluate_script(tab, &script).await?;
        Ok(())
    }
}

/// Open a blank tab and drive it over its dedicated socket channel. When the
/// tab exposes no socket endpoint, fall back to the scripting path against
/// the same tab.
struct SocketDrive;

#[async_trait]
impl NavigationStrategy for SocketDrive {
    fn name(&self) -> &'static str {
        "socket-drive"
    }

    async fn attempt(
        &self,
        client: &dyn BrowserControlClient,
        _tabs: &[TabInfo],
        url: &str,
    ) -> std::result::Result<(), BrowserError> {
        let blank = client.open_tab("about:blank").await?;
        match client.open_page_socket(&blank).await {
            Ok(mut socket) => {
                let outcome = async {
                    socket.enable_page().await?;
                    socket.navigate(url).await
                }
                .await;
                socket.close().await;
                outcome
            }
            Err(BrowserError::NoSocket { tab_id }) => {
                debug!(tab = %tab_id, "no socket endpoint, using scripting fallback");
                client.evaluate_script(&blank, &location_script(url)).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn location_script(url: &str) -> String {
    // URL is already validated; escape quotes anyway.
    format!("window.location.href = \"{}\";", url.replace('"', "%22"))
}

/// Ordered fallback chain over a control client plus a relauncher.
pub struct Navigator {
    control: Arc<dyn BrowserControlClient>,
    relauncher: Arc<dyn BrowserRelauncher>,
}

impl Navigator {
    pub fn new(
        control: Arc<dyn BrowserControlClient>,
        relauncher: Arc<dyn BrowserRelauncher>,
    ) -> Self {
        Self {
            control,
            relauncher,
        }
    }

    async fn relaunch(&self, url: &str, attempts: u32) -> Result<NavigationReport> {
        info!(url, "navigating via browser relaunch");
        self.relauncher.relaunch(url).await?;
        Ok(NavigationReport::success("relaunch", attempts))
    }
}

#[async_trait]
impl Navigate for Navigator {
    async fn navigate(&self, url: &str) -> Result<NavigationReport> {
        let url = validate_url(url)?.to_string();

        // If the debugging endpoint is unreachable or shows no tabs, no
        // in-place layer can work; go straight to the relaunch path.
        let tabs = match self.control.list_tabs().await {
            Ok(tabs) if !tabs.is_empty() => tabs,
            Ok(_) => {
                warn!("browser reports no tabs, skipping in-place layers");
                return self.relaunch(&url, 0).await;
            }
            Err(e) => {
                warn!(error = %e, "debug endpoint unreachable, skipping in-place layers");
                return self.relaunch(&url, 0).await;
            }
        };

        let layers: [&dyn NavigationStrategy; 3] = [&ReplaceTab, &ActivateScript, &SocketDrive];
        let mut attempts = 0u32;
        let mut last_error = String::new();
        for layer in layers {
            match layer.attempt(self.control.as_ref(), &tabs, &url).await {
                Ok(()) => {
                    info!(url, layer = layer.name(), "navigation succeeded");
                    return Ok(NavigationReport::success(layer.name(), attempts));
                }
                Err(e) => {
                    warn!(url, layer = layer.name(), error = %e, "navigation layer failed");
                    last_error = e.to_string();
                    attempts += 1;
                }
            }
        }

        match self.relaunch(&url, attempts).await {
            Ok(report) => Ok(report),
            Err(e) => Err(KioskError::NavigationExhausted(format!(
                "all navigation layers failed (last in-place error: {last_error}; relaunch: {e})"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::cdp::PageSocket;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeControl {
        tabs: Vec<TabInfo>,
        list_fails: bool,
        open_fails: bool,
        script_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeControl {
        fn with_tab(id: &str) -> Self {
            Self {
                tabs: vec![TabInfo {
                    id: id.to_string(),
                    title: "kiosk".into(),
                    url: "http://old.example".into(),
                    kind: "page".into(),
                    ws_url: None,
                }],
                ..Default::default()
            }
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserControlClient for FakeControl {
        async fn list_tabs(&self) -> std::result::Result<Vec<TabInfo>, BrowserError> {
            self.log("list");
            if self.list_fails {
                return Err(BrowserError::unreachable("connection refused"));
            }
            Ok(self.tabs.clone())
        }

        async fn open_tab(&self, url: &str) -> std::result::Result<TabInfo, BrowserError> {
            self.log(format!("open:{url}"));
            if self.open_fails {
                return Err(BrowserError::protocol("open failed"));
            }
            Ok(TabInfo {
                id: "NEW".into(),
                title: String::new(),
                url: url.to_string(),
                kind: "page".into(),
                ws_url: None,
            })
        }

        async fn close_tab(&self, id: &str) -> std::result::Result<(), BrowserError> {
            self.log(format!("close:{id}"));
            Ok(())
        }

        async fn activate_tab(&self, id: &str) -> std::result::Result<(), BrowserError> {
            self.log(format!("activate:{id}"));
            Ok(())
        }

        async fn evaluate_script(
            &self,
            tab: &TabInfo,
            _script: &str,
        ) -> std::result::Result<(), BrowserError> {
            self.log(format!("script:{}", tab.id));
            if self.script_fails {
                return Err(BrowserError::protocol("script failed"));
            }
            Ok(())
        }

        async fn open_page_socket(
            &self,
            tab: &TabInfo,
        ) -> std::result::Result<PageSocket, BrowserError> {
            self.log(format!("socket:{}", tab.id));
            Err(BrowserError::NoSocket {
                tab_id: tab.id.clone(),
            })
        }
    }

    #[derive(Default)]
    struct FakeRelauncher {
        calls: Mutex<Vec<String>>,
        fails: bool,
    }

    #[async_trait]
    impl BrowserRelauncher for FakeRelauncher {
        async fn relaunch(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.fails {
                return Err(KioskError::External("systemctl restart failed".into()));
            }
            Ok(())
        }
    }

    fn navigator(control: FakeControl, relauncher: FakeRelauncher) -> (Navigator, Arc<FakeControl>, Arc<FakeRelauncher>) {
        let control = Arc::new(control);
        let relauncher = Arc::new(relauncher);
        (
            Navigator::new(control.clone(), relauncher.clone()),
            control,
            relauncher,
        )
    }

    #[tokio::test]
    async fn invalid_url_fails_fast() {
        let (nav, control, _) = navigator(FakeControl::with_tab("T1"), FakeRelauncher::default());
        let err = nav.navigate("javascript:alert(1)").await.unwrap_err();
        assert!(err.is_client_error());
        assert!(control.calls().is_empty(), "no browser traffic on bad input");
    }

    #[tokio::test]
    async fn replace_tab_closes_old_after_new_confirmed() {
        let (nav, control, relauncher) =
            navigator(FakeControl::with_tab("T1"), FakeRelauncher::default());
        let report = nav.navigate("http://next.example").await.unwrap();
        assert_eq!(report.layer, "replace-tab");
        assert_eq!(report.attempts, 0);
        let calls = control.calls();
        assert_eq!(calls, vec!["list", "open:http://next.example", "close:T1"]);
        assert!(relauncher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_skips_to_relaunch() {
        let control = FakeControl {
            list_fails: true,
            ..FakeControl::with_tab("T1")
        };
        let (nav, control, relauncher) = navigator(control, FakeRelauncher::default());
        let report = nav.navigate("http://next.example").await.unwrap();
        assert_eq!(report.layer, "relaunch");
        assert_eq!(control.calls(), vec!["list"]);
        assert_eq!(
            relauncher.calls.lock().unwrap().as_slice(),
            ["http://next.example"]
        );
    }

    #[tokio::test]
    async fn empty_tab_list_skips_to_relaunch() {
        let (nav, _, relauncher) = navigator(FakeControl::default(), FakeRelauncher::default());
        let report = nav.navigate("http://next.example").await.unwrap();
        assert_eq!(report.layer, "relaunch");
        assert_eq!(relauncher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn degrades_through_layers_to_scripting() {
        // open_tab fails, so replace-tab and socket-drive both fail; the
        // activate+script layer carries the request.
        let control = FakeControl {
            open_fails: true,
            ..FakeControl::with_tab("T1")
        };
        let (nav, control, _) = navigator(control, FakeRelauncher::default());
        let report = nav.navigate("http://next.example").await.unwrap();
        assert_eq!(report.layer, "activate-script");
        assert_eq!(report.attempts, 1);
        let calls = control.calls();
        assert!(calls.contains(&"activate:T1".to_string()));
        assert!(calls.contains(&"script:T1".to_string()));
    }

    #[tokio::test]
    async fn all_layers_exhausted_reports_failure() {
        let control = FakeControl {
            open_fails: true,
            script_fails: true,
            ..FakeControl::with_tab("T1")
        };
        let relauncher = FakeRelauncher {
            fails: true,
            ..Default::default()
        };
        let (nav, _, _) = navigator(control, relauncher);
        let err = nav.navigate("http://next.example").await.unwrap_err();
        assert!(matches!(err, KioskError::NavigationExhausted(_)));
    }

    #[tokio::test]
    async fn no_socket_falls_back_to_scripting() {
        // Force replace-tab and activate-script to fail so socket-drive runs;
        // its socket open yields NoSocket and the scripting fallback lands.
        struct NoReplace(FakeControl);

        #[async_trait]
        impl BrowserControlClient for NoReplace {
            async fn list_tabs(&self) -> std::result::Result<Vec<TabInfo>, BrowserError> {
                self.0.list_tabs().await
            }
            async fn open_tab(&self, url: &str) -> std::result::Result<TabInfo, BrowserError> {
                if url == "about:blank" {
                    self.0.open_tab(url).await
                } else {
                    self.0.log(format!("open:{url}"));
                    Err(BrowserError::protocol("open failed"))
                }
            }
            async fn close_tab(&self, id: &str) -> std::result::Result<(), BrowserError> {
                self.0.close_tab(id).await
            }
            async fn activate_tab(&self, _id: &str) -> std::result::Result<(), BrowserError> {
                Err(BrowserError::protocol("activate failed"))
            }
            async fn evaluate_script(
                &self,
                tab: &TabInfo,
                script: &str,
            ) -> std::result::Result<(), BrowserError> {
                self.0.evaluate_script(tab, script).await
            }
            async fn open_page_socket(
                &self,
                tab: &TabInfo,
            ) -> std::result::Result<PageSocket, BrowserError> {
                self.0.open_page_socket(tab).await
            }
        }

        let inner = FakeControl::with_tab("T1");
        let control: Arc<dyn BrowserControlClient> = Arc::new(NoReplace(inner));
        let relauncher = Arc::new(FakeRelauncher::default());
        let nav = Navigator::new(control, relauncher.clone());

        let report = nav.navigate("http://next.example").await.unwrap();
        assert_eq!(report.layer, "socket-drive");
        assert_eq!(report.attempts, 2);
        assert!(relauncher.calls.lock().unwrap().is_empty());
    }
}
