//! Chromium driver over the DevTools protocol (chromiumoxide).

use super::{Browser, Element, View};
use crate::config::BrowserConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::ReloadParams;
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig as CdpConfig, Element as CdpElement, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const READY_STATE_JS: &str = "document.readyState";
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";

/// Quiet period after which the network counts as idle.
const IDLE_WINDOW: Duration = Duration::from_millis(500);
const POLL: Duration = Duration::from_millis(100);

pub struct ChromiumBrowser {
    browser: Mutex<CdpBrowser>,
    handler: JoinHandle<()>,
    /// False when attached to someone else's browser; we never close those.
    launched: bool,
}

impl ChromiumBrowser {
    /// Launch a local browser, or attach to `remote_url` when configured.
    pub async fn start(config: &BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = match &config.remote_url {
            Some(url) => {
                let ws_url = debugger_url(url).await?;
                info!("Connecting to remote browser at {}", ws_url);
                CdpBrowser::connect(ws_url)
                    .await
                    .context("Failed to connect to remote browser")?
            }
            None => {
                info!("Launching browser (headless={})", config.headless);
                CdpBrowser::launch(launch_config(config)?)
                    .await
                    .context("Failed to launch browser")?
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            launched: config.remote_url.is_none(),
        })
    }
}

fn launch_config(config: &BrowserConfig) -> Result<CdpConfig> {
    let mut builder = CdpConfig::builder();
    if let Some(path) = &config.chrome_path {
        builder = builder.chrome_executable(path);
    }
    if !config.headless {
        builder = builder.with_head();
    }
    builder = builder
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--no-first-run");
    for arg in &config.args {
        builder = builder.arg(arg);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))
}

/// Resolve the websocket debugger URL from a `/json/version` endpoint.
async fn debugger_url(url: &str) -> Result<String> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        return Ok(url.to_string());
    }
    let version_url = format!("{}/json/version", url.trim_end_matches('/'));
    let resp: serde_json::Value = reqwest::get(&version_url)
        .await
        .with_context(|| format!("Failed to reach {}", version_url))?
        .json()
        .await
        .context("Failed to parse browser version info")?;

    resp.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl at {}", version_url))
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn open_view(&self) -> Result<Box<dyn View>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("Failed to open tab")?;
        Ok(Box::new(ChromiumView { page }))
    }

    async fn shutdown(&self) -> Result<()> {
        if self.launched {
            let mut browser = self.browser.lock().await;
            browser.close().await.context("Failed to close browser")?;
            let _ = browser.wait().await;
        }
        self.handler.abort();
        Ok(())
    }
}

struct ChromiumView {
    page: Page,
}

impl ChromiumView {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .with_context(|| format!("Script failed: {}", script))?
            .into_value()
            .map_err(|e| anyhow::anyhow!("Unexpected script result: {e:?}"))
    }
}

#[async_trait]
impl View for ChromiumView {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {} failed", url))?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.page
            .execute(ReloadParams::default())
            .await
            .context("Reload failed")?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        loop {
            let state: String = self.eval(READY_STATE_JS).await?;
            if state == "interactive" || state == "complete" {
                debug!("Ready state: {}", state);
                return Ok(());
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn wait_for_network_idle(&self) -> Result<()> {
        let mut last: u64 = self.eval(RESOURCE_COUNT_JS).await?;
        let mut quiet = Duration::ZERO;
        while quiet < IDLE_WINDOW {
            tokio::time::sleep(POLL).await;
            let count: u64 = self.eval(RESOURCE_COUNT_JS).await?;
            if count == last {
                quiet += POLL;
            } else {
                last = count;
                quiet = Duration::ZERO;
            }
        }
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
        let found = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("Query {} failed", selector))?;
        Ok(boxed(found))
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page HTML")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("Failed to close tab")?;
        Ok(())
    }
}

struct ChromiumElement {
    element: CdpElement,
}

fn boxed(elements: Vec<CdpElement>) -> Vec<Box<dyn Element>> {
    elements
        .into_iter()
        .map(|element| Box::new(ChromiumElement { element }) as Box<dyn Element>)
        .collect()
}

#[async_trait]
impl Element for ChromiumElement {
    async fn text(&self) -> Result<String> {
        Ok(self.element.inner_text().await?.unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.element.attribute(name).await?)
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
        Ok(boxed(self.element.find_elements(selector).await?))
    }

    async fn click(&self) -> Result<()> {
        self.element.click().await?;
        Ok(())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.element.scroll_into_view().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_detail_snapshot_from_data_url() {
        let browser = ChromiumBrowser::start(&BrowserConfig::default())
            .await
            .expect("failed to launch");
        let view = browser.open_view().await.expect("failed to open view");
        view.navigate("data:text/html,<h1>Consent</h1><button>Apply Now</button>")
            .await
            .expect("navigation failed");
        view.wait_until_ready().await.expect("never ready");

        let html = view.content().await.expect("no content");
        let record = crate::scraper::extractor::extract(&html, "data:");
        assert_eq!(record.name, "Consent");
        assert_eq!(record.nsws_applicable, "Yes");

        view.close().await.expect("close failed");
        browser.shutdown().await.expect("shutdown failed");
    }
}
