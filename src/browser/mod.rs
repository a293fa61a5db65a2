//! Browser-automation seam.
//!
//! The crawl engine only ever talks to these traits. Implementations may wait
//! indefinitely inside any call; the engine bounds every call it makes.

#[cfg(feature = "browser")]
pub mod chromium;
#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Source of browsing surfaces ("views").
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_view(&self) -> Result<Box<dyn View>>;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// A single tab.
#[async_trait]
pub trait View: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    /// Resolve once the document is at least interactive.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Resolve once no network activity has been seen for a short window.
    async fn wait_for_network_idle(&self) -> Result<()>;

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>>;

    /// Serialized DOM of the rendered page.
    async fn content(&self) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;

    /// Poll for `selector` until it matches or `limit` elapses. Always checks
    /// at least once.
    async fn wait_for(&self, selector: &str, limit: Duration) -> Result<bool> {
        let deadline = Instant::now() + limit;
        loop {
            if !self.find_all(selector).await?.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(limit)).await;
        }
    }
}

/// Handle to a DOM element inside a view. Handles go stale on reload.
#[async_trait]
pub trait Element: Send + Sync {
    async fn text(&self) -> Result<String>;

    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>>;

    async fn click(&self) -> Result<()>;

    async fn scroll_into_view(&self) -> Result<()>;

    async fn has_class(&self, class: &str) -> Result<bool> {
        Ok(self
            .attribute("class")
            .await?
            .is_some_and(|c| c.split_whitespace().any(|c| c == class)))
    }
}
