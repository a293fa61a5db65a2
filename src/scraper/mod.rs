pub mod cleaner;
pub mod detail;
pub mod extractor;
pub mod filters;
pub mod pacing;
pub mod pagination;

use crate::browser::{Browser, View};
use crate::config::{PacingConfig, SiteConfig};
use crate::error::Result;
use crate::models::CrawlPhase;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use self::pacing::bounded;

// ── Session ───────────────────────────────────────────────────────────────────

/// The live browser and the one results view every filter/pagination action
/// goes through. Detail views are opened per record and never stored here.
pub struct Session {
    pub browser: Arc<dyn Browser>,
    pub results: Box<dyn View>,
}

impl Session {
    pub async fn open(browser: Arc<dyn Browser>, limit: Duration) -> Result<Self> {
        let results = bounded(limit, "results view", browser.open_view()).await?;
        Ok(Self { browser, results })
    }

    pub async fn close(self, limit: Duration) -> Result<()> {
        bounded(limit, "closing results view", self.results.close()).await
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Everything a crawl step needs, threaded from the orchestrator down to the
/// detail fetcher.
pub struct CrawlContext {
    pub session: Session,
    pub site: SiteConfig,
    pub pacing: PacingConfig,
    pub base_url: Url,
    pub phase: CrawlPhase,
}

impl CrawlContext {
    /// Context for `session`, starting in the unfiltered phase.
    pub fn new(session: Session, site: SiteConfig, pacing: PacingConfig) -> Result<Self> {
        let base_url = Url::parse(&site.base_url)?;
        Ok(Self {
            session,
            site,
            pacing,
            base_url,
            phase: CrawlPhase::Unfiltered,
        })
    }

    pub fn results(&self) -> &dyn View {
        self.session.results.as_ref()
    }

    pub fn browser(&self) -> &dyn Browser {
        self.session.browser.as_ref()
    }

    /// Deadline for single element operations (query, click, read).
    pub fn action_timeout(&self) -> Duration {
        PacingConfig::ms(self.pacing.action_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        PacingConfig::ms(self.pacing.navigation_timeout_ms)
    }

    /// Point the results view at the catalog's unfiltered first page.
    pub async fn load_catalog(&self) -> Result<()> {
        let url = self.base_url.as_str();
        debug!("Loading catalog {}", url);
        bounded(self.navigation_timeout(), "catalog navigation", self.results().navigate(url)).await
    }

    /// Reload the results view; any filter state and element handles are lost.
    pub async fn reload_results(&self) -> Result<()> {
        bounded(self.navigation_timeout(), "results reload", self.results().reload()).await
    }

    /// Absolute http(s) URL for a card's href, or `None` when it can't point
    /// at a detail page.
    pub fn resolve_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        let url = self.base_url.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then(|| url.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::browser::fake::FakeBrowser;

    pub async fn context(browser: &FakeBrowser, phase: CrawlPhase) -> CrawlContext {
        let session = Session::open(Arc::new(browser.clone()), Duration::from_secs(1))
            .await
            .unwrap();
        let mut ctx =
            CrawlContext::new(session, SiteConfig::default(), PacingConfig::immediate()).unwrap();
        ctx.phase = phase;
        ctx.load_catalog().await.unwrap();
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::testing::context;
    use super::*;
    use crate::browser::fake::{FakeBrowser, FakeSite};

    #[tokio::test]
    async fn test_resolve_link() {
        let browser = FakeBrowser::new(FakeSite::default());
        let ctx = context(&browser, CrawlPhase::Unfiltered).await;

        assert_eq!(
            ctx.resolve_link("/portal/approval/17").as_deref(),
            Some("https://www.nsws.gov.in/portal/approval/17")
        );
        assert_eq!(
            ctx.resolve_link("details?id=3").as_deref(),
            Some("https://www.nsws.gov.in/portal/details?id=3")
        );
        assert_eq!(
            ctx.resolve_link(" https://example.org/x ").as_deref(),
            Some("https://example.org/x")
        );
        assert_eq!(ctx.resolve_link(""), None);
        assert_eq!(ctx.resolve_link("#"), None);
        assert_eq!(ctx.resolve_link("javascript:void(0)"), None);
        assert_eq!(ctx.resolve_link("mailto:help@nsws.gov.in"), None);
    }
}
