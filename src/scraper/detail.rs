//! One record, one throwaway view.

use super::CrawlContext;
use super::extractor::extract;
use super::pacing::{bounded, pause, tolerate_timeout};
use crate::browser::View;
use crate::config::PacingConfig;
use crate::error::Result;
use crate::models::ApprovalRecord;
use tracing::{debug, warn};

pub struct DetailFetcher<'a> {
    ctx: &'a CrawlContext,
}

impl<'a> DetailFetcher<'a> {
    pub fn new(ctx: &'a CrawlContext) -> Self {
        Self { ctx }
    }

    /// Open `url` in a fresh view and extract its record. Never fails: a page
    /// that can't be loaded yields [`ApprovalRecord::failed`]. The view is
    /// closed on every path.
    pub async fn fetch(&self, url: &str) -> ApprovalRecord {
        let view = match bounded(
            self.ctx.action_timeout(),
            "detail view",
            self.ctx.browser().open_view(),
        )
        .await
        {
            Ok(view) => view,
            Err(e) => {
                warn!("{}: could not open a view: {}", url, e);
                return ApprovalRecord::failed();
            }
        };

        let snapshot = self.snapshot(view.as_ref(), url).await;

        if let Err(e) = bounded(self.ctx.action_timeout(), "closing detail view", view.close()).await {
            warn!("{}: {}", url, e);
        }

        match snapshot {
            Ok(html) => {
                let record = extract(&html, url);
                debug!("{} → {}", url, record.name);
                record
            }
            Err(e) => {
                warn!("{}: {}", url, e);
                ApprovalRecord::failed()
            }
        }
    }

    async fn snapshot(&self, view: &dyn View, url: &str) -> Result<String> {
        let p = &self.ctx.pacing;

        bounded(self.ctx.navigation_timeout(), "detail navigation", view.navigate(url)).await?;

        tolerate_timeout(
            PacingConfig::ms(p.ready_timeout_ms),
            "detail ready state",
            view.wait_until_ready(),
        )
        .await?;

        if let Err(e) = bounded(
            PacingConfig::ms(p.network_idle_timeout_ms),
            "detail network idle",
            view.wait_for_network_idle(),
        )
        .await
        {
            debug!("{}: {}; settling instead", url, e);
            pause(p.detail_settle_ms, p.detail_settle_jitter_ms).await;
        }

        bounded(self.ctx.action_timeout(), "detail snapshot", view.content()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeBrowser, FakeSite, detail_html};
    use crate::models::{CrawlPhase, FAILED, NOT_AVAILABLE};
    use crate::scraper::testing::context;

    #[tokio::test]
    async fn test_fetch_extracts_detail_page() {
        let url = "https://www.nsws.gov.in/portal/approval/1";
        let mut site = FakeSite::default();
        site.details
            .insert(url.to_string(), detail_html("Factory Licence", "Ministry of Labour"));
        let browser = FakeBrowser::new(site);
        let ctx = context(&browser, CrawlPhase::Unfiltered).await;

        let record = DetailFetcher::new(&ctx).fetch(url).await;

        assert_eq!(record.link, url);
        assert_eq!(record.name, "Factory Licence");
        assert_eq!(record.ministry, "Ministry of Labour");
        assert_eq!(record.department, NOT_AVAILABLE);
        assert_eq!(record.about, "About Factory Licence");
        assert_eq!(record.nsws_applicable, "Yes");
    }

    #[tokio::test]
    async fn test_page_that_never_settles_is_still_extracted() {
        let url = "https://www.nsws.gov.in/portal/approval/2";
        let mut site = FakeSite::default();
        site.details
            .insert(url.to_string(), detail_html("Boiler Registration", "Ministry of Commerce"));
        site.idle_fails = true;
        site.ready_hangs = true;
        let browser = FakeBrowser::new(site);
        let mut ctx = context(&browser, CrawlPhase::Unfiltered).await;
        ctx.pacing.ready_timeout_ms = 10;
        ctx.pacing.detail_settle_ms = 5;

        let record = DetailFetcher::new(&ctx).fetch(url).await;

        assert_eq!(record.name, "Boiler Registration");
        assert_eq!(record.ministry, "Ministry of Commerce");
        let stats = browser.stats();
        assert_eq!(stats.views_opened, stats.views_closed + 1);
    }

    #[tokio::test]
    async fn test_broken_page_gives_error_record_and_closes_view() {
        let url = "https://www.nsws.gov.in/portal/approval/404";
        let mut site = FakeSite::default();
        site.broken_details.insert(url.to_string());
        let browser = FakeBrowser::new(site);
        let ctx = context(&browser, CrawlPhase::Unfiltered).await;

        let record = DetailFetcher::new(&ctx).fetch(url).await;

        assert_eq!(record, ApprovalRecord::failed());
        assert_eq!(record.fee, FAILED);

        // results view stays open, the detail view does not
        let stats = browser.stats();
        assert_eq!(stats.views_opened, 2);
        assert_eq!(stats.views_closed, 1);
        assert_eq!(stats.detail_navigations, vec![url.to_string()]);
    }
}
