//! Walks the results view page by page, one detail fetch per card.

use super::CrawlContext;
use super::detail::DetailFetcher;
use super::pacing::{bounded, pause, settle};
use crate::browser::Element;
use crate::config::PacingConfig;
use crate::error::{CrawlError, Result};
use crate::models::{FAILED, ForcedFields};
use crate::storage::RecordSink;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub pages: u32,
    /// Rows appended, failed fetches included.
    pub records: usize,
    /// Cards with no usable link, already stored, or that errored.
    pub skipped: usize,
    /// Rows written as `Error`.
    pub failed: usize,
}

impl WalkStats {
    pub fn merge(&mut self, other: WalkStats) {
        self.pages += other.pages;
        self.records += other.records;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    HasCards,
    Advancing,
    Terminal,
}

enum CardOutcome {
    Written { failed: bool },
    Skipped,
}

pub struct PaginationWalker<'a> {
    ctx: &'a CrawlContext,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(ctx: &'a CrawlContext) -> Self {
        Self { ctx }
    }

    /// Append one row per card, from the current page to the last one.
    ///
    /// Only sink failures escape; anything the page itself does wrong ends
    /// the walk or skips the card.
    pub async fn walk(&self, sink: &mut dyn RecordSink, forced: &ForcedFields) -> Result<WalkStats> {
        let mut stats = WalkStats::default();
        let mut state = State::HasCards;

        loop {
            state = match state {
                State::HasCards => {
                    if stats.pages >= self.ctx.pacing.max_pages {
                        warn!("Stopping after {} pages (max_pages)", stats.pages);
                        State::Terminal
                    } else if !self.wait_for_cards().await {
                        State::Terminal
                    } else {
                        stats.pages += 1;
                        self.visit_page(stats.pages, sink, forced, &mut stats).await?;
                        State::Advancing
                    }
                }
                State::Advancing => self.advance().await,
                State::Terminal => break,
            };
        }

        info!(
            "[{}] walk done: {} pages, {} records, {} skipped, {} failed",
            self.ctx.phase, stats.pages, stats.records, stats.skipped, stats.failed
        );
        Ok(stats)
    }

    async fn wait_for_cards(&self) -> bool {
        let limit = PacingConfig::ms(self.ctx.pacing.card_wait_timeout_ms);
        let wait = self.ctx.results().wait_for(&self.ctx.site.cards, limit);
        match bounded(limit + self.ctx.action_timeout(), "result cards", wait).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("No result cards within {:?}", limit);
                false
            }
            Err(e) => {
                warn!("Card lookup failed: {}", e);
                false
            }
        }
    }

    async fn visit_page(
        &self,
        page: u32,
        sink: &mut dyn RecordSink,
        forced: &ForcedFields,
        stats: &mut WalkStats,
    ) -> Result<()> {
        let cards = match bounded(
            self.ctx.action_timeout(),
            "result cards",
            self.ctx.results().find_all(&self.ctx.site.cards),
        )
        .await
        {
            Ok(cards) => cards,
            Err(e) => {
                warn!("Page {}: could not list cards: {}", page, e);
                return Ok(());
            }
        };
        info!("[{}] page {}: {} cards", self.ctx.phase, page, cards.len());

        for (i, card) in cards.iter().enumerate() {
            match self.visit_card(card.as_ref(), sink, forced).await {
                Ok(CardOutcome::Written { failed }) => {
                    stats.records += 1;
                    if failed {
                        stats.failed += 1;
                    }
                }
                Ok(CardOutcome::Skipped) => stats.skipped += 1,
                Err(e @ (CrawlError::Sink(_) | CrawlError::Io(_))) => return Err(e),
                Err(e) => {
                    warn!("Page {} card {}: {}", page, i + 1, e);
                    stats.skipped += 1;
                }
            }
        }
        Ok(())
    }

    async fn visit_card(
        &self,
        card: &dyn Element,
        sink: &mut dyn RecordSink,
        forced: &ForcedFields,
    ) -> Result<CardOutcome> {
        let limit = self.ctx.action_timeout();
        let anchors = bounded(limit, "card link", card.find_all(&self.ctx.site.card_link)).await?;
        let Some(anchor) = anchors.first() else {
            debug!("Card without a link");
            return Ok(CardOutcome::Skipped);
        };
        let href = bounded(limit, "card href", anchor.attribute("href")).await?;
        let Some(url) = href.as_deref().and_then(|h| self.ctx.resolve_link(h)) else {
            debug!("Unusable card link {:?}", href);
            return Ok(CardOutcome::Skipped);
        };

        if sink.contains(&url) {
            debug!("{} already stored", url);
            return Ok(CardOutcome::Skipped);
        }

        let mut record = DetailFetcher::new(self.ctx).fetch(&url).await;
        let failed = record.link == FAILED;
        forced.apply(&mut record);
        sink.append(&record)?;

        let p = &self.ctx.pacing;
        pause(p.card_delay_ms, p.card_delay_jitter_ms).await;
        Ok(CardOutcome::Written { failed })
    }

    async fn advance(&self) -> State {
        match self.next_page().await {
            Ok(true) => State::HasCards,
            Ok(false) => {
                debug!("Last page reached");
                State::Terminal
            }
            Err(e) => {
                warn!("Pagination stopped: {}", e);
                State::Terminal
            }
        }
    }

    /// Click "next" if there is an enabled one.
    async fn next_page(&self) -> Result<bool> {
        let limit = self.ctx.action_timeout();
        let site = &self.ctx.site;

        let items = bounded(limit, "next-page item", self.ctx.results().find_all(&site.next_page)).await?;
        let Some(next) = items.first() else {
            return Ok(false);
        };
        if bounded(limit, "next-page state", next.has_class(&site.disabled_class)).await? {
            return Ok(false);
        }
        let controls = bounded(limit, "next-page control", next.find_all(&site.next_page_control)).await?;
        let Some(control) = controls.first() else {
            return Ok(false);
        };
        bounded(limit, "next-page click", control.click()).await?;

        settle(self.ctx.pacing.page_settle_ms).await;
        Ok(true)
    }
}
