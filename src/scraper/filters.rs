//! Sidebar filter iteration: one filter at a time, one pagination walk each.
//!
//! A failure while an option is active leaves the results view in an unknown
//! state, with every element handle possibly stale. The iterator then moves to
//! [`Step::Recover`]: reload, settle, enumerate the group again and carry on
//! with the next option. An abandoned option costs only itself; the group is
//! given up once `max_recoveries` recoveries in a row fail to bring the
//! sidebar back.

use super::CrawlContext;
use super::cleaner::canonical_filter_label;
use super::pacing::{bounded, settle};
use super::pagination::{PaginationWalker, WalkStats};
use crate::browser::Element;
use crate::config::PacingConfig;
use crate::error::{CrawlError, Result};
use crate::models::{Column, FilterGroup, ForcedFields};
use crate::storage::RecordSink;
use serde::Serialize;
use tracing::{debug, info, warn};

/// One checkbox in a filter group.
pub struct FilterOption {
    /// Label as rendered, occurrence count included.
    pub label: String,
    /// Label without the count; forced into the output column.
    pub name: String,
    toggle: Box<dyn Element>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub options: usize,
    pub completed: usize,
    pub abandoned: usize,
    /// Reloads attempted, successful or not.
    pub recoveries: u32,
    pub walk: WalkStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Apply(usize),
    Recover { resume_at: usize },
    Done,
}

pub struct FilterIterator<'a> {
    ctx: &'a CrawlContext,
}

impl<'a> FilterIterator<'a> {
    pub fn new(ctx: &'a CrawlContext) -> Self {
        Self { ctx }
    }

    /// Walk the results of every option in `group`, forcing the option's name
    /// into `column` of each row.
    pub async fn run(
        &self,
        group: FilterGroup,
        sink: &mut dyn RecordSink,
        column: Column,
    ) -> Result<FilterStats> {
        let mut options = self.enumerate(group).await?;
        let mut stats = FilterStats {
            options: options.len(),
            ..Default::default()
        };
        info!("Found {} filters in {}", options.len(), group);

        let budget = self.ctx.pacing.max_recoveries;
        let mut failed_in_row = 0u32;
        let mut step = Step::Apply(0);
        loop {
            step = match step {
                Step::Apply(i) if i >= options.len() => Step::Done,
                Step::Apply(i) => {
                    let option = &options[i];
                    info!(
                        "Applying filter [{}/{}]: {}",
                        i + 1,
                        options.len(),
                        option.name
                    );
                    match self.apply(option, sink, column, &mut stats.walk).await {
                        Ok(()) => {
                            stats.completed += 1;
                            Step::Apply(i + 1)
                        }
                        Err(e @ (CrawlError::Sink(_) | CrawlError::Io(_))) => return Err(e),
                        Err(e) => {
                            warn!("{} / {}: {}", group, option.name, e);
                            stats.abandoned += 1;
                            Step::Recover { resume_at: i + 1 }
                        }
                    }
                }
                Step::Recover { resume_at } => {
                    if failed_in_row >= budget {
                        return Err(CrawlError::RecoveryExhausted { group, budget });
                    }
                    stats.recoveries += 1;
                    info!(
                        "Recovering {} (attempt {}/{})",
                        group,
                        failed_in_row + 1,
                        budget
                    );
                    match self.recover(group).await {
                        Ok(fresh) => {
                            failed_in_row = 0;
                            if fresh.len() != options.len() {
                                warn!(
                                    "{} now lists {} options (was {})",
                                    group,
                                    fresh.len(),
                                    options.len()
                                );
                            }
                            options = fresh;
                            Step::Apply(resume_at)
                        }
                        Err(e) => {
                            warn!("Recovery of {} failed: {}", group, e);
                            failed_in_row += 1;
                            Step::Recover { resume_at }
                        }
                    }
                }
                Step::Done => break,
            };
        }

        info!(
            "{} done: {}/{} filters, {} abandoned, {} records",
            group, stats.completed, stats.options, stats.abandoned, stats.walk.records
        );
        Ok(stats)
    }

    async fn apply(
        &self,
        option: &FilterOption,
        sink: &mut dyn RecordSink,
        column: Column,
        walked: &mut WalkStats,
    ) -> Result<()> {
        let limit = self.ctx.action_timeout();
        let p = &self.ctx.pacing;

        debug!("Toggling {:?}", option.label);
        bounded(limit, "filter scroll", option.toggle.scroll_into_view()).await?;
        bounded(limit, "filter click", option.toggle.click()).await?;
        settle(p.filter_apply_settle_ms).await;

        let forced = ForcedFields::single(column, option.name.clone());
        walked.merge(PaginationWalker::new(self.ctx).walk(sink, &forced).await?);

        bounded(limit, "filter clear", option.toggle.click()).await?;
        settle(p.filter_clear_settle_ms).await;
        Ok(())
    }

    async fn recover(&self, group: FilterGroup) -> Result<Vec<FilterOption>> {
        self.ctx.reload_results().await?;
        settle(self.ctx.pacing.recovery_settle_ms).await;
        self.enumerate(group).await
    }

    /// Locate the group's container and list its options in sidebar order.
    async fn enumerate(&self, group: FilterGroup) -> Result<Vec<FilterOption>> {
        let site = &self.ctx.site;
        let results = self.ctx.results();
        let limit = self.ctx.action_timeout();

        let sidebar_limit = PacingConfig::ms(self.ctx.pacing.sidebar_timeout_ms);
        let visible = bounded(
            sidebar_limit + limit,
            "filter sidebar",
            results.wait_for(&site.filter_sidebar, sidebar_limit),
        )
        .await?;
        if !visible {
            return Err(CrawlError::FilterGroupNotFound(group));
        }

        let containers = bounded(limit, "filter groups", results.find_all(&site.filter_group)).await?;
        let Some(container) = self.locate(group, &containers).await? else {
            return Err(CrawlError::FilterGroupNotFound(group));
        };

        let toggles = bounded(limit, "filter options", container.find_all(&site.filter_option)).await?;
        let mut options = Vec::with_capacity(toggles.len());
        for toggle in toggles {
            let label = bounded(limit, "filter label", toggle.text()).await?;
            let name = canonical_filter_label(&label);
            if name.is_empty() {
                debug!("Skipping unlabeled option in {}", group);
                continue;
            }
            options.push(FilterOption {
                label,
                name,
                toggle,
            });
        }
        Ok(options)
    }

    /// The container whose header mentions the group, else the group's
    /// usual position.
    async fn locate<'c>(
        &self,
        group: FilterGroup,
        containers: &'c [Box<dyn Element>],
    ) -> Result<Option<&'c dyn Element>> {
        let limit = self.ctx.action_timeout();
        let keyword = group.header_keyword();

        for container in containers {
            let headers = bounded(
                limit,
                "filter group header",
                container.find_all(&self.ctx.site.filter_group_header),
            )
            .await?;
            for header in &headers {
                let text = bounded(limit, "filter group header", header.text()).await?;
                if text.to_lowercase().contains(keyword) {
                    return Ok(Some(container.as_ref()));
                }
            }
        }

        let fallback = containers.get(group.fallback_index()).map(|c| c.as_ref());
        if fallback.is_some() {
            debug!(
                "No header matches {}; using sidebar group #{}",
                group,
                group.fallback_index() + 1
            );
        }
        Ok(fallback)
    }
}
