//! Crawl orchestrator: ties browser → scraper → storage together.
//!
//! ## Phases
//!
//! Always run in this order, each into its own CSV under `output.dir`:
//!   1. `ministries` : every Ministries filter, ministry name forced from the label
//!   2. `departments`: every Departments filter, department name forced likewise
//!   3. `all`        : unfiltered walk of the whole catalog
//!
//! Only the initial catalog load is fatal. A failing phase is recorded in its
//! [`PhaseReport`] and the next phase starts from a reloaded catalog.

use crate::browser::Browser;
use crate::config::{AppConfig, PacingConfig};
use crate::error::Result as CrawlResult;
use crate::models::{CrawlPhase, ForcedFields};
use crate::scraper::filters::{FilterIterator, FilterStats};
use crate::scraper::pacing::{settle, with_retries};
use crate::scraper::pagination::{PaginationWalker, WalkStats};
use crate::scraper::{CrawlContext, Session};
use crate::storage::{CsvSink, RecordSink};
use crate::utils::Timer;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Crawler {
    config: AppConfig,
}

impl Crawler {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run the selected phases (in their fixed order) against `browser`.
    pub async fn run(&self, browser: Arc<dyn Browser>, phases: &[CrawlPhase]) -> Result<CrawlReport> {
        let started_at = Utc::now();
        std::fs::create_dir_all(&self.config.output.dir)
            .with_context(|| format!("Failed to create {:?}", self.config.output.dir))?;

        let pacing = self.config.pacing.clone();
        let session = Session::open(browser, PacingConfig::ms(pacing.navigation_timeout_ms))
            .await
            .context("Failed to open the results view")?;

        let mut ctx = match CrawlContext::new(session, self.config.site.clone(), pacing) {
            Ok(ctx) => ctx,
            Err(e) => return Err(e).context("Invalid site.base_url"),
        };

        // ── 1. Initial catalog load ───────────────────────────────────────────
        info!("Navigating to {}", ctx.base_url);
        let c = &ctx;
        let loaded = with_retries(&c.pacing, "initial catalog load", move || c.load_catalog()).await;
        if let Err(e) = loaded {
            close_session(ctx).await;
            return Err(e).context("Initial catalog load failed");
        }
        settle(ctx.pacing.initial_settle_ms).await;

        // ── 2. Phases ─────────────────────────────────────────────────────────
        let selected: Vec<CrawlPhase> = CrawlPhase::ALL
            .into_iter()
            .filter(|p| phases.contains(p))
            .collect();

        let mut reports = Vec::with_capacity(selected.len());
        for (i, phase) in selected.into_iter().enumerate() {
            if i > 0 {
                self.reset(&ctx).await;
            }
            ctx.phase = phase;
            reports.push(self.run_phase(&ctx).await);
        }

        close_session(ctx).await;

        let report = CrawlReport {
            started_at,
            finished_at: Utc::now(),
            phases: reports,
        };
        info!(
            "=== Done: {} phases | {} rows | {} failed phases ===",
            report.phases.len(),
            report.rows_written(),
            report.failed_phases()
        );
        Ok(report)
    }

    /// Back to the unfiltered catalog between phases.
    async fn reset(&self, ctx: &CrawlContext) {
        if let Err(e) = ctx.reload_results().await {
            warn!("Reload between phases failed ({}); navigating instead", e);
            if let Err(e) = ctx.load_catalog().await {
                warn!("Catalog navigation failed too: {}", e);
            }
        }
        settle(ctx.pacing.phase_settle_ms).await;
    }

    async fn run_phase(&self, ctx: &CrawlContext) -> PhaseReport {
        let phase = ctx.phase;
        let file = self.config.output.dir.join(phase.file_name());
        let _t = Timer::start(format!("Phase {}", phase));

        let started_at = Utc::now();
        let mut report = PhaseReport {
            phase,
            file: file.clone(),
            started_at,
            finished_at: started_at,
            rows_written: 0,
            walk: WalkStats::default(),
            filters: None,
            error: None,
        };

        if let Err(e) = self.execute(ctx, &file, &mut report).await {
            error!("Phase {} abandoned: {}", phase, e);
            report.error = Some(e.to_string());
        }
        report.finished_at = Utc::now();
        report
    }

    async fn execute(&self, ctx: &CrawlContext, file: &Path, report: &mut PhaseReport) -> CrawlResult<()> {
        let mut sink = CsvSink::open(file, ctx.phase.schema(), self.config.output.resume)?;
        debug!("[{}] writing {} columns to {:?}", ctx.phase, sink.schema().len(), file);

        let outcome = match ctx.phase.filter() {
            Some((group, column)) => FilterIterator::new(ctx)
                .run(group, &mut sink, column)
                .await
                .map(|stats| {
                    report.walk = stats.walk;
                    report.filters = Some(stats);
                }),
            None => PaginationWalker::new(ctx)
                .walk(&mut sink, &ForcedFields::none())
                .await
                .map(|walk| report.walk = walk),
        };

        report.rows_written = sink.written();
        outcome
    }
}

async fn close_session(ctx: CrawlContext) {
    let limit = ctx.action_timeout();
    if let Err(e) = ctx.session.close(limit).await {
        warn!("Closing results view: {}", e);
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PhaseReport {
    pub phase: CrawlPhase,
    pub file: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Rows appended during this run.
    pub rows_written: usize,
    pub walk: WalkStats,
    pub filters: Option<FilterStats>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CrawlReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseReport>,
}

impl CrawlReport {
    pub fn rows_written(&self) -> usize {
        self.phases.iter().map(|p| p.rows_written).sum()
    }

    pub fn failed_phases(&self) -> usize {
        self.phases.iter().filter(|p| p.error.is_some()).count()
    }
}
