mod browser;
mod config;
mod error;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::loader::{dedupe_by_link, discover_csv_files, summarize};
use crate::models::CrawlPhase;

#[derive(Parser)]
#[command(name = "nsws-scraper", about = "NSWS approvals and registrations crawler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl the catalog into one CSV per phase
    Crawl {
        /// Phases to run (default: all three, always in fixed order)
        #[arg(short, long, value_enum)]
        phase: Vec<CrawlPhase>,

        /// Skip approvals whose link is already in the output file
        #[arg(long)]
        resume: bool,

        /// Show the browser window
        #[arg(long)]
        headful: bool,

        /// Print the crawl report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show row counts for the output files
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a CSV keeping the first row per Approval Link
    Dedupe {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "nsws_scraper=info,warn",
        1 => "nsws_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Crawl {
            phase,
            resume,
            headful,
            json,
        } => {
            config.output.resume |= resume;
            if headful {
                config.browser.headless = false;
            }
            let phases = if phase.is_empty() {
                CrawlPhase::ALL.to_vec()
            } else {
                phase
            };

            let _t = utils::Timer::start("Crawl");
            let report = crawl(config, &phases).await?;
            for p in &report.phases {
                match &p.error {
                    None => info!(
                        "{}: {} rows → {:?}",
                        p.phase,
                        utils::fmt_count(p.rows_written),
                        p.file
                    ),
                    Some(e) => info!(
                        "{}: {} rows before failure ({})",
                        p.phase,
                        utils::fmt_count(p.rows_written),
                        e
                    ),
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }

        Command::Stats { json } => {
            let files = discover_csv_files(&config.output.dir)?;
            let summaries = files
                .iter()
                .map(|f| summarize(f))
                .collect::<Result<Vec<_>>>()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No output in {:?} — run `nsws-scraper crawl` first.", config.output.dir);
            } else {
                println!("─────────────────────────────────────────────");
                println!("  NSWS crawl output ({})", config.output.dir.display());
                println!("─────────────────────────────────────────────");
                for s in &summaries {
                    let name = s.file.file_name().and_then(|n| n.to_str()).unwrap_or("?");
                    println!(
                        "  {:<20} {:>8} rows  {:>8} links  {:>6} errors",
                        name,
                        utils::fmt_count(s.rows),
                        utils::fmt_count(s.unique_links),
                        utils::fmt_count(s.error_rows)
                    );
                }
                println!("─────────────────────────────────────────────");
            }
        }

        Command::Dedupe { file } => {
            let outcome = dedupe_by_link(&file)?;
            println!(
                "{}: kept {}, dropped {}",
                file.display(),
                utils::fmt_count(outcome.kept),
                utils::fmt_count(outcome.dropped)
            );
        }
    }

    Ok(())
}

#[cfg(feature = "browser")]
async fn crawl(config: AppConfig, phases: &[CrawlPhase]) -> Result<pipeline::CrawlReport> {
    use crate::browser::Browser;
    use crate::browser::chromium::ChromiumBrowser;
    use std::sync::Arc;

    let browser = Arc::new(ChromiumBrowser::start(&config.browser).await?);
    let result = pipeline::Crawler::new(config)
        .run(browser.clone(), phases)
        .await;
    if let Err(e) = browser.shutdown().await {
        tracing::warn!("Browser shutdown: {:#}", e);
    }
    result
}

#[cfg(not(feature = "browser"))]
async fn crawl(_config: AppConfig, _phases: &[CrawlPhase]) -> Result<pipeline::CrawlReport> {
    anyhow::bail!("built without the `browser` feature; rebuild with `--features browser`")
}
