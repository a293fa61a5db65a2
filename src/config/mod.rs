use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Catalog location and the CSS selectors the crawl relies on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub cards: String,
    pub card_link: String,
    pub next_page: String,
    pub next_page_control: String,
    pub disabled_class: String,
    pub filter_sidebar: String,
    pub filter_group: String,
    pub filter_group_header: String,
    pub filter_option: String,
}

/// Browser launch options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// DevTools endpoint of an already running browser, e.g. `http://localhost:9222`.
    pub remote_url: Option<String>,
    pub args: Vec<String>,
}

/// Every bounded wait and pacing delay, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PacingConfig {
    pub navigation_timeout_ms: u64,
    /// Single element query, read or click.
    pub action_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub network_idle_timeout_ms: u64,
    /// Used when the detail view never goes network-idle.
    pub detail_settle_ms: u64,
    pub detail_settle_jitter_ms: u64,
    pub card_wait_timeout_ms: u64,
    pub card_delay_ms: u64,
    pub card_delay_jitter_ms: u64,
    pub page_settle_ms: u64,
    pub sidebar_timeout_ms: u64,
    pub filter_apply_settle_ms: u64,
    pub filter_clear_settle_ms: u64,
    pub recovery_settle_ms: u64,
    pub phase_settle_ms: u64,
    pub initial_settle_ms: u64,
    pub initial_load_retries: usize,
    pub retry_base_ms: u64,
    pub max_pages: u32,
    pub max_recoveries: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Skip cards whose link is already present in the phase's output file.
    pub resume: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.nsws.gov.in/portal/approvalsandregistrations".to_string(),
            cards: ".card, .common-card-container, .approval-license-info".to_string(),
            card_link: "a".to_string(),
            next_page: "li.ant-pagination-next".to_string(),
            next_page_control: "a, button".to_string(),
            disabled_class: "ant-pagination-disabled".to_string(),
            filter_sidebar: ".filter-section".to_string(),
            filter_group: ".filter-type".to_string(),
            filter_group_header: "h3, .title, .filter-head".to_string(),
            filter_option: "label.ant-checkbox-wrapper".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            remote_url: None,
            args: Vec::new(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 60_000,
            action_timeout_ms: 10_000,
            ready_timeout_ms: 10_000,
            network_idle_timeout_ms: 15_000,
            detail_settle_ms: 3_000,
            detail_settle_jitter_ms: 2_000,
            card_wait_timeout_ms: 10_000,
            card_delay_ms: 2_000,
            card_delay_jitter_ms: 2_000,
            page_settle_ms: 3_000,
            sidebar_timeout_ms: 15_000,
            filter_apply_settle_ms: 3_000,
            filter_clear_settle_ms: 2_000,
            recovery_settle_ms: 4_000,
            phase_settle_ms: 4_000,
            initial_settle_ms: 3_000,
            initial_load_retries: 3,
            retry_base_ms: 1_000,
            max_pages: 500,
            max_recoveries: 5,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("nsws_data"),
            resume: false,
        }
    }
}

impl PacingConfig {
    pub fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Every wait and delay set to zero, for driving a fake browser in tests.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            navigation_timeout_ms: 0,
            action_timeout_ms: 0,
            ready_timeout_ms: 0,
            network_idle_timeout_ms: 0,
            detail_settle_ms: 0,
            detail_settle_jitter_ms: 0,
            card_wait_timeout_ms: 0,
            card_delay_ms: 0,
            card_delay_jitter_ms: 0,
            page_settle_ms: 0,
            sidebar_timeout_ms: 0,
            filter_apply_settle_ms: 0,
            filter_clear_settle_ms: 0,
            recovery_settle_ms: 0,
            phase_settle_ms: 0,
            initial_settle_ms: 0,
            initial_load_retries: 2,
            retry_base_ms: 0,
            max_pages: 50,
            max_recoveries: 3,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("NSWS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize().context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[pacing]\nmax_pages = 7\n[output]\nresume = true\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.pacing.max_pages, 7);
        assert_eq!(cfg.pacing.card_wait_timeout_ms, 10_000);
        assert!(cfg.output.resume);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.site.next_page, "li.ant-pagination-next");
    }
}
