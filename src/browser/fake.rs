//! In-memory browser used to drive the crawl engine in tests.

use super::{Browser, Element, View};
use crate::config::SiteConfig;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Scripted catalog plus the mutable UI state a real page would hold.
#[derive(Debug, Default)]
pub struct FakeSite {
    /// Result pages keyed by active filter label (`None` = unfiltered). Each
    /// card is an optional href.
    pub catalogs: HashMap<Option<String>, Vec<Vec<Option<String>>>>,
    /// Sidebar groups: header text and option labels.
    pub groups: Vec<(String, Vec<String>)>,
    pub details: HashMap<String, String>,
    pub broken_details: HashSet<String>,
    /// Option labels whose toggle throws when activated.
    pub failing_filters: HashSet<String>,
    /// Catalog navigation fails outright.
    pub unreachable: bool,
    /// Results reloads throw.
    pub broken_reload: bool,
    /// Detail views never report a ready state.
    pub ready_hangs: bool,
    /// Detail views never go network-idle.
    pub idle_fails: bool,
    /// The "next page" control throws when clicked.
    pub next_click_fails: bool,
    /// Card hrefs whose attribute read throws.
    pub broken_card_links: HashSet<String>,

    pub active_filter: Option<String>,
    pub page: usize,
    pub generation: u64,
    pub stats: FakeStats,
}

#[derive(Debug, Default, Clone)]
pub struct FakeStats {
    pub views_opened: usize,
    pub views_closed: usize,
    pub next_clicks: usize,
    pub reloads: usize,
    pub catalog_loads: usize,
    pub detail_navigations: Vec<String>,
    pub filter_clicks: Vec<String>,
}

impl FakeSite {
    fn pages(&self) -> Option<&Vec<Vec<Option<String>>>> {
        self.catalogs.get(&self.active_filter)
    }

    fn reset(&mut self) {
        self.active_filter = None;
        self.page = 0;
        self.generation += 1;
    }

    fn on_last_page(&self) -> bool {
        self.pages().is_none_or(|p| self.page + 1 >= p.len())
    }
}

struct Shared {
    site: Mutex<FakeSite>,
    selectors: SiteConfig,
}

impl Shared {
    fn site(&self) -> MutexGuard<'_, FakeSite> {
        self.site.lock().unwrap()
    }
}

#[derive(Clone)]
pub struct FakeBrowser {
    shared: Arc<Shared>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            shared: Arc::new(Shared {
                site: Mutex::new(site),
                selectors: SiteConfig::default(),
            }),
        }
    }

    pub fn stats(&self) -> FakeStats {
        self.shared.site().stats.clone()
    }

    pub fn base_url(&self) -> String {
        self.shared.selectors.base_url.clone()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_view(&self) -> Result<Box<dyn View>> {
        self.shared.site().stats.views_opened += 1;
        Ok(Box::new(FakeView {
            shared: Arc::clone(&self.shared),
            url: Mutex::new(None),
        }))
    }
}

struct FakeView {
    shared: Arc<Shared>,
    url: Mutex<Option<String>>,
}

impl FakeView {
    fn element(&self, kind: Kind) -> Box<dyn Element> {
        Box::new(FakeElement {
            shared: Arc::clone(&self.shared),
            kind,
        })
    }
}

#[async_trait]
impl View for FakeView {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut site = self.shared.site();
        if url == self.shared.selectors.base_url {
            if site.unreachable {
                bail!("net::ERR_CONNECTION_REFUSED");
            }
            site.stats.catalog_loads += 1;
            site.reset();
        } else {
            site.stats.detail_navigations.push(url.to_string());
            if site.broken_details.contains(url) {
                bail!("net::ERR_TIMED_OUT at {}", url);
            }
        }
        *self.url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut site = self.shared.site();
        site.stats.reloads += 1;
        if site.broken_reload {
            bail!("net::ERR_ABORTED during reload");
        }
        site.reset();
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        let hangs = self.shared.site().ready_hangs;
        if hangs {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self) -> Result<()> {
        if self.shared.site().idle_fails {
            bail!("requests still in flight");
        }
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
        let sel = &self.shared.selectors;
        let site = self.shared.site();
        let kinds: Vec<Kind> = if selector == sel.cards {
            site.pages()
                .and_then(|p| p.get(site.page))
                .map(|cards| cards.iter().cloned().map(Kind::Card).collect())
                .unwrap_or_default()
        } else if selector == sel.next_page {
            match site.pages() {
                Some(_) => vec![Kind::NextItem],
                None => vec![],
            }
        } else if selector == sel.filter_sidebar {
            if site.groups.is_empty() { vec![] } else { vec![Kind::Inert] }
        } else if selector == sel.filter_group {
            (0..site.groups.len()).map(Kind::Group).collect()
        } else {
            vec![]
        };
        drop(site);
        Ok(kinds.into_iter().map(|k| self.element(k)).collect())
    }

    async fn content(&self) -> Result<String> {
        let url = self.url.lock().unwrap().clone().unwrap_or_default();
        Ok(self
            .shared
            .site()
            .details
            .get(&url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.shared.site().stats.views_closed += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Inert,
    Card(Option<String>),
    Link(String),
    NextItem,
    NextControl,
    Group(usize),
    Header(String),
    Toggle { label: String, generation: u64 },
}

struct FakeElement {
    shared: Arc<Shared>,
    kind: Kind,
}

impl FakeElement {
    fn check_fresh(&self, site: &FakeSite) -> Result<()> {
        if let Kind::Toggle { generation, .. } = &self.kind {
            if *generation != site.generation {
                bail!("stale element handle");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Element for FakeElement {
    async fn text(&self) -> Result<String> {
        let site = self.shared.site();
        self.check_fresh(&site)?;
        Ok(match &self.kind {
            Kind::Header(text) => text.clone(),
            Kind::Toggle { label, .. } => label.clone(),
            _ => String::new(),
        })
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let site = self.shared.site();
        Ok(match (&self.kind, name) {
            (Kind::Link(href), "href") => {
                if site.broken_card_links.contains(href) {
                    bail!("node is detached from document");
                }
                Some(href.clone())
            }
            (Kind::NextItem, "class") => {
                let mut class = "ant-pagination-next".to_string();
                if site.on_last_page() {
                    class.push(' ');
                    class.push_str(&self.shared.selectors.disabled_class);
                }
                Some(class)
            }
            _ => None,
        })
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
        let sel = &self.shared.selectors;
        let site = self.shared.site();
        let kinds = match &self.kind {
            Kind::Card(Some(href)) if selector == sel.card_link => vec![Kind::Link(href.clone())],
            Kind::NextItem if selector == sel.next_page_control => vec![Kind::NextControl],
            Kind::Group(idx) if selector == sel.filter_group_header => {
                vec![Kind::Header(site.groups[*idx].0.clone())]
            }
            Kind::Group(idx) if selector == sel.filter_option => site.groups[*idx]
                .1
                .iter()
                .map(|label| Kind::Toggle {
                    label: label.clone(),
                    generation: site.generation,
                })
                .collect(),
            _ => vec![],
        };
        drop(site);
        Ok(kinds
            .into_iter()
            .map(|kind| {
                Box::new(FakeElement {
                    shared: Arc::clone(&self.shared),
                    kind,
                }) as Box<dyn Element>
            })
            .collect())
    }

    async fn click(&self) -> Result<()> {
        let mut site = self.shared.site();
        self.check_fresh(&site)?;
        match &self.kind {
            Kind::NextControl => {
                if site.next_click_fails {
                    bail!("element click intercepted");
                }
                if !site.on_last_page() {
                    site.page += 1;
                    site.stats.next_clicks += 1;
                }
            }
            Kind::Toggle { label, .. } => {
                site.stats.filter_clicks.push(label.clone());
                if site.active_filter.as_deref() == Some(label.as_str()) {
                    site.active_filter = None;
                } else {
                    if site.failing_filters.contains(label) {
                        bail!("element is not attached to the DOM");
                    }
                    site.active_filter = Some(label.clone());
                }
                site.page = 0;
            }
            _ => {}
        }
        Ok(())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        let site = self.shared.site();
        self.check_fresh(&site)
    }
}

// ── Fixture helpers ───────────────────────────────────────────────────────────

/// Minimal detail page carrying a heading and banner.
pub fn detail_html(name: &str, ministry: &str) -> String {
    format!(
        r#"<html><body>
            <div class="banner-content"><p>{ministry}</p></div>
            <h1>{name}</h1>
            <h3>About this approval</h3><div>About {name}</div>
            <a href="/apply">Apply Now</a>
        </body></html>"#
    )
}

/// A catalog page of absolute card links `{prefix}-{n}`.
pub fn cards(base: &str, prefix: &str, range: std::ops::Range<usize>) -> Vec<Option<String>> {
    range.map(|n| Some(format!("{base}/{prefix}-{n}"))).collect()
}
