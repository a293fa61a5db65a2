//! Field extraction from a settled detail page.
//!
//! Every output column is driven by one [`FieldRule`]: an extraction strategy
//! plus the ordered keywords it tries. A rule that errors resolves to `N/A`
//! for its own column only.

use crate::models::{ApprovalRecord, Column, NOT_AVAILABLE, NswsApplicability};
use crate::scraper::cleaner::{collapse, normalize_text, strip_label};
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

// ── Rules ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// First top-level heading.
    Title,
    /// First banner line containing the token.
    BannerLine(&'static str),
    /// Block following the first heading that matches a keyword.
    Section(&'static [&'static str]),
    /// Container text around the last element carrying a label.
    Labeled(&'static [&'static str]),
    /// Presence of an apply control.
    ApplyControl,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub column: Column,
    pub strategy: Strategy,
}

const fn rule(column: Column, strategy: Strategy) -> FieldRule {
    FieldRule { column, strategy }
}

pub const FIELD_RULES: &[FieldRule] = &[
    rule(Column::Name, Strategy::Title),
    rule(Column::Ministry, Strategy::BannerLine("Ministry")),
    rule(Column::Department, Strategy::BannerLine("Department")),
    rule(Column::About, Strategy::Section(&["About", "Brief", "Description", "Objective"])),
    rule(Column::Eligibility, Strategy::Section(&["Who can", "Eligibility", "Beneficiary"])),
    rule(Column::Documents, Strategy::Section(&["Documents", "Enclosures", "Attachment", "Checklist"])),
    rule(Column::Applicability, Strategy::Section(&["Applicability", "Trigger", "Prerequisite"])),
    rule(Column::Fee, Strategy::Labeled(&["Fee", "Payment", "Cost", "Price"])),
    rule(Column::Validity, Strategy::Labeled(&["Validity", "Valid For"])),
    rule(Column::AverageTime, Strategy::Labeled(&["Time", "Timeline", "SLA", "Duration"])),
    rule(Column::NswsApplicable, Strategy::ApplyControl),
];

const TITLE: &str = "h1";
const BANNER: &str = ".banner-content, .approval-banner";
const SECTION_HEADINGS: &str = "h2, h3, h4, strong, b";
const SECTION_BODIES: &[&str] = &["div", "p"];
const LABEL_CANDIDATES: &str = "body *";
const APPLY_CONTROLS: &str = "a, button";
const APPLY_LABELS: &[&str] = &["apply now", "login to apply"];

/// Elements whose text never renders.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line in rendered text.
const BLOCK: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

// ── Entry point ───────────────────────────────────────────────────────────────

/// Resolve every field of the record for `url` from the page's HTML.
pub fn extract(html: &str, url: &str) -> ApprovalRecord {
    let doc = Html::parse_document(html);
    let mut record = ApprovalRecord::new(url);

    for rule in FIELD_RULES {
        let value = match rule.strategy {
            Strategy::Title => title(&doc),
            Strategy::BannerLine(token) => banner_line(&doc, token),
            Strategy::Section(keywords) => section(&doc, keywords),
            Strategy::Labeled(labels) => labeled(&doc, labels),
            Strategy::ApplyControl => apply_control(&doc).map(|a| a.to_string()),
        };
        match value {
            Ok(v) => record.set(rule.column, v),
            Err(e) => {
                debug!("{}: {:?} failed on {}: {:#}", rule.column.header(), rule.strategy, url, e);
                record.set(rule.column, NOT_AVAILABLE);
            }
        }
    }

    record
}

// ── Strategies ────────────────────────────────────────────────────────────────

fn title(doc: &Html) -> Result<String> {
    let sel = selector(TITLE)?;
    Ok(normalize_text(doc.select(&sel).next().map(inner_text).as_deref()))
}

fn banner_line(doc: &Html, token: &str) -> Result<String> {
    let sel = selector(BANNER)?;
    let line = doc.select(&sel).next().and_then(|banner| {
        inner_text(banner)
            .lines()
            .map(collapse)
            .find(|line| line.contains(token))
    });
    Ok(normalize_text(line.as_deref()))
}

fn section(doc: &Html, keywords: &[&str]) -> Result<String> {
    let sel = selector(SECTION_HEADINGS)?;
    for keyword in keywords {
        let Some(heading) = doc.select(&sel).find(|h| own_text(*h).contains(keyword)) else {
            continue;
        };
        // The first keyword with a heading decides, even if no body follows.
        let body = following_block(heading).map(inner_text);
        return Ok(normalize_text(body.as_deref()));
    }
    Ok(NOT_AVAILABLE.to_string())
}

fn labeled(doc: &Html, labels: &[&str]) -> Result<String> {
    let sel = selector(LABEL_CANDIDATES)?;
    for label in labels {
        // Sidebars repeat labels; the canonical value comes last.
        let Some(hit) = doc
            .select(&sel)
            .filter(|e| !INVISIBLE.contains(&e.value().name()) && own_text(*e).contains(label))
            .last()
        else {
            continue;
        };

        let container = hit.parent().and_then(ElementRef::wrap).unwrap_or(hit);
        let value = strip_label(&inner_text(container), label);
        if value.chars().count() < 2 {
            if let Some(next) = hit.next_siblings().find_map(ElementRef::wrap) {
                return Ok(normalize_text(Some(&inner_text(next))));
            }
        }
        return Ok(normalize_text(Some(&value)));
    }
    Ok(NOT_AVAILABLE.to_string())
}

fn apply_control(doc: &Html) -> Result<NswsApplicability> {
    let sel = selector(APPLY_CONTROLS)?;
    let found = doc.select(&sel).any(|control| {
        let label = collapse(&inner_text(control)).to_lowercase();
        APPLY_LABELS.iter().any(|l| label.contains(l))
    });
    Ok(if found {
        NswsApplicability::Yes
    } else {
        NswsApplicability::InformationOnly
    })
}

// ── DOM helpers ───────────────────────────────────────────────────────────────

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("selector {}: {:?}", css, e))
}

fn is_section_body(el: &ElementRef) -> bool {
    SECTION_BODIES.contains(&el.value().name())
}

/// Nearest `div`/`p` sibling after the heading, else the nearest one after it
/// inside the heading's parent.
fn following_block(heading: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if let Some(sibling) = heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(is_section_body)
    {
        return Some(sibling);
    }

    let parent = heading.parent().and_then(ElementRef::wrap)?;
    parent
        .descendants()
        .skip_while(|n| n.id() != heading.id())
        .filter_map(ElementRef::wrap)
        .filter(|e| !e.ancestors().any(|a| a.id() == heading.id()) && e.id() != heading.id())
        .find(is_section_body)
}

/// Text nodes directly under the element.
fn own_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|c| c.value().as_text())
        .map(|t| &**t)
        .collect()
}

/// Rendered text approximation: block elements break lines, invisible ones
/// contribute nothing.
fn inner_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_text(el, &mut out);
    out
}

fn push_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if INVISIBLE.contains(&name) {
                continue;
            }
            let block = BLOCK.contains(&name);
            if block {
                out.push('\n');
            }
            push_text(child, out);
            if block {
                out.push('\n');
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
