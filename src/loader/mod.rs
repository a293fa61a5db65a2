//! Read-back tooling for crawl output: row counts and link deduplication.

use crate::models::FAILED;
use crate::storage::link_column;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub file: PathBuf,
    pub rows: usize,
    pub unique_links: usize,
    /// Rows written for a failed fetch.
    pub error_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupeOutcome {
    pub kept: usize,
    pub dropped: usize,
}

pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "csv").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))
}

/// Count rows, distinct links and failed rows of one output file.
pub fn summarize(path: &Path) -> Result<FileSummary> {
    let mut reader = reader(path)?;
    let idx = link_column(reader.headers()?);

    let mut rows = 0;
    let mut error_rows = 0;
    let mut links = HashSet::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad row in {:?}", path))?;
        rows += 1;
        match record.get(idx) {
            Some(FAILED) => error_rows += 1,
            Some(link) => {
                links.insert(link.to_string());
            }
            None => {}
        }
    }

    debug!("{:?}: {} rows, {} links", path, rows, links.len());
    Ok(FileSummary {
        file: path.to_path_buf(),
        rows,
        unique_links: links.len(),
        error_rows,
    })
}

/// Rewrite `path` keeping the first row for each link. Rows of failed
/// fetches carry no real link and are kept as they are.
pub fn dedupe_by_link(path: &Path) -> Result<DedupeOutcome> {
    let mut reader = reader(path)?;
    let headers = reader.headers()?.clone();
    let idx = link_column(&headers);

    let tmp = path.with_extension("csv.tmp");
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&tmp)
        .with_context(|| format!("Failed to create {:?}", tmp))?;
    writer.write_record(&headers)?;

    let mut seen = HashSet::new();
    let mut outcome = DedupeOutcome { kept: 0, dropped: 0 };
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad row in {:?}", path))?;
        let keep = match record.get(idx) {
            Some(FAILED) | None => true,
            Some(link) => seen.insert(link.to_string()),
        };
        if keep {
            writer.write_record(&record)?;
            outcome.kept += 1;
        } else {
            outcome.dropped += 1;
        }
    }
    writer.flush()?;
    drop(writer);

    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
    info!(
        "{:?}: kept {} rows, dropped {} duplicates",
        path, outcome.kept, outcome.dropped
    );
    Ok(outcome)
}
