//! Append-only CSV output, one file per crawl phase.

use crate::error::Result;
use crate::models::{ApprovalRecord, Column, Schema};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ── Sink seam ─────────────────────────────────────────────────────────────────

/// Durable destination for the records of one phase.
pub trait RecordSink: Send {
    fn schema(&self) -> Schema;

    /// Write one row projected onto [`RecordSink::schema`].
    fn append(&mut self, record: &ApprovalRecord) -> Result<()>;

    /// Whether a row for `link` is already stored. Sinks that don't track
    /// links answer `false`.
    fn contains(&self, _link: &str) -> bool {
        false
    }
}

// ── CSV sink ──────────────────────────────────────────────────────────────────

pub struct CsvSink {
    path: PathBuf,
    schema: Schema,
    writer: Option<csv::Writer<File>>,
    /// Links on disk when the sink was opened; only tracked in resume mode.
    /// Rows appended afterwards are not added, so a link listed twice in one
    /// run is written twice.
    seen: Option<HashSet<String>>,
    written: usize,
}

impl CsvSink {
    /// Prepare a sink for `path`. Nothing touches the file until the first
    /// append; an existing file is always extended, never truncated.
    pub fn open(path: impl Into<PathBuf>, schema: Schema, resume: bool) -> Result<Self> {
        let path = path.into();
        let seen = if resume {
            let links = read_links(&path)?;
            info!("Resuming {:?}: {} links already stored", path, links.len());
            Some(links)
        } else {
            None
        };

        Ok(Self {
            path,
            schema,
            writer: None,
            seen,
            written: 0,
        })
    }

    /// Rows appended through this sink (not counting rows already on disk).
    pub fn written(&self) -> usize {
        self.written
    }

    fn create_writer(&self) -> Result<csv::Writer<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let fresh = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            debug!("Writing header to {:?}", self.path);
            writer.write_record(self.schema.iter().map(|c| c.header()))?;
            writer.flush()?;
        }
        Ok(writer)
    }
}

impl RecordSink for CsvSink {
    fn schema(&self) -> Schema {
        self.schema
    }

    fn append(&mut self, record: &ApprovalRecord) -> Result<()> {
        let mut writer = match self.writer.take() {
            Some(w) => w,
            None => self.create_writer()?,
        };
        let outcome = writer
            .write_record(record.row(self.schema))
            .and_then(|_| writer.flush().map_err(csv::Error::from));
        self.writer = Some(writer);
        outcome?;

        self.written += 1;
        Ok(())
    }

    fn contains(&self, link: &str) -> bool {
        self.seen.as_ref().is_some_and(|s| s.contains(link))
    }
}

// ── Reading back ──────────────────────────────────────────────────────────────

/// Every value of the `Approval Link` column in an output file. A missing
/// file has no links.
pub fn read_links(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let idx = link_column(reader.headers()?);

    let mut links = HashSet::new();
    for row in reader.records() {
        if let Some(link) = row?.get(idx) {
            links.insert(link.to_string());
        }
    }
    Ok(links)
}

/// Position of the link column in a header row, defaulting to the first.
pub fn link_column(headers: &csv::StringRecord) -> usize {
    headers
        .iter()
        .position(|h| h.trim() == Column::Link.header())
        .unwrap_or(0)
}

/// Sink that keeps rows in memory.
#[cfg(test)]
pub struct MemorySink {
    pub schema: Schema,
    pub rows: Vec<ApprovalRecord>,
    pub known: HashSet<String>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            known: HashSet::new(),
        }
    }

    pub fn links(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.link.as_str()).collect()
    }
}

#[cfg(test)]
impl RecordSink for MemorySink {
    fn schema(&self) -> Schema {
        self.schema
    }

    fn append(&mut self, record: &ApprovalRecord) -> Result<()> {
        self.rows.push(record.clone());
        Ok(())
    }

    fn contains(&self, link: &str) -> bool {
        self.known.contains(link)
    }
}
