//! Loading and persisting CSV datasets.
//!
//! Files are plain delimited text without any quoting: fields are separated
//! by a single delimiter byte and rows by a single terminator byte, with no
//! terminator after the last row.

use anyhow::{Context, Result};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::types::{Dataset, Row};

/// Field delimiter and row terminator of a delimited text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub terminator: u8,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            terminator: b'\n',
        }
    }
}

impl CsvFormat {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter,
            ..Self::default()
        }
    }
}

/// Splits delimited text into rows of fields, dropping blank lines.
pub fn parse(text: &str, format: CsvFormat) -> Result<Vec<Row>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .delimiter(format.delimiter)
        .terminator(Terminator::Any(format.terminator))
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(rows)
}

/// Joins the header and rows back into delimited text.
pub fn serialize(dataset: &Dataset, format: CsvFormat) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .delimiter(format.delimiter)
        .terminator(Terminator::Any(format.terminator))
        .from_writer(Vec::new());

    for record in dataset.records() {
        writer.write_record(record)?;
    }

    let mut bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e.error()))?;
    if bytes.last() == Some(&format.terminator) {
        bytes.pop();
    }

    Ok(String::from_utf8(bytes)?)
}

/// Reads a dataset from `path`.
///
/// A missing file, or one without any rows, yields a dataset holding only
/// `default_header`. Otherwise the first row of the file is the header.
pub fn load(path: &Path, default_header: Row, format: CsvFormat) -> Result<Dataset> {
    if !path.exists() {
        debug!(path = %path.display(), "Dataset file missing, starting from header");
        return Ok(Dataset::with_header(default_header));
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset '{}'", path.display()))?;
    let mut rows = parse(&text, format)
        .with_context(|| format!("Failed to parse dataset '{}'", path.display()))?;

    if rows.is_empty() {
        return Ok(Dataset::with_header(default_header));
    }
    let header = rows.remove(0);
    debug!(path = %path.display(), rows = rows.len(), "Dataset loaded");

    Ok(Dataset::new(header, rows))
}

/// Writes a dataset to `path`, replacing any previous file in one rename.
pub fn save(path: &Path, dataset: &Dataset, format: CsvFormat) -> Result<()> {
    let text = serialize(dataset, format)?;
    write_atomic(path, text.as_bytes())?;
    debug!(path = %path.display(), rows = dataset.len(), "Dataset written");
    Ok(())
}

/// Writes `contents` to a temporary file next to `path` and renames it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;

    Ok(())
}

/// Reads a one-locator-per-line side file. A missing file is an empty set.
pub fn load_locators(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn save_locators(path: &Path, locators: &BTreeSet<String>) -> Result<()> {
    let text = locators
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    write_atomic(path, text.as_bytes())
}
