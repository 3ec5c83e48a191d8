//! Data types shared by the store, the aggregator and the report builders.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::DatasetError;

/// Number of self-reported health-status categories in every row.
pub const NUMBER_OF_DIAGNOSTICS: usize = 6;

/// Column names of the six diagnostic categories, in diagnostic-index order.
pub const DIAGNOSTIC_COLUMNS: [&str; NUMBER_OF_DIAGNOSTICS] = [
    "healthy",
    "sick_guess_no_corona",
    "sick_guess_corona",
    "sick_corona_confirmed",
    "recovered_confirmed",
    "recovered_not_confirmed",
];

const DAYSTAMP_FORMAT: &str = "%Y-%m-%d";

/// Formats a date as a `YYYY-MM-DD` daystamp.
pub fn daystamp(date: NaiveDate) -> String {
    date.format(DAYSTAMP_FORMAT).to_string()
}

/// Parses a `YYYY-MM-DD` daystamp.
pub fn parse_daystamp(value: &str) -> Result<NaiveDate, DatasetError> {
    NaiveDate::parse_from_str(value, DAYSTAMP_FORMAT)
        .map_err(|_| DatasetError::InvalidDaystamp(value.to_string()))
}

/// Returns the daystamp of the day before `value`.
pub fn previous_daystamp(value: &str) -> Result<String, DatasetError> {
    let date = parse_daystamp(value)?;
    date.pred_opt()
        .map(daystamp)
        .ok_or_else(|| DatasetError::InvalidDaystamp(value.to_string()))
}

/// One entry of the upstream daily export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DailyChange {
    #[serde(deserialize_with = "string_or_number")]
    pub locator: String,
    pub daystamp: String,
    /// Diagnostic index to count. Keys arrive as `"0"`..`"5"`.
    pub diagnostics: BTreeMap<u8, i64>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected locator as string or number, got {other}"
        ))),
    }
}

pub type Row = Vec<String>;

/// A header plus data rows, every field kept as text.
///
/// The header never takes part in matching or merging and is written back
/// exactly as it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    header: Row,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(header: Row, rows: Vec<Row>) -> Self {
        Self { header, rows }
    }

    /// A dataset holding nothing but the given header.
    pub fn with_header(header: Row) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Distinct locators (second column) present in the data rows.
    pub fn locators(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(1).cloned())
            .collect()
    }

    /// Overwrites the date field of every data row.
    pub fn redate(&mut self, daystamp: &str) {
        for row in &mut self.rows {
            if let Some(date) = row.first_mut() {
                *date = daystamp.to_string();
            }
        }
    }

    /// Header followed by the data rows.
    pub fn records(&self) -> impl Iterator<Item = &Row> {
        std::iter::once(&self.header).chain(self.rows.iter())
    }
}

/// Column layout of a dataset family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// `date, postal_code, diagnostics..`
    Plain,
    /// `date, postal_code, latitude, longitude, diagnostics..`
    Geocoded,
}

impl Variant {
    /// Number of leading metadata fields before the first diagnostic column.
    pub fn metadata_width(self) -> usize {
        match self {
            Variant::Plain => 2,
            Variant::Geocoded => 4,
        }
    }

    pub fn row_width(self) -> usize {
        self.metadata_width() + NUMBER_OF_DIAGNOSTICS
    }

    pub fn header(self) -> Row {
        let metadata: &[&str] = match self {
            Variant::Plain => &["date", "postal_code"],
            Variant::Geocoded => &["date", "postal_code", "latitude", "longitude"],
        };
        metadata
            .iter()
            .chain(DIAGNOSTIC_COLUMNS.iter())
            .map(|s| s.to_string())
            .collect()
    }

    /// Column that receives the count for diagnostic `index`.
    ///
    /// The geocoded export lists the two recovery categories in the opposite
    /// order, so indices 4 and 5 trade places there.
    pub fn diagnostic_column(self, index: u8) -> Result<usize, DatasetError> {
        if usize::from(index) >= NUMBER_OF_DIAGNOSTICS {
            return Err(DatasetError::UnknownDiagnostic(index));
        }
        let slot = match (self, index) {
            (Variant::Geocoded, 4) => 5,
            (Variant::Geocoded, 5) => 4,
            (_, i) => usize::from(i),
        };
        Ok(self.metadata_width() + slot)
    }
}
