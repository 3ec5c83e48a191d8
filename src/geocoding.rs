//! Postal code to coordinate lookup.
//!
//! The reference table is a delimited file where the second column holds the
//! postal code, the third the longitude and the fourth the latitude.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::store::{self, CsvFormat};

const LOCATOR_COLUMN: usize = 1;
const LONGITUDE_COLUMN: usize = 2;
const LATITUDE_COLUMN: usize = 3;

/// Coordinates as they appear in the reference file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    pub latitude: String,
    pub longitude: String,
}

/// Immutable mapping from locator to [`Coordinates`].
#[derive(Debug, Clone, Default)]
pub struct GeocodingTable {
    entries: HashMap<String, Coordinates>,
}

impl GeocodingTable {
    /// Parses the reference text, skipping short rows and rows whose
    /// coordinates are not numbers (such as a header line).
    pub fn parse(text: &str, format: CsvFormat) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut skipped = 0usize;

        for row in store::parse(text, format)? {
            if row.len() <= LATITUDE_COLUMN {
                skipped += 1;
                continue;
            }
            let latitude = row[LATITUDE_COLUMN].trim();
            let longitude = row[LONGITUDE_COLUMN].trim();
            if latitude.parse::<f64>().is_err() || longitude.parse::<f64>().is_err() {
                skipped += 1;
                continue;
            }

            entries
                .entry(row[LOCATOR_COLUMN].trim().to_string())
                .or_insert_with(|| Coordinates {
                    latitude: latitude.to_string(),
                    longitude: longitude.to_string(),
                });
        }

        debug!(entries = entries.len(), skipped, "Geocoding table parsed");
        Ok(Self { entries })
    }

    pub fn get(&self, locator: &str) -> Option<&Coordinates> {
        self.entries.get(locator)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Coordinates)> for GeocodingTable {
    fn from_iter<I: IntoIterator<Item = (String, Coordinates)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A [`GeocodingTable`] together with the locators it failed to resolve.
#[derive(Debug, Clone, Default)]
pub struct Geocoder {
    table: GeocodingTable,
    unknown: BTreeSet<String>,
}

impl Geocoder {
    /// `unknown` seeds the set with locators already reported by earlier runs.
    pub fn new(table: GeocodingTable, unknown: BTreeSet<String>) -> Self {
        Self { table, unknown }
    }

    /// Looks up `locator`, remembering it as unknown on a miss.
    pub fn resolve(&mut self, locator: &str) -> Option<Coordinates> {
        match self.table.get(locator) {
            Some(coordinates) => Some(coordinates.clone()),
            None => {
                if self.unknown.insert(locator.to_string()) {
                    warn!(locator, "No coordinates for postal code");
                }
                None
            }
        }
    }

    pub fn unknown(&self) -> &BTreeSet<String> {
        &self.unknown
    }
}
