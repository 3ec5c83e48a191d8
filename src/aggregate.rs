//! Merging daily change records into a dataset.
//!
//! One routine serves every report: the caller picks how rows are matched
//! ([`MatchStrategy`]), how an incoming count meets the stored one
//! ([`CombineStrategy`]) and how missing rows are seeded ([`Seeder`]).

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::error::DatasetError;
use crate::geocoding::Geocoder;
use crate::types::{DailyChange, Dataset, NUMBER_OF_DIAGNOSTICS, Row, Variant, previous_daystamp};

/// Which existing row a change record lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// One row per `(daystamp, locator)`.
    ByDateAndLocator,
    /// One row per locator, whatever its date.
    ByLocator,
}

impl MatchStrategy {
    pub fn matches(self, row: &[String], daystamp: &str, locator: &str) -> bool {
        match self {
            MatchStrategy::ByDateAndLocator => {
                row.first().map(String::as_str) == Some(daystamp)
                    && row.get(1).map(String::as_str) == Some(locator)
            }
            MatchStrategy::ByLocator => row.get(1).map(String::as_str) == Some(locator),
        }
    }
}

/// How an incoming count is folded into the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineStrategy {
    /// Keep only the incoming value.
    Replace,
    /// Add the incoming value to the stored one.
    Accumulate,
}

impl CombineStrategy {
    /// Returns `None` when the sum does not fit in an `i64`.
    pub fn combine(self, previous: i64, incoming: i64) -> Option<i64> {
        match self {
            CombineStrategy::Replace => Some(incoming),
            CombineStrategy::Accumulate => previous.checked_add(incoming),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRule {
    pub matching: MatchStrategy,
    pub combine: CombineStrategy,
}

/// Seeds rows that do not exist yet and fixes the column layout.
pub enum Seeder<'a> {
    /// `[daystamp, locator, 0, 0, 0, 0, 0, 0]`.
    Plain,
    /// Copies yesterday's row for the locator when there is one, otherwise
    /// `[daystamp, locator, lat, long, 0, ..]`. Locators without coordinates
    /// are skipped entirely.
    Geocoded(&'a mut Geocoder),
}

impl Seeder<'_> {
    pub fn variant(&self) -> Variant {
        match self {
            Seeder::Plain => Variant::Plain,
            Seeder::Geocoded(_) => Variant::Geocoded,
        }
    }
}

/// Lookup from match key to row position, first occurrence wins.
#[derive(Default)]
struct RowIndex {
    by_date_locator: HashMap<(String, String), usize>,
    by_locator: HashMap<String, usize>,
}

impl RowIndex {
    fn build(rows: &[Row]) -> Self {
        let mut index = Self::default();
        for (position, row) in rows.iter().enumerate() {
            index.insert(row, position);
        }
        index
    }

    fn insert(&mut self, row: &[String], position: usize) {
        let (Some(date), Some(locator)) = (row.first(), row.get(1)) else {
            return;
        };
        self.by_date_locator
            .entry((date.clone(), locator.clone()))
            .or_insert(position);
        self.by_locator.entry(locator.clone()).or_insert(position);
    }

    fn find(&self, matching: MatchStrategy, daystamp: &str, locator: &str) -> Option<usize> {
        match matching {
            MatchStrategy::ByDateAndLocator => self
                .by_date_locator
                .get(&(daystamp.to_string(), locator.to_string()))
                .copied(),
            MatchStrategy::ByLocator => self.by_locator.get(locator).copied(),
        }
    }
}

/// Applies `changes` to `dataset` and returns the updated dataset.
///
/// For every record the matching row is updated in place; when there is no
/// match a new row is seeded and appended. Each diagnostic count is folded
/// into its column with `rule.combine`.
pub fn apply(
    changes: &[DailyChange],
    mut dataset: Dataset,
    rule: MergeRule,
    mut seeder: Seeder<'_>,
) -> Result<Dataset, DatasetError> {
    let variant = seeder.variant();
    let mut index = RowIndex::build(dataset.rows());
    let mut created = 0usize;
    let mut skipped = 0usize;

    for change in changes {
        let DailyChange {
            locator,
            daystamp,
            diagnostics,
        } = change;

        let coordinates = match &mut seeder {
            Seeder::Plain => None,
            Seeder::Geocoded(geocoder) => match geocoder.resolve(locator) {
                Some(coordinates) => Some(coordinates),
                None => {
                    skipped += 1;
                    continue;
                }
            },
        };

        let position = index.find(rule.matching, daystamp, locator);
        let mut row = match position {
            Some(position) => std::mem::take(&mut dataset.rows_mut()[position]),
            None => match coordinates {
                None => seed_row(daystamp, locator, &[]),
                Some(coordinates) => {
                    let yesterday = previous_daystamp(daystamp)?;
                    match index.find(MatchStrategy::ByDateAndLocator, &yesterday, locator) {
                        Some(previous) => {
                            let mut row = dataset.rows()[previous].clone();
                            row[0] = daystamp.clone();
                            row
                        }
                        None => seed_row(
                            daystamp,
                            locator,
                            &[coordinates.latitude, coordinates.longitude],
                        ),
                    }
                }
            },
        };

        let result = fold_diagnostics(&mut row, diagnostics, variant, rule.combine);

        match position {
            Some(position) => dataset.rows_mut()[position] = row,
            None => {
                index.insert(&row, dataset.len());
                dataset.push(row);
                created += 1;
            }
        }
        result?;
    }

    debug!(
        records = changes.len(),
        created,
        skipped,
        rows = dataset.len(),
        "Daily changes applied"
    );

    Ok(dataset)
}

fn seed_row(daystamp: &str, locator: &str, coordinates: &[String]) -> Row {
    let mut row = Vec::with_capacity(2 + coordinates.len() + NUMBER_OF_DIAGNOSTICS);
    row.push(daystamp.to_string());
    row.push(locator.to_string());
    row.extend(coordinates.iter().cloned());
    row.extend(std::iter::repeat_n("0".to_string(), NUMBER_OF_DIAGNOSTICS));
    row
}

fn fold_diagnostics(
    row: &mut Row,
    diagnostics: &std::collections::BTreeMap<u8, i64>,
    variant: Variant,
    combine: CombineStrategy,
) -> Result<(), DatasetError> {
    for (&index, &count) in diagnostics {
        let column = variant.diagnostic_column(index)?;
        let field = row.get(column).ok_or_else(|| DatasetError::MissingColumn {
            daystamp: row[0].clone(),
            locator: row[1].clone(),
            column,
        })?;
        let previous: i64 = field
            .trim()
            .parse()
            .map_err(|_| DatasetError::InvalidCount {
                daystamp: row[0].clone(),
                locator: row[1].clone(),
                column,
                value: field.clone(),
            })?;
        let combined = combine
            .combine(previous, count)
            .ok_or_else(|| DatasetError::CountOverflow {
                daystamp: row[0].clone(),
                locator: row[1].clone(),
                column,
            })?;
        row[column] = combined.to_string();
    }
    Ok(())
}

/// Appends a copy of yesterday's row, redated to `today`, for every locator
/// in `known` that the feed did not mention. Locators that already have a
/// row for `today`, or had none yesterday, are left alone.
///
/// Only a row dated exactly yesterday is copied. After a missed run, absent
/// locators stop being carried, and a later report for them starts again
/// from coordinates and zero counts.
///
/// Returns the number of rows appended.
pub fn carry_forward(
    dataset: &mut Dataset,
    known: &BTreeSet<String>,
    changes: &[DailyChange],
    today: &str,
) -> Result<usize, DatasetError> {
    let yesterday = previous_daystamp(today)?;
    let reported: BTreeSet<&str> = changes.iter().map(|c| c.locator.as_str()).collect();
    let index = RowIndex::build(dataset.rows());

    let mut carried = Vec::new();
    for locator in known.iter().filter(|l| !reported.contains(l.as_str())) {
        if index
            .find(MatchStrategy::ByDateAndLocator, today, locator)
            .is_some()
        {
            continue;
        }
        if let Some(position) = index.find(MatchStrategy::ByDateAndLocator, &yesterday, locator) {
            let mut row = dataset.rows()[position].clone();
            row[0] = today.to_string();
            carried.push(row);
        }
    }

    let count = carried.len();
    dataset.rows_mut().extend(carried);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::{Coordinates, GeocodingTable};
    use std::collections::BTreeMap;

    const REPLACE_BY_DAY: MergeRule = MergeRule {
        matching: MatchStrategy::ByDateAndLocator,
        combine: CombineStrategy::Replace,
    };
    const ACCUMULATE_BY_DAY: MergeRule = MergeRule {
        matching: MatchStrategy::ByDateAndLocator,
        combine: CombineStrategy::Accumulate,
    };
    const ACCUMULATE_BY_LOCATOR: MergeRule = MergeRule {
        matching: MatchStrategy::ByLocator,
        combine: CombineStrategy::Accumulate,
    };

    fn change(locator: &str, daystamp: &str, diagnostics: &[(u8, i64)]) -> DailyChange {
        DailyChange {
            locator: locator.to_string(),
            daystamp: daystamp.to_string(),
            diagnostics: diagnostics.iter().copied().collect::<BTreeMap<_, _>>(),
        }
    }

    fn row(fields: &str) -> Row {
        fields.split(',').map(str::to_string).collect()
    }

    fn geocoder() -> Geocoder {
        let table: GeocodingTable = [(
            "1000".to_string(),
            Coordinates {
                latitude: "46.5".to_string(),
                longitude: "6.6".to_string(),
            },
        )]
        .into_iter()
        .collect();
        Geocoder::new(table, BTreeSet::new())
    }

    #[test]
    fn test_replace_into_empty_dataset() {
        let changes = vec![change(
            "1000",
            "2020-03-20",
            &[(0, 5), (1, 2), (2, 0), (3, 0), (4, 1), (5, 0)],
        )];
        let dataset = Dataset::with_header(Variant::Plain.header());

        let dataset = apply(&changes, dataset, REPLACE_BY_DAY, Seeder::Plain).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.rows()[0].join(","), "2020-03-20,1000,5,2,0,0,1,0");
    }

    #[test]
    fn test_replace_is_idempotent() {
        let changes = vec![change("1000", "2020-03-20", &[(0, 5), (2, 1)])];
        let once = apply(
            &changes,
            Dataset::with_header(Variant::Plain.header()),
            REPLACE_BY_DAY,
            Seeder::Plain,
        )
        .unwrap();
        let twice = apply(&changes, once.clone(), REPLACE_BY_DAY, Seeder::Plain).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_accumulate_is_not_idempotent() {
        let changes = vec![change("1000", "2020-03-20", &[(0, 5)])];
        let once = apply(
            &changes,
            Dataset::with_header(Variant::Plain.header()),
            ACCUMULATE_BY_DAY,
            Seeder::Plain,
        )
        .unwrap();
        let twice = apply(&changes, once, ACCUMULATE_BY_DAY, Seeder::Plain).unwrap();

        assert_eq!(twice.len(), 1);
        assert_eq!(twice.rows()[0][2], "10");
    }

    #[test]
    fn test_replace_keeps_untouched_columns() {
        let dataset = Dataset::new(
            Variant::Plain.header(),
            vec![row("2020-03-20,1000,5,2,0,0,1,0")],
        );
        let changes = vec![change("1000", "2020-03-20", &[(0, 7)])];

        let dataset = apply(&changes, dataset, REPLACE_BY_DAY, Seeder::Plain).unwrap();
        assert_eq!(dataset.rows()[0].join(","), "2020-03-20,1000,7,2,0,0,1,0");
    }

    #[test]
    fn test_by_locator_matches_any_date() {
        let dataset = Dataset::new(
            Variant::Plain.header(),
            vec![row("2020-03-21,1000,5,2,0,0,1,0")],
        );
        let changes = vec![change("1000", "2020-03-20", &[(0, 1), (3, 4)])];

        let dataset = apply(&changes, dataset, ACCUMULATE_BY_LOCATOR, Seeder::Plain).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.rows()[0].join(","), "2020-03-21,1000,6,2,0,4,1,0");
    }

    #[test]
    fn test_same_day_repeats_collapse() {
        let changes = vec![
            change("1000", "2020-03-20", &[(0, 1)]),
            change("1000", "2020-03-20", &[(0, 2)]),
            change("1201", "2020-03-20", &[(1, 1)]),
        ];
        let dataset = apply(
            &changes,
            Dataset::with_header(Variant::Plain.header()),
            ACCUMULATE_BY_DAY,
            Seeder::Plain,
        )
        .unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[0][2], "3");
    }

    #[test]
    fn test_unknown_diagnostic_index_fails() {
        let changes = vec![change("1000", "2020-03-20", &[(6, 1)])];
        let result = apply(
            &changes,
            Dataset::with_header(Variant::Plain.header()),
            REPLACE_BY_DAY,
            Seeder::Plain,
        );
        assert_eq!(result, Err(DatasetError::UnknownDiagnostic(6)));
    }

    #[test]
    fn test_non_numeric_count_fails() {
        let dataset = Dataset::new(
            Variant::Plain.header(),
            vec![row("2020-03-20,1000,many,0,0,0,0,0")],
        );
        let changes = vec![change("1000", "2020-03-20", &[(0, 1)])];
        let result = apply(&changes, dataset, ACCUMULATE_BY_DAY, Seeder::Plain);
        assert!(matches!(result, Err(DatasetError::InvalidCount { column: 2, .. })));
    }

    #[test]
    fn test_accumulate_overflow_fails() {
        let dataset = Dataset::new(
            Variant::Plain.header(),
            vec![row("2020-03-20,1000,1,0,0,0,0,0")],
        );
        let changes = vec![change("1000", "2020-03-20", &[(0, i64::MAX)])];

        let result = apply(&changes, dataset, ACCUMULATE_BY_DAY, Seeder::Plain);
        assert_eq!(
            result,
            Err(DatasetError::CountOverflow {
                daystamp: "2020-03-20".to_string(),
                locator: "1000".to_string(),
                column: 2,
            })
        );
    }

    #[test]
    fn test_replace_accepts_large_counts() {
        let dataset = Dataset::new(
            Variant::Plain.header(),
            vec![row("2020-03-20,1000,1,0,0,0,0,0")],
        );
        let changes = vec![change("1000", "2020-03-20", &[(0, i64::MAX)])];

        let dataset = apply(&changes, dataset, REPLACE_BY_DAY, Seeder::Plain).unwrap();
        assert_eq!(dataset.rows()[0][2], i64::MAX.to_string());
    }

    #[test]
    fn test_geocoded_swaps_recovery_columns() {
        let mut geocoder = geocoder();
        let changes = vec![change("1000", "2020-03-20", &[(4, 10), (5, 3)])];

        let dataset = apply(
            &changes,
            Dataset::with_header(Variant::Geocoded.header()),
            ACCUMULATE_BY_DAY,
            Seeder::Geocoded(&mut geocoder),
        )
        .unwrap();

        assert_eq!(
            dataset.rows()[0].join(","),
            "2020-03-20,1000,46.5,6.6,0,0,0,0,3,10"
        );
    }

    #[test]
    fn test_geocoded_skips_unknown_locators() {
        let mut geocoder = geocoder();
        let changes = vec![
            change("9999", "2020-03-20", &[(0, 1)]),
            change("1000", "2020-03-20", &[(0, 1)]),
            change("9999", "2020-03-20", &[(0, 4)]),
        ];

        let dataset = apply(
            &changes,
            Dataset::with_header(Variant::Geocoded.header()),
            ACCUMULATE_BY_DAY,
            Seeder::Geocoded(&mut geocoder),
        )
        .unwrap();

        assert_eq!(dataset.locators().into_iter().collect::<Vec<_>>(), ["1000"]);
        assert_eq!(geocoder.unknown().len(), 1);
        assert!(geocoder.unknown().contains("9999"));
    }

    #[test]
    fn test_geocoded_seeds_from_yesterday() {
        let mut geocoder = geocoder();
        let dataset = Dataset::new(
            Variant::Geocoded.header(),
            vec![row("2020-03-19,1000,46.5,6.6,4,1,0,0,0,2")],
        );
        let changes = vec![change("1000", "2020-03-20", &[(0, 1)])];

        let dataset = apply(
            &changes,
            dataset,
            ACCUMULATE_BY_DAY,
            Seeder::Geocoded(&mut geocoder),
        )
        .unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[0].join(","), "2020-03-19,1000,46.5,6.6,4,1,0,0,0,2");
        assert_eq!(dataset.rows()[1].join(","), "2020-03-20,1000,46.5,6.6,5,1,0,0,0,2");
    }

    #[test]
    fn test_carry_forward_absent_locators() {
        let mut dataset = Dataset::new(
            Variant::Plain.header(),
            vec![
                row("2020-03-19,1000,4,1,0,0,0,2"),
                row("2020-03-19,1201,1,0,0,0,0,0"),
                row("2020-03-20,1201,2,0,0,0,0,0"),
            ],
        );
        let known = dataset.locators();
        let changes = vec![change("1201", "2020-03-20", &[(0, 1)])];

        let carried = carry_forward(&mut dataset, &known, &changes, "2020-03-20").unwrap();

        assert_eq!(carried, 1);
        assert_eq!(dataset.rows()[3].join(","), "2020-03-20,1000,4,1,0,0,0,2");

        let again = carry_forward(&mut dataset, &known, &[], "2020-03-20").unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn test_carry_forward_skips_rows_older_than_yesterday() {
        let mut dataset = Dataset::new(
            Variant::Plain.header(),
            vec![row("2020-03-18,1000,4,1,0,0,0,2")],
        );
        let known = dataset.locators();

        let carried = carry_forward(&mut dataset, &known, &[], "2020-03-20").unwrap();

        assert_eq!(carried, 0);
        assert_eq!(dataset.len(), 1);
    }
}
