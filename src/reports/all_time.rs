use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::aggregate::{self, MatchStrategy, MergeRule};
use crate::config::Config;
use crate::geocoding::Geocoder;
use crate::store;
use crate::types::{DailyChange, Variant, daystamp};

use super::{combine_for, seeder};

/// Row counts of the all-time dataset after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllTimeSummary {
    pub rows: usize,
    pub carried: usize,
}

/// Merges the feed into the all-time dataset, one row per day and locator.
///
/// The plain layout keeps the latest daily count for each day. The geocoded
/// layout keeps running totals: new rows start from yesterday's row, and
/// locators missing from the feed get yesterday's row repeated for today.
#[tracing::instrument(skip_all, fields(today = %today))]
pub fn build(
    config: &Config,
    changes: &[DailyChange],
    geocoder: Option<&mut Geocoder>,
    today: NaiveDate,
) -> Result<AllTimeSummary> {
    let path = config.merged_path();
    let seeding = seeder(geocoder);
    let variant = seeding.variant();

    let dataset = store::load(&path, variant.header(), config.format)?;
    let known = dataset.locators();

    let rule = MergeRule {
        matching: MatchStrategy::ByDateAndLocator,
        combine: combine_for(variant),
    };
    let mut dataset = aggregate::apply(changes, dataset, rule, seeding)
        .with_context(|| format!("Failed to update '{}'", path.display()))?;

    let carried = match variant {
        Variant::Plain => 0,
        Variant::Geocoded => {
            aggregate::carry_forward(&mut dataset, &known, changes, &daystamp(today))?
        }
    };

    store::save(&path, &dataset, config.format)?;
    info!(
        path = %path.display(),
        rows = dataset.len(),
        known = known.len(),
        carried,
        "All-time dataset written"
    );

    Ok(AllTimeSummary {
        rows: dataset.len(),
        carried,
    })
}
