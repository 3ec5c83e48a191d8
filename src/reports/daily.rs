use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::aggregate::{self, CombineStrategy, MatchStrategy, MergeRule};
use crate::config::Config;
use crate::geocoding::Geocoder;
use crate::store;
use crate::types::{DailyChange, Dataset};

use super::seeder;

/// Writes today's snapshot: just the feed, one row per day and locator.
/// Repeated records for the same day and locator are summed.
#[tracing::instrument(skip_all, fields(today = %today))]
pub fn build(
    config: &Config,
    changes: &[DailyChange],
    geocoder: Option<&mut Geocoder>,
    today: NaiveDate,
) -> Result<usize> {
    let path = config.daily_report_path(today);
    let seeding = seeder(geocoder);
    let dataset = Dataset::with_header(seeding.variant().header());

    let rule = MergeRule {
        matching: MatchStrategy::ByDateAndLocator,
        combine: CombineStrategy::Accumulate,
    };
    let dataset = aggregate::apply(changes, dataset, rule, seeding)?;

    store::save(&path, &dataset, config.format)?;
    info!(path = %path.display(), rows = dataset.len(), "Daily snapshot written");

    Ok(dataset.len())
}
