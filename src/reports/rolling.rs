use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::aggregate::{self, CombineStrategy, MatchStrategy, MergeRule};
use crate::config::Config;
use crate::geocoding::Geocoder;
use crate::store;
use crate::types::{DailyChange, daystamp};

use super::seeder;

/// Rolls yesterday's per-locator totals over to today and adds the feed.
///
/// Every row of yesterday's file is kept with its date moved to today, so
/// locators without new reports carry their totals unchanged. The result is
/// also copied to the fixed-name mirror when one is configured.
#[tracing::instrument(skip_all, fields(today = %today))]
pub fn build(
    config: &Config,
    changes: &[DailyChange],
    geocoder: Option<&mut Geocoder>,
    today: NaiveDate,
) -> Result<usize> {
    let yesterday = today
        .pred_opt()
        .with_context(|| format!("No day before {today}"))?;
    let source = config.daily_merged_report_path(yesterday);
    let target = config.daily_merged_report_path(today);
    let seeding = seeder(geocoder);

    let mut dataset = store::load(&source, seeding.variant().header(), config.format)?;
    let carried = dataset.len();
    dataset.redate(&daystamp(today));

    let rule = MergeRule {
        matching: MatchStrategy::ByLocator,
        combine: CombineStrategy::Accumulate,
    };
    let dataset = aggregate::apply(changes, dataset, rule, seeding)
        .with_context(|| format!("Failed to update '{}'", source.display()))?;

    store::save(&target, &dataset, config.format)?;
    if let Some(mirror) = config.today_report_path() {
        store::save(&mirror, &dataset, config.format)?;
    }
    info!(
        source = %source.display(),
        target = %target.display(),
        carried,
        rows = dataset.len(),
        "Rolling dataset written"
    );

    Ok(dataset.len())
}
