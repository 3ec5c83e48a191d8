//! The three published datasets and the last-update marker.
//!
//! Reports are built one after another so that only one dataset is held in
//! memory at a time:
//!
//! 1. [`all_time`], the merged dataset with one row per day and locator
//! 2. [`daily`], today's snapshot rebuilt from the feed alone
//! 3. [`rolling`], per-locator totals rolled over from yesterday's file
//! 4. [`marker`], the last-update timestamp

pub mod all_time;
pub mod daily;
pub mod marker;
pub mod rolling;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::aggregate::{CombineStrategy, Seeder};
use crate::config::Config;
use crate::geocoding::Geocoder;
use crate::store;
use crate::types::{DailyChange, Variant};

/// Row counts produced by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub merged_rows: usize,
    pub carried: usize,
    pub daily_rows: usize,
    pub rolling_rows: usize,
    pub unknown_locators: usize,
}

fn seeder(geocoder: Option<&mut Geocoder>) -> Seeder<'_> {
    match geocoder {
        Some(geocoder) => Seeder::Geocoded(geocoder),
        None => Seeder::Plain,
    }
}

/// The all-time dataset keeps per-day counts in the plain layout and running
/// totals in the geocoded one.
fn combine_for(variant: Variant) -> CombineStrategy {
    match variant {
        Variant::Plain => CombineStrategy::Replace,
        Variant::Geocoded => CombineStrategy::Accumulate,
    }
}

/// Builds every report for `today` from `changes` and writes the marker.
///
/// Passing a geocoder selects the geocoded layout for all three datasets.
pub fn run_reports(
    config: &Config,
    changes: &[DailyChange],
    mut geocoder: Option<&mut Geocoder>,
    today: NaiveDate,
) -> Result<RunSummary> {
    info!("Building new merged changes file");
    let all_time = all_time::build(config, changes, geocoder.as_deref_mut(), today)?;

    info!("Building daily changes file");
    let daily_rows = daily::build(config, changes, geocoder.as_deref_mut(), today)?;

    info!("Building merged daily changes file");
    let rolling_rows = rolling::build(config, changes, geocoder.as_deref_mut(), today)?;

    marker::write(config, Utc::now())?;

    Ok(RunSummary {
        merged_rows: all_time.rows,
        carried: all_time.carried,
        daily_rows,
        rolling_rows,
        unknown_locators: geocoder.map_or(0, |g| g.unknown().len()),
    })
}

/// Writes the unknown-locator set back to its side file when `persist` is
/// set; otherwise only reports how many locators are waiting for coordinates.
pub fn finish_geocoding(config: &Config, geocoder: &Geocoder, persist: bool) -> Result<()> {
    let path = config.unknown_geocoding_path();
    let unknown = geocoder.unknown().len();

    if persist {
        store::save_locators(&path, geocoder.unknown())?;
        info!(path = %path.display(), unknown, "Unknown postal codes written");
    } else if unknown > 0 {
        warn!(
            path = %path.display(),
            unknown,
            "Postal codes without coordinates were not persisted (use --persist-unknown)"
        );
    }

    Ok(())
}
