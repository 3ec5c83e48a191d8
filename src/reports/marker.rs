use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::config::Config;
use crate::store;

/// Overwrites the last-update marker with `now` as an RFC 3339 timestamp.
pub fn write(config: &Config, now: DateTime<Utc>) -> Result<()> {
    let path = config.last_update_path();
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    store::write_atomic(&path, stamp.as_bytes())?;
    debug!(path = %path.display(), %stamp, "Last-update marker written");
    Ok(())
}
