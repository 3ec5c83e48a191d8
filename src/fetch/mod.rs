//! HTTP access to the daily export and the geocoding reference.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::geocoding::GeocodingTable;
use crate::store::CsvFormat;
use crate::types::DailyChange;

/// Issues a GET for `url` and returns the body of a successful response.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("GET {} returned status {}: {}", url, status, body);
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Reads `source` from disk, or fetches it when it is an HTTP(S) URL.
pub async fn read_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>> {
    if source.starts_with("http") {
        fetch_bytes(client, source).await
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read '{source}'"))
    }
}

/// Builds the export URL for one day, `<export_url>?date=<daystamp>`.
pub fn export_url(base: &str, daystamp: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(base)
        .with_context(|| format!("Invalid export URL '{base}'"))?;
    url.query_pairs_mut().append_pair("date", daystamp);
    Ok(url.into())
}

/// Parses the JSON array produced by the daily export.
pub fn parse_daily_changes(bytes: &[u8]) -> Result<Vec<DailyChange>> {
    serde_json::from_slice(bytes).context("Failed to parse daily export JSON")
}

/// Fetches the change records for `daystamp`. The client is expected to add
/// the export token itself, see [`auth::UrlParam::token`].
#[tracing::instrument(skip(client, base))]
pub async fn fetch_daily_changes<C: HttpClient>(
    client: &C,
    base: &str,
    daystamp: &str,
) -> Result<Vec<DailyChange>> {
    let url = export_url(base, daystamp)?;
    let bytes = fetch_bytes(client, &url)
        .await
        .context("Failed to fetch daily export")?;
    debug!(bytes = bytes.len(), "Daily export received");

    let changes = parse_daily_changes(&bytes)?;
    info!(records = changes.len(), "Daily changes loaded");
    Ok(changes)
}

/// Fetches (or reads) and parses the geocoding reference table.
#[tracing::instrument(skip(client, format))]
pub async fn fetch_geocoding<C: HttpClient>(
    client: &C,
    source: &str,
    format: CsvFormat,
) -> Result<GeocodingTable> {
    let bytes = read_source(client, source)
        .await
        .context("Failed to load geocoding reference")?;
    let text = String::from_utf8(bytes).context("Geocoding reference is not UTF-8")?;

    let table = GeocodingTable::parse(&text, format)?;
    info!(entries = table.len(), "Geocoding table loaded");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_url_appends_date() {
        assert_eq!(
            export_url("https://example.org/export", "2020-03-20").unwrap(),
            "https://example.org/export?date=2020-03-20"
        );
        assert!(export_url("not a url", "2020-03-20").is_err());
    }

    #[test]
    fn test_parse_daily_changes() {
        let json = br#"[{"locator":"1000","daystamp":"2020-03-20","diagnostics":{"0":5,"1":2,"2":0,"3":0,"4":1,"5":0}}]"#;
        let changes = parse_daily_changes(json).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].diagnostics.len(), 6);
        assert!(parse_daily_changes(b"{}").is_err());
    }

    #[tokio::test]
    async fn test_read_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, "[]").unwrap();

        let bytes = read_source(&BasicClient::new(), path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"[]");
    }
}
