//! Job configuration, built once at startup and passed down.
//!
//! Each key is looked up as `INPUT_<KEY>` first (how GitHub Actions exposes
//! action inputs) and then as `<KEY>`. Empty values count as unset.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::store::CsvFormat;
use crate::types::daystamp;

const DATE_PLACEHOLDER: &str = "{date}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub export_url: String,
    pub export_token: String,
    /// When set, the geocoded dataset layout is produced.
    pub geocoding_url: Option<String>,
    pub geocoding_format: CsvFormat,
    pub unknown_geocoding_name: String,
    pub merged_dataset_name: String,
    /// File name template containing `{date}`.
    pub daily_report_name: String,
    /// File name template containing `{date}`.
    pub daily_merged_report_name: String,
    /// Fixed-name mirror of today's rolling report.
    pub today_report_name: Option<String>,
    pub last_update_name: String,
    pub format: CsvFormat,
    pub data_dir: PathBuf,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("INPUT_{key}"))
                .or_else(|| lookup(key))
                .filter(|v| !v.trim().is_empty())
        };
        let require = |key: &str| {
            get(key).with_context(|| format!("Missing required configuration '{key}'"))
        };
        let separator = |key: &str| -> Result<u8> {
            match get(key) {
                None => Ok(b','),
                Some(value) => single_byte(&value).with_context(|| format!("Invalid '{key}'")),
            }
        };

        Ok(Self {
            export_url: require("DAILY_EXPORT_JSON_URL")?,
            export_token: require("DAILY_EXPORT_JSON_TOKEN")?,
            geocoding_url: get("GEOCODING_URL"),
            geocoding_format: CsvFormat::with_delimiter(separator("GEOCODING_SEPARATOR")?),
            unknown_geocoding_name: get("UNKNOWN_GEOCODING_NAME")
                .unwrap_or_else(|| "unknown_geocoding.csv".to_string()),
            merged_dataset_name: require("MERGED_DATASET_NAME")?,
            daily_report_name: require("DAILY_REPORT_NAME")?,
            daily_merged_report_name: require("DAILY_MERGED_REPORT_NAME")?,
            today_report_name: get("TODAY_REPORT_NAME"),
            last_update_name: get("LAST_UPDATE_NAME")
                .unwrap_or_else(|| "last_update.txt".to_string()),
            format: CsvFormat::with_delimiter(separator("FIELD_SEPARATOR")?),
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    pub fn merged_path(&self) -> PathBuf {
        self.data_dir.join(&self.merged_dataset_name)
    }

    pub fn daily_report_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(dated(&self.daily_report_name, date))
    }

    pub fn daily_merged_report_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(dated(&self.daily_merged_report_name, date))
    }

    pub fn today_report_path(&self) -> Option<PathBuf> {
        self.today_report_name
            .as_ref()
            .map(|name| self.data_dir.join(name))
    }

    pub fn unknown_geocoding_path(&self) -> PathBuf {
        self.data_dir.join(&self.unknown_geocoding_name)
    }

    pub fn last_update_path(&self) -> PathBuf {
        self.data_dir.join(&self.last_update_name)
    }

    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }
}

fn dated(template: &str, date: NaiveDate) -> String {
    template.replace(DATE_PLACEHOLDER, &daystamp(date))
}

fn single_byte(value: &str) -> Result<u8> {
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => bail!("separator must be a single byte, got '{value}'"),
    }
}
