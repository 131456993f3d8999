use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::export::DEFAULT_PAGE_SIZE;
use crate::tracker::DEFAULT_TRACKER_HOST;
use crate::tracker::rate_limit::{self, RateLimit};

/// One layer of export settings. Layers are merged field by field, so a value
/// set on the command line wins over the same value in a config file.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub project_id: Option<i64>,
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub db: Option<String>,
    pub attachments_dir: Option<PathBuf>,
    pub migrations_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub page_size: Option<u64>,
    pub rate: Option<u32>,
    pub rate_interval_ms: Option<u64>,
    pub concurrency: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Fills every unset field from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            project_id: self.project_id.or(fallback.project_id),
            token: self.token.or(fallback.token),
            api_url: self.api_url.or(fallback.api_url),
            db: self.db.or(fallback.db),
            attachments_dir: self.attachments_dir.or(fallback.attachments_dir),
            migrations_dir: self.migrations_dir.or(fallback.migrations_dir),
            log_file: self.log_file.or(fallback.log_file),
            page_size: self.page_size.or(fallback.page_size),
            rate: self.rate.or(fallback.rate),
            rate_interval_ms: self.rate_interval_ms.or(fallback.rate_interval_ms),
            concurrency: self.concurrency.or(fallback.concurrency),
            timeout_secs: self.timeout_secs.or(fallback.timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub project_id: i64,
    pub token: String,
    pub api_url: String,
    pub db_path: PathBuf,
    pub attachments_dir: Option<PathBuf>,
    pub migrations_dir: Option<PathBuf>,
    pub log_file: PathBuf,
    pub page_size: u64,
    pub rate_limit: RateLimit,
    /// Whole-request timeout. Unset means none beyond the transport's own.
    pub request_timeout: Option<Duration>,
}

impl ExportConfig {
    /// Validates `settings` and applies defaults. `run_id` (milliseconds since
    /// the epoch) names the default database and log files.
    pub fn from_settings(settings: Settings, run_id: i64) -> Result<Self> {
        let project_id = settings.project_id.ok_or_else(|| {
            Error::Config("TRACKER_PROJECT_ID is not set. Pass --project-id or export it.".to_string())
        })?;
        if project_id <= 0 {
            return Err(Error::Config(
                "project id must be a positive integer".to_string(),
            ));
        }

        let token = settings
            .token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                Error::Config("TRACKER_TOKEN is not set. Pass --token or export it.".to_string())
            })?;

        let api_url = settings
            .api_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_TRACKER_HOST.to_string());

        let db_path = settings
            .db
            .map(|db| PathBuf::from(db.strip_prefix("file:").unwrap_or(&db)))
            .unwrap_or_else(|| PathBuf::from(format!("ptdump_{run_id}.db")));

        let log_file = settings
            .log_file
            .unwrap_or_else(|| PathBuf::from(format!("ptdump_{run_id}.log")));

        let page_size = non_zero(settings.page_size, DEFAULT_PAGE_SIZE, "page size")?;
        let rate = non_zero(settings.rate, rate_limit::DEFAULT_RATE, "rate")?;
        let interval_ms = non_zero(
            settings.rate_interval_ms,
            rate_limit::DEFAULT_INTERVAL.as_millis() as u64,
            "rate interval",
        )?;
        let concurrency = non_zero(
            settings.concurrency,
            rate_limit::DEFAULT_CONCURRENCY,
            "concurrency",
        )?;
        let request_timeout = settings
            .timeout_secs
            .map(|secs| non_zero(Some(secs), secs, "request timeout"))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            project_id,
            token,
            api_url,
            db_path,
            attachments_dir: settings.attachments_dir,
            migrations_dir: settings.migrations_dir,
            log_file,
            page_size,
            rate_limit: RateLimit {
                rate,
                interval: Duration::from_millis(interval_ms),
                concurrency,
            },
            request_timeout,
        })
    }
}

fn non_zero<T>(value: Option<T>, default: T, name: &str) -> Result<T>
where
    T: PartialEq + Default,
{
    match value {
        Some(value) if value == T::default() => {
            Err(Error::Config(format!("{name} must be greater than zero")))
        }
        Some(value) => Ok(value),
        None => Ok(default),
    }
}
