//! Runtime settings for the sync subsystem, read from `NABLIJVEN_*` variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::{
    ObserverConfig, RetryPolicy, DEFAULT_PROBE_INTERVAL, DEFAULT_STATUS_POLL_INTERVAL,
    DEFAULT_SWEEP_INTERVAL,
};
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_API_URL: &str = "NABLIJVEN_API_URL";
pub const ENV_DB_PATH: &str = "NABLIJVEN_DB_PATH";
pub const ENV_SYNC_INTERVAL_SECS: &str = "NABLIJVEN_SYNC_INTERVAL_SECS";
pub const ENV_STATUS_POLL_SECS: &str = "NABLIJVEN_STATUS_POLL_SECS";
pub const ENV_PROBE_INTERVAL_SECS: &str = "NABLIJVEN_PROBE_INTERVAL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "NABLIJVEN_REQUEST_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "NABLIJVEN_MAX_ATTEMPTS";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Remote API base URL; without one the client works offline only.
    pub api_url: Option<String>,
    /// Local database file. `None` means the platform default.
    pub db_path: Option<PathBuf>,
    pub sync_interval: Duration,
    pub status_poll_interval: Duration,
    pub probe_interval: Duration,
    pub request_timeout: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            db_path: None,
            sync_interval: DEFAULT_SWEEP_INTERVAL,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: None,
        }
    }
}

impl SyncSettings {
    /// Load settings from the process environment. Unset variables keep
    /// their defaults; malformed ones are rejected.
    pub fn from_env() -> Result<Self> {
        parse_settings(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.max_attempts {
            Some(max_attempts) => RetryPolicy::unbounded().with_max_attempts(max_attempts),
            None => RetryPolicy::unbounded(),
        }
    }

    #[must_use]
    pub const fn observer_config(&self) -> ObserverConfig {
        ObserverConfig {
            sweep_interval: self.sync_interval,
            probe_interval: self.probe_interval,
        }
    }
}

fn parse_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<SyncSettings> {
    let defaults = SyncSettings::default();
    let value = |key: &str| normalize_text_option(lookup(key));

    let api_url = match value(ENV_API_URL) {
        Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
        Some(_) => {
            return Err(Error::InvalidInput(format!(
                "{ENV_API_URL} must include http:// or https://"
            )))
        }
        None => None,
    };

    Ok(SyncSettings {
        api_url,
        db_path: value(ENV_DB_PATH).map(PathBuf::from),
        sync_interval: parse_seconds(ENV_SYNC_INTERVAL_SECS, value(ENV_SYNC_INTERVAL_SECS))?
            .unwrap_or(defaults.sync_interval),
        status_poll_interval: parse_seconds(ENV_STATUS_POLL_SECS, value(ENV_STATUS_POLL_SECS))?
            .unwrap_or(defaults.status_poll_interval),
        probe_interval: parse_seconds(ENV_PROBE_INTERVAL_SECS, value(ENV_PROBE_INTERVAL_SECS))?
            .unwrap_or(defaults.probe_interval),
        request_timeout: parse_seconds(
            ENV_REQUEST_TIMEOUT_SECS,
            value(ENV_REQUEST_TIMEOUT_SECS),
        )?
        .unwrap_or(defaults.request_timeout),
        max_attempts: value(ENV_MAX_ATTEMPTS)
            .map(|raw| parse_positive(ENV_MAX_ATTEMPTS, &raw))
            .transpose()?
            .map(|attempts| u32::try_from(attempts).unwrap_or(u32::MAX)),
    })
}

fn parse_seconds(key: &str, raw: Option<String>) -> Result<Option<Duration>> {
    raw.map(|raw| parse_positive(key, &raw).map(Duration::from_secs))
        .transpose()
}

fn parse_positive(key: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(Error::InvalidInput(format!(
            "{key} must be a positive whole number, got '{raw}'"
        ))),
    }
}
