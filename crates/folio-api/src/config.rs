//! Runtime configuration from `FOLIO_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

const DEFAULT_DB_PATH: &str = "folio.db";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    /// How often the change watcher re-reads the message list
    pub poll_interval: Duration,
    /// Lifetime of every written record; `None` keeps records forever
    pub record_ttl: Option<Duration>,
    pub cleanup_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            record_ttl: None,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or empty variables
    /// take their defaults; malformed numbers are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let number = |name: &str| -> Result<Option<u64>> {
            var(name)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a whole number, got {:?}", name, v))
                })
                .transpose()
        };
        // Intervals drive tokio timers, which reject zero periods
        let interval = |name: &str| -> Result<Option<u64>> {
            match number(name)? {
                Some(0) => bail!("{} must be greater than zero", name),
                other => Ok(other),
            }
        };

        let defaults = Self::default();
        Ok(Self {
            db_path: var("FOLIO_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            poll_interval: interval("FOLIO_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            record_ttl: number("FOLIO_RECORD_TTL_DAYS")?
                .map(|days| {
                    days.checked_mul(SECS_PER_DAY)
                        .map(Duration::from_secs)
                        .with_context(|| format!("FOLIO_RECORD_TTL_DAYS is too large: {}", days))
                })
                .transpose()?,
            cleanup_interval: interval("FOLIO_CLEANUP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
        })
    }
}
