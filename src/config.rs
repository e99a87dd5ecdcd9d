use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::warn;

pub struct Config {
    pub db_path: PathBuf,
    pub certificate_dir: PathBuf,
    pub store_timeout: Duration,
    pub mail_queue_capacity: usize,
    pub unblock_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/violations.db"),
            certificate_dir: PathBuf::from("static/certificates"),
            store_timeout: Duration::from_millis(3000),
            mail_queue_capacity: 30,
            unblock_interval: Duration::from_secs(3600),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Self {
            db_path: var_or("VIOLATION_DB_PATH", defaults.db_path)?,
            certificate_dir: var_or("CERTIFICATE_DIR", defaults.certificate_dir)?,
            store_timeout: Duration::from_millis(var_or("STORE_TIMEOUT_MS", 3000u64)?),
            mail_queue_capacity: var_or("MAIL_QUEUE_CAPACITY", defaults.mail_queue_capacity)?,
            unblock_interval: Duration::from_secs(var_or("UNBLOCK_INTERVAL_SECS", 3600u64)?),
        }
        .validated()
    }

    /// Zero durations would disable the store deadline or spin the sweep.
    pub fn validated(self) -> anyhow::Result<Self> {
        if self.store_timeout.is_zero() {
            bail!("STORE_TIMEOUT_MS must be greater than 0");
        }
        if self.unblock_interval.is_zero() {
            bail!("UNBLOCK_INTERVAL_SECS must be greater than 0");
        }
        Ok(self)
    }
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => {
            warn!("{key} not set, defaulting to {default:?}");
            Ok(default)
        }
    }
}
