// ==============================================================================
// config.rs - Loader Configuration
// ==============================================================================
// Description: Batch, retry and index settings with environment overrides
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Environment:
//   GWAS_CHUNK_SIZE          records per bulk write         (100000)
//   GWAS_REQUEST_TIMEOUT     seconds per bulk call          (60)
//   GWAS_MAX_RETRIES         retries per batch              (3)
//   GWAS_RETRY_BACKOFF_MS    first retry delay, doubles     (1000)
//   GWAS_SHARDS              shards for new indices         (5)
//   GWAS_REPLICAS            replicas for new indices       (1)
//   GWAS_MAX_RESULT_WINDOW   result-window ceiling          (100000)
//   GWAS_TOPHITS_SUFFIX      top-hits index suffix          (-tophits)
// ==============================================================================

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::backend::IndexSettings;

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_TOPHITS_SUFFIX: &str = "-tophits";

/// Default Elasticsearch endpoint
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9200;

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Buffer capacity and records per bulk call
    pub chunk_size: usize,

    /// Per bulk-call timeout
    pub timeout: Duration,

    /// Retries after the first attempt of a batch
    pub max_retries: u32,

    /// Delay before the first retry; doubled on each further retry
    pub retry_backoff: Duration,

    /// Applied when an index has to be created
    pub index: IndexSettings,

    pub tophits_suffix: String,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            index: IndexSettings::default(),
            tophits_suffix: DEFAULT_TOPHITS_SUFFIX.to_string(),
        }
    }
}

impl LoaderSettings {
    /// Defaults overridden by `GWAS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let settings = Self {
            chunk_size: parse_var(&lookup, "GWAS_CHUNK_SIZE", defaults.chunk_size)?,
            timeout: Duration::from_secs(parse_var(&lookup, "GWAS_REQUEST_TIMEOUT", DEFAULT_TIMEOUT_SECS)?),
            max_retries: parse_var(&lookup, "GWAS_MAX_RETRIES", defaults.max_retries)?,
            retry_backoff: Duration::from_millis(parse_var(
                &lookup,
                "GWAS_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )?),
            index: IndexSettings {
                shards: parse_var(&lookup, "GWAS_SHARDS", defaults.index.shards)?,
                replicas: parse_var(&lookup, "GWAS_REPLICAS", defaults.index.replicas)?,
                max_result_window: parse_var(&lookup, "GWAS_MAX_RESULT_WINDOW", defaults.index.max_result_window)?,
            },
            tophits_suffix: lookup("GWAS_TOPHITS_SUFFIX").unwrap_or(defaults.tophits_suffix),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("Chunk size must be at least 1");
        }
        if self.timeout.is_zero() {
            anyhow::bail!("Request timeout must be positive");
        }
        if self.index.shards == 0 {
            anyhow::bail!("Shard count must be at least 1");
        }
        if self.tophits_suffix.is_empty() {
            anyhow::bail!("Top-hits suffix must not be empty");
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, value)),
        None => Ok(default),
    }
}

/// Backend base URL: an explicit URL wins over host/port
pub fn backend_url(url: Option<&str>, host: &str, port: u16) -> String {
    match url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("http://{}:{}", host, port),
    }
}
