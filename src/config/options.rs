// src/config/options.rs
use std::{path::PathBuf, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::consts::*;
use crate::error::Result;
use crate::record::DATE_FMT;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub scraper: ScraperOptions,
    pub output: OutputOptions,
    pub log: LogOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperOptions {
    /// Ceiling for one ticker's whole fetch, seconds.
    pub timeout: i64,
    /// Accepted for compatibility; failed tickers are not retried in-run.
    pub retries: u32,
    /// Upper bound on the wait for a requested page to render, seconds.
    pub delay: u64,
    #[serde(alias = "maxPages")]
    pub max_pages: i64,
    /// Rows on a full page; a shorter page is the last one.
    #[serde(alias = "pageSize")]
    pub page_size: usize,
    /// Recreate the browser after this many tickers.
    #[serde(alias = "refreshEvery")]
    pub refresh_every: usize,
    #[serde(alias = "entityDelay")]
    pub entity_delay: u64,
    #[serde(alias = "failureBackoff")]
    pub failure_backoff: u64,
    #[serde(alias = "refreshBackoff")]
    pub refresh_backoff: u64,
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(alias = "shutdownGrace")]
    pub shutdown_grace: u64,
    #[serde(alias = "fromDate")]
    pub from_date: String,
    pub browser: BrowserOptions,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            timeout: TIMEOUT_SECS,
            retries: RETRIES,
            delay: PAGE_DELAY_SECS,
            max_pages: MAX_PAGES,
            page_size: PAGE_SIZE,
            refresh_every: REFRESH_EVERY,
            entity_delay: ENTITY_DELAY_SECS,
            failure_backoff: FAILURE_BACKOFF_SECS,
            refresh_backoff: REFRESH_BACKOFF_SECS,
            poll_interval_ms: POLL_INTERVAL_MS,
            shutdown_grace: SHUTDOWN_GRACE_SECS,
            from_date: s!(FROM_DATE),
            browser: BrowserOptions::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub debug: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self { headless: true, debug: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub dir: PathBuf,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self { dir: PathBuf::from(OUTPUT_DIR) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub dir: PathBuf,
    /// Write a timestamped log file next to the console output.
    pub file: bool,
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { dir: PathBuf::from(LOG_DIR), file: true, filter: None }
    }
}

impl HarvestConfig {
    /// Reject settings the harvester cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scraper;
        if s.timeout <= 0 {
            bail_config!("timeout must be positive, got {}", s.timeout);
        }
        if s.max_pages <= 0 {
            bail_config!("maxPages must be positive, got {}", s.max_pages);
        }
        if s.max_pages > u32::MAX as i64 {
            bail_config!("maxPages is too large: {}", s.max_pages);
        }
        if s.page_size == 0 {
            bail_config!("pageSize must be positive");
        }
        if s.refresh_every == 0 {
            bail_config!("refreshEvery must be positive");
        }
        if NaiveDate::parse_from_str(&s.from_date, DATE_FMT).is_err() {
            bail_config!("fromDate {:?} is not DD/MM/YYYY", s.from_date);
        }
        if self.output.dir.as_os_str().is_empty() {
            bail_config!("output.dir must not be empty");
        }
        Ok(())
    }
}

impl ScraperOptions {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout.max(0) as u64) }
    pub fn max_pages(&self) -> u32 { self.max_pages.clamp(0, u32::MAX as i64) as u32 }
    pub fn page_delay(&self) -> Duration { Duration::from_secs(self.delay) }
    pub fn entity_delay(&self) -> Duration { Duration::from_secs(self.entity_delay) }
    pub fn failure_backoff(&self) -> Duration { Duration::from_secs(self.failure_backoff) }
    pub fn refresh_backoff(&self) -> Duration { Duration::from_secs(self.refresh_backoff) }
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
    pub fn shutdown_grace(&self) -> Duration { Duration::from_secs(self.shutdown_grace) }
}
