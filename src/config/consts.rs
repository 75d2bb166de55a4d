// src/config/consts.rs

// Site
pub const FROM_DATE: &str = "01/01/2020";
pub const PAGE_SIZE: usize = crate::specs::isx::DEFAULT_PAGE_SIZE;
pub const MAX_PAGES: i64 = 100;

// Timing (seconds unless noted)
pub const TIMEOUT_SECS: i64 = 600;
pub const PAGE_DELAY_SECS: u64 = 2;
pub const ENTITY_DELAY_SECS: u64 = 10;
pub const FAILURE_BACKOFF_SECS: u64 = 10;
pub const REFRESH_BACKOFF_SECS: u64 = 30;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;
pub const POLL_INTERVAL_MS: u64 = 250;

// Recovery
pub const REFRESH_EVERY: usize = 5; // tickers per browser session
pub const RETRIES: u32 = 3;

// Files
pub const OUTPUT_DIR: &str = "output";
pub const LOG_DIR: &str = "logs";
pub const CONFIG_PATH: &str = "configs/config.yaml";
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const ENV_PREFIX: &str = "HARVEST_";
pub const TICKERS_FILE: &str = "TICKERS.csv";
