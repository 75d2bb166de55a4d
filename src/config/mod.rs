// src/config/mod.rs
//! Configuration: built-in defaults, then a YAML file, then `HARVEST_*`
//! environment variables (`__` separates nesting levels, e.g.
//! `HARVEST_SCRAPER__MAX_PAGES=20`).

pub mod consts;
pub mod options;

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};

pub use options::{BrowserOptions, HarvestConfig, LogOptions, OutputOptions, ScraperOptions};

use crate::error::Result;
use consts::{CONFIG_PATH, CONFIG_PATH_ENV, ENV_PREFIX};

/// `CONFIG_PATH` if set, else `configs/config.yaml`.
pub fn default_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH))
}

/// Merge all sources. A missing file is not an error; a malformed one is.
/// Defaults come from the `serde(default)` impls, not from a provider:
/// a defaults dict would sit next to the camelCase YAML keys as duplicates.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate. Any problem here is fatal before work starts.
pub fn load(path: &Path) -> Result<HarvestConfig> {
    let cfg: HarvestConfig = figment(path).extract()?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use std::fs;

    fn tmp_file(name: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("isx_config_tests");
        fs::create_dir_all(&dir).unwrap();
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn reads_original_yaml_layout() {
        let p = tmp_file(
            "layout.yaml",
            "scraper:\n  timeout: 120\n  retries: 2\n  delay: 1\n  maxPages: 7\n  browser:\n    headless: false\n    debug: true\n",
        );
        let cfg = load(&p).unwrap();
        assert_eq!(cfg.scraper.timeout, 120);
        assert_eq!(cfg.scraper.max_pages, 7);
        assert!(cfg.scraper.browser.debug);
        assert!(!cfg.scraper.browser.headless);
        assert_eq!(cfg.scraper.page_size, consts::PAGE_SIZE);
    }

    #[test]
    fn missing_file_means_defaults() {
        let cfg = load(Path::new("/definitely/not/here.yaml")).unwrap();
        assert_eq!(cfg, HarvestConfig::default());
    }

    #[test]
    fn zero_max_pages_is_fatal() {
        let p = tmp_file("zero.yaml", "scraper:\n  maxPages: 0\n");
        assert!(matches!(load(&p), Err(HarvestError::Config(_))));
    }

    #[test]
    fn malformed_yaml_is_a_load_error() {
        let p = tmp_file("bad.yaml", "scraper: [this is not a map\n");
        assert!(matches!(load(&p), Err(HarvestError::ConfigLoad(_))));
    }
}
