// src/bin/cli.rs
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{bail, eyre, WrapErr};
use tracing::info;

use isx_harvest::{
    config::{self, consts::TICKERS_FILE},
    core::sanitize::normalize_ticker,
    log,
    progress::ConsoleProgress,
    session::replay::{ReplayBook, ReplayFactory},
    store, Harvester,
};

/// Bring ISX daily price histories up to date, one CSV per ticker.
#[derive(Debug, Parser)]
#[command(name = "isx_harvest", version, about)]
struct Args {
    /// Process a single ticker.
    #[arg(short, long, conflicts_with = "file")]
    ticker: Option<String>,

    /// Ticker list (CSV, header row, ticker in the first column).
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Configuration file; defaults to `configs/config.yaml`.
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Directory of captured pages (`<TICKER>.json`) to replay.
    #[arg(long, env = "HARVEST_FIXTURES")]
    fixtures: PathBuf,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(config::default_path);
    let cfg = config::load(&config_path)
        .wrap_err_with(|| format!("loading {}", config_path.display()))?;

    if let Some(path) = log::init(&cfg.log, cfg.scraper.browser.debug)? {
        info!(path = %path.display(), "writing log file");
    }
    info!(config = %config_path.display(), headless = cfg.scraper.browser.headless, "starting");

    let book = ReplayBook::from_dir(&args.fixtures)
        .wrap_err_with(|| format!("reading fixtures from {}", args.fixtures.display()))?;
    info!(tickers = book.tickers().len(), "replay fixtures loaded");

    let mut harvester = Harvester::new(cfg, Box::new(ReplayFactory::new(book)));
    harvester.preflight().wrap_err("preflight failed")?;

    match args.ticker {
        Some(raw) => {
            let ticker = normalize_ticker(&raw).ok_or_else(|| eyre!("invalid ticker {raw:?}"))?;
            let history = harvester.process_one(&ticker)?;
            println!("{ticker}: {} row(s) on file", history.len());
        }
        None => {
            let list = args.file.unwrap_or_else(|| PathBuf::from(TICKERS_FILE));
            let tickers = store::read_tickers(&list)
                .wrap_err_with(|| format!("reading ticker list {}", list.display()))?;
            if tickers.is_empty() {
                bail!("no tickers in {}", list.display());
            }
            let mut progress = ConsoleProgress::new();
            let summary = harvester.process_batch(&tickers, Some(&mut progress))?;
            println!("{} succeeded, {} failed", summary.succeeded.len(), summary.failed.len());
            for (ticker, reason) in &summary.failed {
                println!("  {ticker}: {reason}");
            }
        }
    }

    harvester.shutdown();
    info!("total time {}", log::uptime());
    Ok(())
}
