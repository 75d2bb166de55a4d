// src/runner.rs
use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    change::annotate,
    config::HarvestConfig,
    core::pace::{CancelToken, Pacer},
    error::{HarvestError, Result},
    file::ensure_directory,
    merge::merge,
    pager::Paginator,
    perf::PerfTracker,
    progress::Progress,
    record::Record,
    recovery::{RecoveryManager, RecoveryPolicy},
    session::SessionFactory,
    store::HistoryStore,
};

/// What a batch did. Failed entries carry the error text.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub aggregate_report: String,
}

/// One ticker's result: full history as persisted, and how much was new.
struct Harvested {
    history: Vec<Record>,
    new_rows: usize,
}

/// Top-level driver: one session, one store, one tracker for the whole run.
pub struct Harvester {
    config: HarvestConfig,
    recovery: RecoveryManager,
    perf: Arc<PerfTracker>,
    pacer: Pacer,
    store: HistoryStore,
}

impl Harvester {
    pub fn new(config: HarvestConfig, factory: Box<dyn SessionFactory>) -> Self {
        let pacer = Pacer::new(config.scraper.poll_interval(), CancelToken::new());
        let recovery = RecoveryManager::new(factory, RecoveryPolicy::from(&config.scraper));
        let store = HistoryStore::new(config.output.dir.clone());
        Self { config, recovery, perf: Arc::new(PerfTracker::new()), pacer, store }
    }

    /// Share an externally owned token, e.g. one tripped by Ctrl-C.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.pacer = Pacer::new(self.config.scraper.poll_interval(), token);
        self
    }

    pub fn cancel_token(&self) -> CancelToken { self.pacer.cancel_token().clone() }

    pub fn config(&self) -> &HarvestConfig { &self.config }

    pub fn perf(&self) -> &Arc<PerfTracker> { &self.perf }

    pub fn store(&self) -> &HistoryStore { &self.store }

    pub fn recovery(&self) -> &RecoveryManager { &self.recovery }

    /// Fail fast before any ticker: settings, output directory, a live session.
    pub fn preflight(&mut self) -> Result<()> {
        self.config.validate()?;
        ensure_directory(self.store.dir())?;
        self.recovery.ensure_session()?;
        info!(output = %self.store.dir().display(), "preflight passed");
        Ok(())
    }

    /// Bring one ticker's file up to date and return its full history.
    pub fn process_one(&mut self, ticker: &str) -> Result<Vec<Record>> {
        self.config.validate()?;
        self.recovery.ensure_session()?;
        let outcome = self.harvest(ticker);
        let report = self.perf.finish_run(ticker, outcome.is_ok());
        info!("{report}");
        outcome.map(|h| h.history)
    }

    /// Process every ticker in order. One ticker failing never stops the
    /// batch; only invalid settings (before any ticker) and cancellation do.
    pub fn process_batch(
        &mut self,
        tickers: &[String],
        mut progress: Option<&mut dyn Progress>,
    ) -> Result<BatchSummary> {
        self.config.validate()?;
        if let Some(p) = progress.as_deref_mut() {
            p.begin(tickers.len());
        }
        let outcome = self.run_batch(tickers, progress.as_deref_mut());
        if let Some(p) = progress.as_deref_mut() {
            p.finish();
        }
        if matches!(outcome, Err(HarvestError::Cancelled)) {
            warn!("batch cancelled, shutting down");
            self.recovery.shutdown();
        }
        outcome
    }

    /// A failed ticker has already waited out its backoff, so the
    /// inter-ticker delay only follows successes.
    fn run_batch<'p>(
        &mut self,
        tickers: &[String],
        mut progress: Option<&mut (dyn Progress + 'p)>,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let total = tickers.len();

        for (i, ticker) in tickers.iter().enumerate() {
            self.pacer.cancel_token().check()?;
            info!(ticker = %ticker, "[{}/{}] processing", i + 1, total);

            if !self.recovery.prepare(i, ticker, &self.pacer)? {
                self.perf.finish_run(ticker, false);
                let reason = s!("session refresh failed");
                if let Some(p) = progress.as_deref_mut() {
                    p.log(&format!(
                        "{ticker}: skipped after {:?} backoff",
                        self.recovery.policy().refresh_backoff
                    ));
                    p.item_failed(ticker, &reason);
                }
                summary.failed.push((ticker.clone(), reason));
                continue;
            }

            match self.harvest(ticker) {
                Ok(done) => {
                    let report = self.perf.finish_run(ticker, true);
                    info!("{report}");
                    if let Some(p) = progress.as_deref_mut() {
                        p.item_done(ticker, done.new_rows);
                    }
                    summary.succeeded.push(ticker.clone());
                }
                Err(HarvestError::Cancelled) => return Err(HarvestError::Cancelled),
                Err(e) => {
                    let report = self.perf.finish_run(ticker, false);
                    info!("{report}");
                    let class = self.recovery.handle_failure(ticker, &e, &self.pacer)?;
                    let reason = e.to_string();
                    if let Some(p) = progress.as_deref_mut() {
                        p.log(&format!("{ticker}: {class:?} failure, backed off"));
                        p.item_failed(ticker, &reason);
                    }
                    summary.failed.push((ticker.clone(), reason));
                    continue;
                }
            }

            if i + 1 < total {
                self.pacer.pause(self.config.scraper.entity_delay())?;
            }
        }

        summary.aggregate_report = self.perf.aggregate_report();
        info!("{}", summary.aggregate_report);
        info!(ok = summary.succeeded.len(), failed = summary.failed.len(), "batch finished");
        Ok(summary)
    }

    /// Load, fetch, merge, annotate, persist. The file is written only when
    /// there is something new, and only as one complete replacement.
    fn harvest(&mut self, ticker: &str) -> Result<Harvested> {
        let perf = Arc::clone(&self.perf);
        let _root = perf.step("process");

        let existing = {
            let _s = perf.step("load");
            self.store.load(ticker)?
        };

        let fresh = {
            let _s = perf.step("fetch");
            let session = self.recovery.session()?;
            Paginator::new(&self.config.scraper, &self.pacer, &perf).fetch_all(session, ticker, &existing)?
        };

        let new_rows = fresh.len();
        if new_rows == 0 {
            if existing.is_empty() {
                warn!(ticker, "site returned no history, nothing written");
            } else {
                info!(ticker, rows = existing.len(), "already up to date");
            }
            return Ok(Harvested { history: existing, new_rows });
        }

        let merged = {
            let _s = perf.step("merge");
            merge(existing, fresh)
        };
        let history = {
            let _s = perf.step("annotate");
            annotate(merged)
        };
        {
            let _s = perf.step("save");
            if let Some(path) = self.store.save(ticker, &history)? {
                info!(ticker, new_rows, total = history.len(), path = %path.display(), "history saved");
            }
        }
        Ok(Harvested { history, new_rows })
    }

    /// Stop the browser within the configured grace period.
    pub fn shutdown(&mut self) {
        self.recovery.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use crate::record::RawRow;
    use crate::session::replay::{Fault, ReplayBook, ReplayFactory};
    use std::path::PathBuf;

    fn tmp_dir(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("isx_runner_{}", name));
        let _ = std::fs::remove_dir_all(&p);
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    fn config(dir: &PathBuf) -> HarvestConfig {
        let mut c = HarvestConfig::default();
        c.output.dir = dir.clone();
        c.scraper.page_size = 2;
        c.scraper.delay = 0;
        c.scraper.entity_delay = 0;
        c.scraper.failure_backoff = 0;
        c.scraper.refresh_backoff = 0;
        c.scraper.poll_interval_ms = 1;
        c
    }

    fn row(date: &str, close: &str) -> RawRow {
        RawRow { date: s!(date), close_price: s!(close), ..Default::default() }
    }

    #[test]
    fn one_bad_ticker_does_not_stop_the_batch() {
        let dir = tmp_dir("continue");
        let book = ReplayBook::new()
            .with_pages("AAA", vec![vec![row("02/01/2024", "2")]])
            .with_pages("BBB", vec![vec![row("02/01/2024", "5")]])
            .with_fault("BBB", Fault::DeadOnNavigate)
            .with_pages("CCC", vec![vec![row("02/01/2024", "3"), row("01/01/2024", "2")], vec![]]);
        let mut h = Harvester::new(config(&dir), Box::new(ReplayFactory::new(book)));
        let tickers = vec![s!("AAA"), s!("BBB"), s!("CCC")];
        let mut sink = NullProgress;
        let summary = h.process_batch(&tickers, Some(&mut sink)).unwrap();
        assert_eq!(summary.succeeded, vec![s!("AAA"), s!("CCC")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "BBB");
        assert!(summary.aggregate_report.contains("ok:     AAA, CCC"));
        assert!(summary.aggregate_report.contains("failed: BBB"));
        assert!(dir.join("CCC_data.csv").exists());
        assert!(!dir.join("BBB_data.csv").exists());
        assert_eq!(h.recovery().refreshes(), 1);
    }

    #[test]
    fn process_one_returns_annotated_history() {
        let dir = tmp_dir("one");
        let book = ReplayBook::new()
            .with_pages("AAA", vec![vec![row("03/01/2024", "110"), row("02/01/2024", "100")], vec![row("01/01/2024", "90")]]);
        let mut h = Harvester::new(config(&dir), Box::new(ReplayFactory::new(book)));
        let hist = h.process_one("AAA").unwrap();
        assert_eq!(hist.len(), 3);
        assert!((hist[0].change - 10.0).abs() < 1e-9);
        assert!((hist[0].change_percent - 10.0).abs() < 1e-9);
        assert_eq!(hist[2].change, 0.0);
    }

    #[test]
    fn invalid_settings_stop_the_batch_before_any_ticker() {
        let dir = tmp_dir("invalid");
        let mut cfg = config(&dir);
        cfg.scraper.timeout = 0;
        let book = ReplayBook::new().with_pages("AAA", vec![vec![row("02/01/2024", "2")]]);
        let factory = ReplayFactory::new(book);
        let stats = factory.stats();
        let mut h = Harvester::new(cfg, Box::new(factory));

        let err = h.process_batch(&[s!("AAA"), s!("BBB")], None).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
        assert!(matches!(h.process_one("AAA"), Err(HarvestError::Config(_))));
        assert_eq!(stats.lock().unwrap().launches, 0);
        assert!(!dir.join("AAA_data.csv").exists());
    }

    #[test]
    fn failed_ticker_skips_the_entity_delay() {
        let dir = tmp_dir("no_delay_after_failure");
        let mut cfg = config(&dir);
        cfg.scraper.entity_delay = 30;
        let book = ReplayBook::new()
            .with_pages("BAD", vec![vec![row("02/01/2024", "2")]])
            .with_fault("BAD", Fault::DeadOnNavigate)
            .with_pages("OK", vec![vec![row("02/01/2024", "2")]]);
        let mut h = Harvester::new(cfg, Box::new(ReplayFactory::new(book)));
        let started = std::time::Instant::now();
        let summary = h.process_batch(&[s!("BAD"), s!("OK")], None).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert_eq!(summary.succeeded, vec![s!("OK")]);
    }

    #[derive(Default)]
    struct Notes(Vec<String>);

    impl Progress for Notes {
        fn log(&mut self, msg: &str) { self.0.push(s!(msg)); }
    }

    #[test]
    fn backoffs_are_reported_to_progress() {
        let dir = tmp_dir("notes");
        let book = ReplayBook::new()
            .with_pages("BAD", vec![vec![row("02/01/2024", "2")]])
            .with_fault("BAD", Fault::BrokenPage(1));
        let mut h = Harvester::new(config(&dir), Box::new(ReplayFactory::new(book)));
        let mut notes = Notes::default();
        h.process_batch(&[s!("BAD")], Some(&mut notes)).unwrap();
        assert_eq!(notes.0, vec![s!("BAD: Extraction failure, backed off")]);
    }

    #[test]
    fn cancelled_batch_returns_cancelled() {
        let dir = tmp_dir("cancel");
        let book = ReplayBook::new().with_pages("AAA", vec![vec![row("02/01/2024", "2")]]);
        let h = Harvester::new(config(&dir), Box::new(ReplayFactory::new(book)));
        let token = h.cancel_token();
        let mut h = h;
        token.cancel();
        let err = h.process_batch(&[s!("AAA")], None).unwrap_err();
        assert!(matches!(err, HarvestError::Cancelled));
        assert!(!h.recovery().has_session());
    }
}
