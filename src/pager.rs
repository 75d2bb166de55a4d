// src/pager.rs
//! Walks one ticker's history table page by page, newest first.
//!
//! The loop stops at the first of: a failed page read, an empty page, the
//! newest persisted date showing up, a short page, or the page cap.
//!
//! A requested page that never replaces the previous one on screen, or that
//! does not continue further back in time, fails the fetch. Reading it
//! anyway would splice the same rows in twice and skip the real page.

use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::ScraperOptions;
use crate::core::pace::{Deadline, Pacer};
use crate::error::{HarvestError, Result};
use crate::merge::overlap_index;
use crate::perf::PerfTracker;
use crate::core::sanitize::normalize_ws;
use crate::record::{is_newest_first, RawRow, Record, DATE_FMT};
use crate::session::{evaluate_as, PageSession, SessionError};
use crate::specs::isx;

pub struct Paginator<'a> {
    opts: &'a ScraperOptions,
    pacer: &'a Pacer,
    perf: &'a PerfTracker,
}

/// One decoded page plus what the site actually showed.
struct Page {
    rows: Vec<Record>,
    shown: usize,
    /// First row's date cell as rendered, blank or not.
    first_cell: Option<String>,
}

impl<'a> Paginator<'a> {
    pub fn new(opts: &'a ScraperOptions, pacer: &'a Pacer, perf: &'a PerfTracker) -> Self {
        Self { opts, pacer, perf }
    }

    /// Rows newer than `existing`, newest first, under the configured timeout.
    pub fn fetch_all(
        &self,
        session: &mut dyn PageSession,
        ticker: &str,
        existing: &[Record],
    ) -> Result<Vec<Record>> {
        self.fetch_within(session, ticker, existing, Deadline::after(self.opts.timeout()))
    }

    pub fn fetch_within(
        &self,
        session: &mut dyn PageSession,
        ticker: &str,
        existing: &[Record],
        deadline: Deadline,
    ) -> Result<Vec<Record>> {
        {
            let _open = self.perf.step("open_history");
            self.open(session, ticker)?;
        }

        let max_pages = self.opts.max_pages();
        let to_date = Local::now().format(DATE_FMT).to_string();
        let mut fetched: Vec<Record> = Vec::new();
        let mut current_page = 1u32;

        loop {
            deadline.check(ticker)?;

            let page = {
                let _s = self.perf.step("read_page");
                self.read_page(session, current_page)?
            };
            debug!(ticker, page = current_page, rows = page.rows.len(), "page read");
            check_continues(&fetched, &page.rows, current_page)?;

            if page.shown == 0 {
                debug!(ticker, page = current_page, "empty page, end of history");
                break;
            }

            if !existing.is_empty() {
                if let Some(i) = overlap_index(existing, &page.rows) {
                    info!(ticker, page = current_page, new_on_page = i, "reached persisted history");
                    fetched.extend(page.rows.into_iter().take(i));
                    break;
                }
            }

            let first_cell = page.first_cell;
            fetched.extend(page.rows);

            if page.shown < self.opts.page_size {
                debug!(ticker, page = current_page, shown = page.shown, "short page, end of history");
                break;
            }
            if current_page >= max_pages {
                warn!(ticker, max_pages, "page cap reached before history ended");
                break;
            }

            deadline.check(ticker)?;
            current_page += 1;
            let _s = self.perf.step("next_page");
            self.turn_page(session, ticker, current_page, first_cell.as_deref(), &to_date)?;
        }

        info!(ticker, pages = current_page, rows = fetched.len(), "fetch finished");
        Ok(fetched)
    }

    /// Load the profile page and run the date-range search.
    fn open(&self, session: &mut dyn PageSession, ticker: &str) -> Result<()> {
        let who = s!(ticker);
        session.on_dialog(Box::new(move |msg| {
            info!(ticker = %who, "accepting page dialog: {msg}");
            true
        }));

        let url = isx::company_url(ticker);
        debug!(ticker, %url, "navigating");
        session
            .navigate(&url)
            .map_err(|source| HarvestError::Navigation { source })?;
        session.wait_ready(isx::BODY_SELECTOR).map_err(|e| HarvestError::from_page(1, e))?;

        session
            .evaluate(&isx::search_script(&self.opts.from_date))
            .map_err(|e| HarvestError::from_page(1, e))?;

        match session.wait_ready(isx::TABLE_SELECTOR) {
            Ok(()) => Ok(()),
            Err(SessionError::NotReady(_)) => {
                debug!(ticker, "no result rows after search");
                Ok(())
            }
            Err(e) => Err(HarvestError::from_page(1, e)),
        }
    }

    fn read_page(&self, session: &mut dyn PageSession, page: u32) -> Result<Page> {
        let raw: Vec<RawRow> = evaluate_as(session, isx::EXTRACT_ROWS_SCRIPT)
            .map_err(|e| HarvestError::from_page(page, e))?;
        let shown = raw.len();
        let first_cell = raw.first().map(|r| normalize_ws(&r.date));

        let rows: Vec<Record> = raw
            .into_iter()
            .map(Record::from)
            .filter(|r| !r.date.is_empty())
            .collect();
        if rows.len() < shown {
            warn!(page, dropped = shown - rows.len(), "dropped rows without a date");
        }
        if !is_newest_first(&rows) {
            warn!(page, "page rows are not in newest-first order");
        }
        Ok(Page { rows, shown, first_cell })
    }

    /// Ask for `page` and wait until the table's first cell differs from
    /// the previous page's. Not changing within `delay` is a failed read.
    fn turn_page(
        &self,
        session: &mut dyn PageSession,
        ticker: &str,
        page: u32,
        previous_first: Option<&str>,
        to_date: &str,
    ) -> Result<()> {
        session
            .evaluate(&isx::goto_page_script(page, ticker, &self.opts.from_date, to_date))
            .map_err(|e| HarvestError::from_page(page, e))?;

        let changed = self.pacer.wait_until(self.opts.page_delay(), || {
            let first: Option<String> = evaluate_as(&mut *session, isx::FIRST_ROW_PROBE)
                .map_err(|e| HarvestError::from_page(page, e))?;
            Ok(first.as_deref().map(normalize_ws).as_deref() != previous_first)
        })?;
        if !changed {
            warn!(ticker, page, delay = ?self.opts.page_delay(), "table did not change in time");
            return Err(HarvestError::Extraction {
                page,
                source: SessionError::NotReady(format!("page {page} to replace the previous rows")),
            });
        }
        Ok(())
    }
}

/// A later page must start strictly older than everything fetched so far.
fn check_continues(fetched: &[Record], rows: &[Record], page: u32) -> Result<()> {
    let (Some(last), Some(first)) = (
        fetched.last().and_then(Record::trade_date),
        rows.first().and_then(Record::trade_date),
    ) else {
        return Ok(());
    };
    if first < last {
        return Ok(());
    }
    Err(HarvestError::Extraction {
        page,
        source: SessionError::Script(format!(
            "page {page} starts at {} but the previous page ended at {}",
            first.format(DATE_FMT),
            last.format(DATE_FMT),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pace::CancelToken;
    use crate::session::replay::{Fault, ReplayBook, ReplayFactory};
    use crate::session::SessionFactory;
    use chrono::{Days, NaiveDate};
    use std::time::Duration;

    fn opts() -> ScraperOptions {
        ScraperOptions { page_size: 3, delay: 0, max_pages: 10, ..Default::default() }
    }

    fn pacer() -> Pacer { Pacer::new(Duration::from_millis(1), CancelToken::new()) }

    fn day(i: u64) -> String {
        let base = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        (base - Days::new(i)).format(DATE_FMT).to_string()
    }

    fn raw(i: u64) -> RawRow {
        RawRow { date: day(i), close_price: format!("{}.0", 100 + i), ..Default::default() }
    }

    /// `sizes` rows per page, dates running backwards from day 0.
    fn pages(sizes: &[u64]) -> Vec<Vec<RawRow>> {
        let mut next = 0;
        sizes
            .iter()
            .map(|n| {
                let page = (next..next + n).map(raw).collect();
                next += n;
                page
            })
            .collect()
    }

    fn run(book: ReplayBook, opts: &ScraperOptions, existing: &[Record]) -> (Result<Vec<Record>>, Vec<u32>) {
        let mut factory = ReplayFactory::new(book);
        let stats = factory.stats();
        let mut session = factory.launch().unwrap();
        let perf = PerfTracker::new();
        let p = pacer();
        let out = Paginator::new(opts, &p, &perf).fetch_all(session.as_mut(), "BMFI", existing);
        let read = stats.lock().unwrap().pages_read("BMFI");
        (out, read)
    }

    fn dates(v: &[Record]) -> Vec<String> {
        v.iter().map(|r| r.date.clone()).collect()
    }

    #[test]
    fn first_run_reads_until_short_page() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 3, 1]));
        let (out, read) = run(book, &opts(), &[]);
        let out = out.unwrap();
        assert_eq!(out.len(), 7);
        assert_eq!(read, vec![1, 2, 3]);
        assert!(is_newest_first(&out));
    }

    #[test]
    fn empty_page_ends_history() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 3]));
        let (out, read) = run(book, &opts(), &[]);
        assert_eq!(out.unwrap().len(), 6);
        assert_eq!(read, vec![1, 2, 3]);
    }

    #[test]
    fn stops_on_the_page_holding_the_persisted_head() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 3, 3, 3]));
        let existing: Vec<Record> = (4..12).map(|i| Record::from(raw(i))).collect();
        let (out, read) = run(book, &opts(), &existing);
        assert_eq!(dates(&out.unwrap()), vec![day(0), day(1), day(2), day(3)]);
        assert_eq!(read, vec![1, 2]);
    }

    #[test]
    fn up_to_date_history_yields_nothing() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 3]));
        let existing: Vec<Record> = (0..6).map(|i| Record::from(raw(i))).collect();
        let (out, read) = run(book, &opts(), &existing);
        assert!(out.unwrap().is_empty());
        assert_eq!(read, vec![1]);
    }

    #[test]
    fn page_cap_bounds_the_walk() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 3, 3, 3]));
        let o = ScraperOptions { max_pages: 2, ..opts() };
        let (out, read) = run(book, &o, &[]);
        assert_eq!(out.unwrap().len(), 6);
        assert_eq!(read, vec![1, 2]);
    }

    #[test]
    fn blank_dated_rows_are_dropped_but_page_still_counts_as_full() {
        let mut p = pages(&[3, 1]);
        p[0][1].date = s!("  ");
        let book = ReplayBook::new().with_pages("BMFI", p);
        let (out, read) = run(book, &opts(), &[]);
        assert_eq!(dates(&out.unwrap()), vec![day(0), day(2), day(3)]);
        assert_eq!(read, vec![1, 2]);
    }

    #[test]
    fn garbled_page_is_an_extraction_failure() {
        let book = ReplayBook::new()
            .with_pages("BMFI", pages(&[3, 3, 3]))
            .with_fault("BMFI", Fault::Garbled(2));
        let (out, _) = run(book, &opts(), &[]);
        assert!(matches!(out, Err(HarvestError::Extraction { page: 2, .. })));
    }

    #[test]
    fn dead_session_is_a_navigation_failure() {
        let book = ReplayBook::new()
            .with_pages("BMFI", pages(&[3]))
            .with_fault("BMFI", Fault::DeadOnNavigate);
        let (out, read) = run(book, &opts(), &[]);
        let err = out.unwrap_err();
        assert!(err.is_navigation());
        assert!(read.is_empty());
    }

    #[test]
    fn dialogs_are_accepted() {
        let book = ReplayBook::new()
            .with_pages("BMFI", pages(&[1]))
            .with_dialog("BMFI", "Session about to expire");
        let mut factory = ReplayFactory::new(book);
        let stats = factory.stats();
        let mut session = factory.launch().unwrap();
        let perf = PerfTracker::new();
        let p = pacer();
        let o = opts();
        Paginator::new(&o, &p, &perf).fetch_all(session.as_mut(), "BMFI", &[]).unwrap();
        assert_eq!(stats.lock().unwrap().dialogs, vec![s!("Session about to expire")]);
    }

    #[test]
    fn expired_deadline_aborts_with_timeout() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 3]));
        let mut factory = ReplayFactory::new(book);
        let mut session = factory.launch().unwrap();
        let perf = PerfTracker::new();
        let p = pacer();
        let o = opts();
        let deadline = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let err = Paginator::new(&o, &p, &perf)
            .fetch_within(session.as_mut(), "BMFI", &[], deadline)
            .unwrap_err();
        assert!(matches!(err, HarvestError::Timeout { .. }));
    }

    #[test]
    fn steps_are_recorded() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 1]));
        let mut factory = ReplayFactory::new(book);
        let mut session = factory.launch().unwrap();
        let perf = PerfTracker::new();
        let p = pacer();
        let o = opts();
        Paginator::new(&o, &p, &perf).fetch_all(session.as_mut(), "BMFI", &[]).unwrap();
        let aggs = perf.aggregates();
        let count = |n: &str| aggs.iter().find(|a| a.name == n).map(|a| a.count).unwrap_or(0);
        assert_eq!(count("read_page"), 2);
        assert_eq!(count("next_page"), 1);
        assert_eq!(count("open_history"), 1);
    }

    /// Holds each page request back until `lag` more scripts have run.
    struct Lagging {
        inner: Box<dyn PageSession>,
        lag: u32,
        pending: Option<(String, u32)>,
    }

    impl PageSession for Lagging {
        fn navigate(&mut self, url: &str) -> std::result::Result<(), SessionError> { self.inner.navigate(url) }
        fn wait_ready(&mut self, sel: &str) -> std::result::Result<(), SessionError> { self.inner.wait_ready(sel) }
        fn evaluate(&mut self, script: &str) -> std::result::Result<serde_json::Value, SessionError> {
            if let Some((held, left)) = self.pending.take() {
                if left == 0 {
                    self.inner.evaluate(&held)?;
                } else {
                    self.pending = Some((held, left - 1));
                }
            }
            if let isx::ScriptKind::GotoPage(_) = isx::classify(script) {
                self.pending = Some((s!(script), self.lag));
                return Ok(serde_json::Value::Bool(true));
            }
            self.inner.evaluate(script)
        }
        fn on_dialog(&mut self, h: crate::session::DialogHandler) { self.inner.on_dialog(h) }
        fn stop(&mut self) -> std::result::Result<(), SessionError> { self.inner.stop() }
    }

    #[test]
    fn slow_page_turns_are_waited_for() {
        let book = ReplayBook::new().with_pages("BMFI", pages(&[3, 3, 1]));
        let mut factory = ReplayFactory::new(book);
        let stats = factory.stats();
        let mut session = Lagging { inner: factory.launch().unwrap(), lag: 4, pending: None };
        let perf = PerfTracker::new();
        let p = pacer();
        let o = ScraperOptions { delay: 1, ..opts() };
        let out = Paginator::new(&o, &p, &perf).fetch_all(&mut session, "BMFI", &[]).unwrap();
        assert_eq!(dates(&out), (0..7).map(day).collect::<Vec<_>>());
        assert_eq!(stats.lock().unwrap().pages_read("BMFI"), vec![1, 2, 3]);
    }

    #[test]
    fn page_that_never_redraws_fails_instead_of_rereading() {
        let book = ReplayBook::new()
            .with_pages("BMFI", pages(&[3, 3, 1]))
            .with_fault("BMFI", Fault::StuckBefore(2));
        let (out, read) = run(book, &opts(), &[]);
        assert!(matches!(out, Err(HarvestError::Extraction { page: 2, .. })));
        assert_eq!(read, vec![1]);
    }

    #[test]
    fn stale_table_is_caught_when_its_first_date_is_blank() {
        let mut p = pages(&[3, 3, 1]);
        p[0][0].date = s!(" ");
        let book = ReplayBook::new()
            .with_pages("BMFI", p)
            .with_fault("BMFI", Fault::StuckBefore(2));
        let (out, read) = run(book, &opts(), &[]);
        assert!(matches!(out, Err(HarvestError::Extraction { page: 2, .. })));
        assert_eq!(read, vec![1]);
    }

    #[test]
    fn blank_first_date_on_a_later_page_still_turns() {
        let mut p = pages(&[3, 3, 1]);
        p[1][0].date = s!("");
        let book = ReplayBook::new().with_pages("BMFI", p);
        let (out, read) = run(book, &opts(), &[]);
        assert_eq!(out.unwrap().len(), 6);
        assert_eq!(read, vec![1, 2, 3]);
    }

    #[test]
    fn page_that_does_not_go_further_back_is_rejected() {
        let p = vec![vec![raw(0), raw(1), raw(2)], vec![raw(1), raw(2), raw(3)]];
        let book = ReplayBook::new().with_pages("BMFI", p);
        let (out, read) = run(book, &opts(), &[]);
        assert!(matches!(out, Err(HarvestError::Extraction { page: 2, .. })));
        assert_eq!(read, vec![1, 2]);
    }
}
