// src/session/replay.rs
//! Fixture-backed session.
//!
//! Answers the ISX scripts from captured pages instead of a browser:
//! `<dir>/<TICKER>.json` holds an array of pages, each an array of raw row
//! objects exactly as the extraction script would return them. Faults can
//! be injected per ticker to exercise the recovery paths.

use std::{
    collections::HashMap,
    fs,
    io,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::{json, Value};
use tracing::debug;

use super::{DialogHandler, PageSession, SessionError, SessionFactory};
use crate::record::RawRow;
use crate::specs::isx::{self, ScriptKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Navigating to the ticker reports a closed context.
    DeadOnNavigate,
    /// Reading this page fails inside the page script.
    BrokenPage(u32),
    /// This page returns something that is not a row list.
    Garbled(u32),
    /// Asking for this page is accepted but the table never redraws.
    StuckBefore(u32),
}

#[derive(Clone, Debug, Default)]
pub struct ReplayBook {
    pages: HashMap<String, Vec<Vec<RawRow>>>,
    faults: HashMap<String, Fault>,
    dialogs: HashMap<String, String>,
}

impl ReplayBook {
    pub fn new() -> Self { Self::default() }

    pub fn with_pages(mut self, ticker: &str, pages: Vec<Vec<RawRow>>) -> Self {
        self.pages.insert(s!(ticker), pages);
        self
    }

    pub fn with_fault(mut self, ticker: &str, fault: Fault) -> Self {
        self.faults.insert(s!(ticker), fault);
        self
    }

    /// Fire a JS dialog with `message` when the ticker's page opens.
    pub fn with_dialog(mut self, ticker: &str, message: &str) -> Self {
        self.dialogs.insert(s!(ticker), s!(message));
        self
    }

    /// Load every `*.json` fixture in `dir`; the file stem is the ticker.
    pub fn from_dir(dir: &Path) -> io::Result<Self> {
        let mut book = Self::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") { continue; }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue; };
            let text = fs::read_to_string(&path)?;
            let pages: Vec<Vec<RawRow>> = serde_json::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {e}", path.display())))?;
            book.pages.insert(stem.to_ascii_uppercase(), pages);
        }
        Ok(book)
    }

    pub fn tickers(&self) -> Vec<String> {
        let mut v: Vec<String> = self.pages.keys().cloned().collect();
        v.sort();
        v
    }
}

/// What the sessions of one factory did, for assertions and debugging.
#[derive(Clone, Debug, Default)]
pub struct ReplayStats {
    pub launches: usize,
    pub stops: usize,
    pub extracted: Vec<(String, u32)>,
    pub dialogs: Vec<String>,
}

impl ReplayStats {
    pub fn pages_read(&self, ticker: &str) -> Vec<u32> {
        self.extracted.iter().filter(|(t, _)| t == ticker).map(|(_, p)| *p).collect()
    }
}

type SharedStats = Arc<Mutex<ReplayStats>>;

fn lock(stats: &SharedStats) -> MutexGuard<'_, ReplayStats> {
    stats.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ReplaySession {
    book: Arc<ReplayBook>,
    stats: SharedStats,
    ticker: Option<String>,
    page: u32,
    searched: bool,
    stopped: bool,
    dialog: Option<DialogHandler>,
}

impl ReplaySession {
    fn new(book: Arc<ReplayBook>, stats: SharedStats) -> Self {
        Self { book, stats, ticker: None, page: 0, searched: false, stopped: false, dialog: None }
    }

    fn alive(&self) -> Result<(), SessionError> {
        if self.stopped { Err(SessionError::Closed) } else { Ok(()) }
    }

    fn fault(&self) -> Option<&Fault> {
        self.ticker.as_ref().and_then(|t| self.book.faults.get(t))
    }

    fn current_rows(&self) -> &[RawRow] {
        let Some(t) = &self.ticker else { return &[] };
        if !self.searched || self.page == 0 { return &[]; }
        self.book
            .pages
            .get(t)
            .and_then(|pages| pages.get(self.page as usize - 1))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn extract(&mut self) -> Result<Value, SessionError> {
        match self.fault() {
            Some(Fault::BrokenPage(p)) if *p == self.page => {
                return Err(SessionError::Script(format!("dispTable missing on page {p}")));
            }
            Some(Fault::Garbled(p)) if *p == self.page => {
                return Ok(json!("<table>…</table>"));
            }
            _ => {}
        }
        if let Some(t) = &self.ticker {
            if self.searched {
                lock(&self.stats).extracted.push((t.clone(), self.page));
            }
        }
        serde_json::to_value(self.current_rows()).map_err(|e| SessionError::Decode(e.to_string()))
    }
}

impl PageSession for ReplaySession {
    fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.alive()?;
        self.ticker = isx::ticker_from_url(url);
        self.page = 0;
        self.searched = false;
        if self.fault() == Some(&Fault::DeadOnNavigate) {
            return Err(SessionError::Closed);
        }
        let message = self.ticker.as_ref().and_then(|t| self.book.dialogs.get(t)).cloned();
        if let (Some(msg), Some(handler)) = (message, self.dialog.as_mut()) {
            if handler(&msg) {
                lock(&self.stats).dialogs.push(msg);
            }
        }
        Ok(())
    }

    fn wait_ready(&mut self, selector: &str) -> Result<(), SessionError> {
        self.alive()?;
        if selector == isx::TABLE_SELECTOR && self.current_rows().is_empty() {
            return Err(SessionError::NotReady(s!(selector)));
        }
        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<Value, SessionError> {
        self.alive()?;
        match isx::classify(script) {
            ScriptKind::Search { .. } => {
                self.searched = self.ticker.is_some();
                self.page = 1;
                Ok(json!(true))
            }
            ScriptKind::ExtractRows => self.extract(),
            ScriptKind::FirstRowProbe => {
                Ok(self.current_rows().first().map(|r| json!(r.date)).unwrap_or(Value::Null))
            }
            ScriptKind::GotoPage(n) => {
                if !self.searched {
                    return Err(SessionError::Script(s!("doAjax is not defined")));
                }
                if self.fault() == Some(&Fault::StuckBefore(n)) {
                    debug!(page = n, "replay page request ignored");
                    return Ok(json!(true));
                }
                self.page = n;
                Ok(json!(true))
            }
            ScriptKind::Other => Ok(Value::Null),
        }
    }

    fn on_dialog(&mut self, handler: DialogHandler) {
        self.dialog = Some(handler);
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        self.alive()?;
        self.stopped = true;
        lock(&self.stats).stops += 1;
        debug!("replay session stopped");
        Ok(())
    }
}

pub struct ReplayFactory {
    book: Arc<ReplayBook>,
    stats: SharedStats,
    failing: Vec<usize>,
}

impl ReplayFactory {
    pub fn new(book: ReplayBook) -> Self {
        Self { book: Arc::new(book), stats: SharedStats::default(), failing: Vec::new() }
    }

    /// Make the `n`-th launch (1-based) fail.
    pub fn fail_launch(mut self, n: usize) -> Self {
        self.failing.push(n);
        self
    }

    pub fn stats(&self) -> Arc<Mutex<ReplayStats>> {
        Arc::clone(&self.stats)
    }
}

impl SessionFactory for ReplayFactory {
    fn launch(&mut self) -> Result<Box<dyn PageSession>, SessionError> {
        let n = {
            let mut st = lock(&self.stats);
            st.launches += 1;
            st.launches
        };
        if self.failing.contains(&n) {
            return Err(SessionError::Launch(format!("launch {n} refused")));
        }
        Ok(Box::new(ReplaySession::new(Arc::clone(&self.book), Arc::clone(&self.stats))))
    }
}
