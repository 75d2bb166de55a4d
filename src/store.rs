// src/store.rs
//! Per-ticker history files and the ticker list.
//!
//! File layout (newest row first):
//! `Date,Open,High,Low,Close,Change,Change%,Volume,T.Shares,Trades`
//! with `Change` at three decimals and `Change%` at two plus a `%`.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::core::sanitize::normalize_ticker;
use crate::error::Result;
use crate::file::{history_path, write_atomic};
use crate::record::{is_newest_first, Record};

pub const HEADERS: [&str; 10] =
    ["Date", "Open", "High", "Low", "Close", "Change", "Change%", "Volume", "T.Shares", "Trades"];

#[derive(Clone, Debug)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn path(&self, ticker: &str) -> PathBuf {
        history_path(&self.dir, ticker)
    }

    /// Persisted history, or empty if the ticker has never been saved.
    pub fn load(&self, ticker: &str) -> Result<Vec<Record>> {
        let path = self.path(ticker);
        if !path.exists() {
            debug!(ticker, "no history on disk");
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        let rows = parse_history(&text)?;
        if !is_newest_first(&rows) {
            warn!(ticker, path = %path.display(), "history on disk is not strictly newest-first");
        }
        Ok(rows)
    }

    /// Replace the ticker's file with `rows`. Returns `None` and writes
    /// nothing when there are no rows at all.
    pub fn save(&self, ticker: &str, rows: &[Record]) -> Result<Option<PathBuf>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let path = self.path(ticker);
        write_atomic(&path, &render_history(rows)?)?;
        Ok(Some(path))
    }
}

pub fn render_history(rows: &[Record]) -> Result<Vec<u8>> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(HEADERS)?;
    for r in rows {
        w.write_record([
            r.date.as_str(),
            r.open.as_str(),
            r.high.as_str(),
            r.low.as_str(),
            r.close.as_str(),
            &format!("{:.3}", positive_zero(r.change)),
            &format!("{:.2}%", positive_zero(r.change_percent)),
            r.volume.as_str(),
            r.total_shares.as_str(),
            r.num_trades.as_str(),
        ])?;
    }
    w.into_inner().map_err(|e| io::Error::other(e.to_string()).into())
}

pub fn parse_history(text: &str) -> Result<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let cell = |i: usize| s!(rec.get(i).unwrap_or("").trim());
        out.push(Record {
            date: cell(0),
            open: cell(1),
            high: cell(2),
            low: cell(3),
            close: cell(4),
            change: cell(5).parse().unwrap_or(0.0),
            change_percent: cell(6).trim_end_matches('%').parse().unwrap_or(0.0),
            volume: cell(7),
            total_shares: cell(8),
            num_trades: cell(9),
        });
    }
    Ok(out)
}

/// Ticker list file: CSV with a header row, ticker in the first column.
/// Blank and malformed entries are skipped; duplicates keep the first one.
pub fn read_tickers(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut out: Vec<String> = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let raw = rec.get(0).unwrap_or("");
        match normalize_ticker(raw) {
            Some(t) if !out.contains(&t) => out.push(t),
            Some(t) => debug!(ticker = %t, "duplicate ticker in list"),
            None if raw.trim().is_empty() => {}
            None => warn!(entry = raw, "skipping malformed ticker"),
        }
    }
    Ok(out)
}

fn positive_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}
