// src/record.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Date format used by the exchange and by the persisted files.
pub const DATE_FMT: &str = "%d/%m/%Y";

/// One trading day for one ticker.
///
/// Price and volume columns stay textual, exactly as the exchange prints
/// them; only `change` and `change_percent` are derived locally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub total_shares: String,
    pub num_trades: String,
    pub change: f64,
    pub change_percent: f64,
}

impl Record {
    pub fn trade_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), DATE_FMT).ok()
    }

    /// Closing price as a number. Thousands separators are tolerated.
    pub fn close_value(&self) -> Result<f64> {
        parse_number("Close", &self.close)
    }

    pub fn clear_derived(&mut self) {
        self.change = 0.0;
        self.change_percent = 0.0;
    }
}

pub fn parse_number(field: &'static str, raw: &str) -> Result<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| HarvestError::Parse { field, value: s!(raw) })
}

/// One table row as the extraction script returns it.
/// Missing keys decode as empty strings so a damaged row can be dropped
/// later instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawRow {
    pub date: String,
    pub open_price: String,
    pub high_price: String,
    pub low_price: String,
    pub close_price: String,
    pub volume: String,
    pub total_shares: String,
    pub num_trades: String,
}

impl From<RawRow> for Record {
    fn from(r: RawRow) -> Self {
        use crate::core::sanitize::normalize_ws;
        Record {
            date: normalize_ws(&r.date),
            open: normalize_ws(&r.open_price),
            high: normalize_ws(&r.high_price),
            low: normalize_ws(&r.low_price),
            close: normalize_ws(&r.close_price),
            volume: normalize_ws(&r.volume),
            total_shares: normalize_ws(&r.total_shares),
            num_trades: normalize_ws(&r.num_trades),
            change: 0.0,
            change_percent: 0.0,
        }
    }
}

/// True when dates are strictly decreasing head to tail.
/// Rows with unparseable dates are skipped by the comparison.
pub fn is_newest_first(rows: &[Record]) -> bool {
    let dates: Vec<NaiveDate> = rows.iter().filter_map(Record::trade_date).collect();
    dates.windows(2).all(|w| w[0] > w[1])
}
