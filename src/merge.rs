// src/merge.rs
//! Overlap merge of freshly fetched rows onto persisted history.
//!
//! Both inputs are newest-first. The remote history is treated as
//! append-only: a date already on disk is never rewritten, even if the
//! site now reports different numbers for it.

use std::collections::HashSet;

use tracing::warn;

use crate::record::Record;

/// Index in `fresh` of the newest persisted date, if the page reaches it.
pub fn overlap_index(existing: &[Record], fresh: &[Record]) -> Option<usize> {
    let head = existing.first()?;
    fresh.iter().position(|r| r.date == head.date)
}

/// Rows of `fresh` that are newer than everything in `existing`.
pub fn new_rows<'a>(existing: &[Record], fresh: &'a [Record]) -> &'a [Record] {
    match overlap_index(existing, fresh) {
        Some(i) => &fresh[..i],
        None => fresh,
    }
}

/// `fresh[..overlap] ++ existing`.
///
/// Any fresh row whose date is already persisted further down is dropped
/// as well, so the result never carries a date twice.
pub fn merge(existing: Vec<Record>, fresh: Vec<Record>) -> Vec<Record> {
    let cut = overlap_index(&existing, &fresh).unwrap_or(fresh.len());
    let known: HashSet<&str> = existing.iter().map(|r| r.date.as_str()).collect();

    let mut seen: HashSet<String> = HashSet::with_capacity(cut);
    let mut merged = Vec::with_capacity(cut + existing.len());
    let mut dropped = 0usize;

    for r in fresh.into_iter().take(cut) {
        if known.contains(r.date.as_str()) || !seen.insert(r.date.clone()) {
            dropped += 1;
            continue;
        }
        merged.push(r);
    }
    if dropped > 0 {
        warn!(dropped, "fresh rows duplicated persisted or repeated dates; kept the first copy");
    }

    drop(known);
    merged.extend(existing);
    merged
}
