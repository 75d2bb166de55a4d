// src/change.rs
//! Day-over-day change columns.

use tracing::debug;

use crate::record::Record;

/// Fill `change` and `change_percent` for a newest-first series.
///
/// Row `i` is compared with row `i + 1` (the previous trading day). The
/// oldest row has nothing to compare with and stays at zero, as does any
/// row where either close fails to parse.
pub fn annotate(mut history: Vec<Record>) -> Vec<Record> {
    history.iter_mut().for_each(Record::clear_derived);

    for i in 0..history.len().saturating_sub(1) {
        let (current, previous) = match (history[i].close_value(), history[i + 1].close_value()) {
            (Ok(c), Ok(p)) => (c, p),
            (Err(e), _) | (_, Err(e)) => {
                debug!(date = %history[i].date, "skipping change: {e}");
                continue;
            }
        };

        let change = current - previous;
        let row = &mut history[i];
        row.change = change;
        row.change_percent = if previous != 0.0 { change / previous * 100.0 } else { 0.0 };
    }

    history
}
