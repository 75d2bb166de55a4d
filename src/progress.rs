// src/progress.rs
/// Lightweight progress reporting for a batch run.
/// Front ends implement this to surface status to users; the harvester
/// itself only logs through `tracing`.
pub trait Progress {
    /// Called at the start with the number of tickers.
    fn begin(&mut self, _total: usize) {}

    /// Free-form status line for human eyes.
    fn log(&mut self, _msg: &str) {}

    /// A ticker finished and its file is current.
    fn item_done(&mut self, _ticker: &str, _new_rows: usize) {}

    /// A ticker was skipped or failed; the batch goes on.
    fn item_failed(&mut self, _ticker: &str, _reason: &str) {}

    /// Called at the end, successful or not.
    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}

/// Prints one line per event to stdout.
pub struct ConsoleProgress {
    total: usize,
    seen: usize,
}

impl ConsoleProgress {
    pub fn new() -> Self { Self { total: 0, seen: 0 } }
}

impl Default for ConsoleProgress {
    fn default() -> Self { Self::new() }
}

impl Progress for ConsoleProgress {
    fn begin(&mut self, total: usize) {
        self.total = total;
        println!("Processing {total} ticker(s)");
    }

    fn log(&mut self, msg: &str) {
        println!("{msg}");
    }

    fn item_done(&mut self, ticker: &str, new_rows: usize) {
        self.seen += 1;
        println!("[{}/{}] {ticker}: {new_rows} new row(s)", self.seen, self.total);
    }

    fn item_failed(&mut self, ticker: &str, reason: &str) {
        self.seen += 1;
        println!("[{}/{}] {ticker}: FAILED ({reason})", self.seen, self.total);
    }

    fn finish(&mut self) {
        println!("Done.");
    }
}
