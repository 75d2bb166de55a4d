// src/perf.rs
//! Nested step timing.
//!
//! Each processed ticker builds a tree of named steps. Closing a step folds
//! its duration into a batch-wide aggregate keyed by step name, so a name
//! that shows up at several depths still lands in one bucket, once per node.
//!
//! The open step is tracked by an explicit stack of child indices from the
//! root, so closing never searches the tree.

use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tracing::warn;

#[derive(Clone, Debug)]
pub struct StepTiming {
    pub name: String,
    pub started: Instant,
    /// `None` while the step is still open.
    pub duration: Option<Duration>,
    pub children: Vec<StepTiming>,
}

impl StepTiming {
    fn open(name: &str) -> Self {
        Self { name: s!(name), started: Instant::now(), duration: None, children: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepAggregate {
    pub name: String,
    pub count: u32,
    pub total: Duration,
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl StepAggregate {
    fn first(name: &str, d: Duration) -> Self {
        Self { name: s!(name), count: 1, total: d, average: d, min: d, max: d }
    }

    fn fold(&mut self, d: Duration) {
        self.count += 1;
        self.total += d;
        self.average = self.total / self.count;
        self.min = self.min.min(d);
        self.max = self.max.max(d);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub label: String,
    pub ok: bool,
}

#[derive(Default)]
struct Inner {
    roots: Vec<StepTiming>,
    /// Child indices from a root down to the open step.
    open: Vec<usize>,
    aggregates: HashMap<String, StepAggregate>,
    runs: Vec<RunOutcome>,
}

impl Inner {
    fn node_mut(&mut self, path: &[usize]) -> Option<&mut StepTiming> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get_mut(*first)?;
        for &i in rest {
            node = node.children.get_mut(i)?;
        }
        Some(node)
    }

    fn start(&mut self, name: &str) {
        let step = StepTiming::open(name);
        if self.open.is_empty() {
            self.roots.push(step);
            self.open.push(self.roots.len() - 1);
            return;
        }
        let path = self.open.clone();
        match self.node_mut(&path) {
            Some(parent) => {
                parent.children.push(step);
                let idx = parent.children.len() - 1;
                self.open.push(idx);
            }
            None => {
                warn!(step = name, "open step vanished; starting a new root");
                self.open.clear();
                self.roots.push(step);
                self.open.push(self.roots.len() - 1);
            }
        }
    }

    fn end(&mut self) -> bool {
        let path = self.open.clone();
        let Some(node) = self.node_mut(&path) else { return false };
        let d = node.started.elapsed();
        node.duration = Some(d);
        let name = node.name.clone();

        match self.aggregates.get_mut(&name) {
            Some(agg) => agg.fold(d),
            None => { self.aggregates.insert(name.clone(), StepAggregate::first(&name, d)); }
        }
        self.open.pop();
        true
    }
}

/// Thread-safe step tracker shared by the whole batch.
#[derive(Default)]
pub struct PerfTracker {
    inner: Mutex<Inner>,
}

impl PerfTracker {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open `name` as a child of the open step (or as a new root).
    pub fn start_step(&self, name: &str) {
        self.lock().start(name);
    }

    /// Close the open step and move back to its parent.
    pub fn end_step(&self) {
        if !self.lock().end() {
            warn!("end_step called with no open step");
        }
    }

    /// Open `name` and close it when the guard drops.
    pub fn step(&self, name: &str) -> StepGuard<'_> {
        self.start_step(name);
        StepGuard { tracker: self }
    }

    /// Indented call tree of the current run.
    pub fn report(&self) -> String {
        let inner = self.lock();
        let mut out = s!("\n=== Performance Report ===\n");
        for root in &inner.roots {
            write_tree(&mut out, root, 0);
        }
        out
    }

    /// Close whatever is still open, record the run outcome, and return its
    /// tree report. Trees are cleared; aggregates keep accumulating.
    pub fn finish_run(&self, label: &str, ok: bool) -> String {
        let mut inner = self.lock();
        while !inner.open.is_empty() {
            if !inner.end() {
                inner.open.clear();
            }
        }
        let mut out = format!("\n=== Performance Report: {label} ===\n");
        for root in &inner.roots {
            write_tree(&mut out, root, 0);
        }
        inner.roots.clear();
        inner.runs.push(RunOutcome { label: s!(label), ok });
        out
    }

    /// Snapshot of all aggregates, largest total first.
    pub fn aggregates(&self) -> Vec<StepAggregate> {
        let mut v: Vec<StepAggregate> = self.lock().aggregates.values().cloned().collect();
        v.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
        v
    }

    pub fn runs(&self) -> Vec<RunOutcome> {
        self.lock().runs.clone()
    }

    pub fn aggregate_report(&self) -> String {
        let runs = self.runs();
        let aggs = self.aggregates();

        let mut out = s!("\n=== Aggregate Performance Report ===\n");
        let ok: Vec<&str> = runs.iter().filter(|r| r.ok).map(|r| r.label.as_str()).collect();
        let failed: Vec<&str> = runs.iter().filter(|r| !r.ok).map(|r| r.label.as_str()).collect();
        let _ = writeln!(out, "Runs: {} ({} ok, {} failed)", runs.len(), ok.len(), failed.len());
        if !ok.is_empty() {
            let _ = writeln!(out, "  ok:     {}", ok.join(", "));
        }
        if !failed.is_empty() {
            let _ = writeln!(out, "  failed: {}", failed.join(", "));
        }
        for a in aggs {
            let _ = write!(
                out,
                "Step: {}\n  Count:   {}\n  Total:   {}\n  Average: {}\n  Min:     {}\n  Max:     {}\n",
                a.name,
                a.count,
                fmt_dur(a.total),
                fmt_dur(a.average),
                fmt_dur(a.min),
                fmt_dur(a.max),
            );
        }
        out
    }
}

#[must_use = "the step closes when the guard is dropped"]
pub struct StepGuard<'a> {
    tracker: &'a PerfTracker,
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        self.tracker.end_step();
    }
}

fn write_tree(out: &mut String, step: &StepTiming, level: usize) {
    let indent = "  ".repeat(level);
    match step.duration {
        Some(d) => { let _ = writeln!(out, "{indent}{}: {}", step.name, fmt_dur(d)); }
        None => { let _ = writeln!(out, "{indent}{}: (open)", step.name); }
    }
    for child in &step.children {
        write_tree(out, child, level + 1);
    }
}

/// Millisecond-rounded duration: `840ms`, `12.305s`.
pub fn fmt_dur(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 { format!("{ms}ms") } else { format!("{}.{:03}s", ms / 1_000, ms % 1_000) }
}
