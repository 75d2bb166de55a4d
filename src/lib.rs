// src/lib.rs
// Incremental ISX price-history harvester.

#[macro_use]
pub mod macros;

pub mod error;
pub mod log;
pub mod config;
pub mod core;
pub mod specs;
pub mod session;

pub mod record;
pub mod pager;
pub mod merge;
pub mod change;
pub mod recovery;
pub mod perf;
pub mod progress;
pub mod file;
pub mod store;
pub mod runner;

pub use error::{HarvestError, Result};
pub use record::Record;
pub use runner::{BatchSummary, Harvester};
