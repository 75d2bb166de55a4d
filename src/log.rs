// src/log.rs
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use tracing_subscriber::{
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogOptions;
use crate::error::Result;

static START: OnceLock<Instant> = OnceLock::new();

fn start() -> Instant {
    *START.get_or_init(Instant::now)
}

pub fn fmt_elapsed(ms: u128) -> String {
    let total_ms = ms as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1_000;
    let ms = total_ms % 1_000;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

/// Time since the process first touched the logger.
pub fn uptime() -> String {
    fmt_elapsed(start().elapsed().as_millis())
}

/// Log lines are stamped with process uptime, `00:03:12.407`.
struct Uptime;

impl FormatTime for Uptime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", uptime())
    }
}

/// Install the global subscriber: stderr plus, if enabled, a fresh
/// `<dir>/harvest_<timestamp>.log`. Returns the log file path.
///
/// Filter precedence: `RUST_LOG`, then `log.filter`, then `debug`/`info`
/// depending on `browser.debug`.
pub fn init(opts: &LogOptions, debug: bool) -> Result<Option<PathBuf>> {
    start();
    let fallback = opts
        .filter
        .clone()
        .unwrap_or_else(|| s!(if debug { "debug" } else { "info" }));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let console = fmt::layer().with_writer(io::stderr).with_timer(Uptime).with_target(false);

    let (file_layer, path) = if opts.file {
        fs::create_dir_all(&opts.dir)?;
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let path = opts.dir.join(join!("harvest_", &stamp, ".log"));
        let file = File::create(&path)?;
        let layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_timer(Uptime)
            .with_ansi(false);
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(path)
}
