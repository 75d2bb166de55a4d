// src/core/pace.rs
//! Blocking waits.
//!
//! The site has no "content loaded" signal, so every pause in the harvester
//! is a bounded poll of some condition. A plain delay is just a poll whose
//! condition never holds. All waits observe the shared `CancelToken`.

use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    thread,
    time::{Duration, Instant},
};

use crate::error::{HarvestError, Result};

const MIN_POLL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(HarvestError::Cancelled) } else { Ok(()) }
    }
}

#[derive(Clone, Debug)]
pub struct Pacer {
    poll: Duration,
    cancel: CancelToken,
}

impl Pacer {
    pub fn new(poll: Duration, cancel: CancelToken) -> Self {
        Self { poll: poll.max(MIN_POLL), cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken { &self.cancel }

    /// Poll `ready` until it holds or `timeout` runs out.
    /// `Ok(true)` means the condition held, `Ok(false)` means we timed out.
    /// The condition is always evaluated at least once.
    pub fn wait_until<F>(&self, timeout: Duration, mut ready: F) -> Result<bool>
    where
        F: FnMut() -> Result<bool>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.cancel.check()?;
            if ready()? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(self.poll.min(deadline - now));
        }
    }

    /// Hold for `d`, returning early only on cancellation.
    pub fn pause(&self, d: Duration) -> Result<()> {
        self.wait_until(d, || Ok(false)).map(|_| ())
    }
}

/// Overall ceiling for one entity's work.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self { started: Instant::now(), limit }
    }

    pub fn check(&self, ticker: &str) -> Result<()> {
        if self.started.elapsed() > self.limit {
            Err(HarvestError::Timeout { ticker: s!(ticker), limit: self.limit })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer() -> Pacer { Pacer::new(Duration::from_millis(1), CancelToken::new()) }

    #[test]
    fn returns_as_soon_as_condition_holds() {
        let mut calls = 0;
        let ok = pacer()
            .wait_until(Duration::from_secs(5), || { calls += 1; Ok(calls == 3) })
            .unwrap();
        assert!(ok);
        assert_eq!(calls, 3);
    }

    #[test]
    fn zero_timeout_checks_once() {
        let mut calls = 0;
        let ok = pacer().wait_until(Duration::ZERO, || { calls += 1; Ok(false) }).unwrap();
        assert!(!ok);
        assert_eq!(calls, 1);
    }

    #[test]
    fn cancellation_wins_over_waiting() {
        let p = pacer();
        p.cancel_token().cancel();
        let err = p.pause(Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, HarvestError::Cancelled));
    }

    #[test]
    fn condition_errors_propagate() {
        let err = pacer()
            .wait_until(Duration::from_secs(1), || Err(HarvestError::Config(s!("boom"))))
            .unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn deadline_trips_after_limit() {
        let d = Deadline::after(Duration::ZERO);
        thread::sleep(Duration::from_millis(2));
        assert!(matches!(d.check("BMFI"), Err(HarvestError::Timeout { .. })));
        assert!(Deadline::after(Duration::from_secs(60)).check("BMFI").is_ok());
    }
}
