// src/recovery.rs
//! Session lifecycle for a batch: launch, refresh, failure policy, shutdown.
//!
//! Refreshes happen on a fixed cadence (every `refresh_every` tickers) and
//! after any failure that leaves the browser unusable. A refresh always
//! stops the old session before launching the next one, and the new one
//! must load `about:blank` before it is trusted.

use std::{sync::mpsc, thread, time::Duration};

use tracing::{debug, error, info, warn};

use crate::config::ScraperOptions;
use crate::core::pace::Pacer;
use crate::error::{HarvestError, Result};
use crate::session::{PageSession, SessionError, SessionFactory};
use crate::specs::isx::BLANK_URL;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// The session is gone; refresh before the next ticker.
    Navigation,
    /// A page or value could not be read; the session is still usable.
    Extraction,
    Transient,
}

pub fn classify(err: &HarvestError) -> FailureClass {
    match err {
        e if e.is_navigation() => FailureClass::Navigation,
        HarvestError::Refresh(_) => FailureClass::Navigation,
        HarvestError::Extraction { .. } | HarvestError::Parse { .. } => FailureClass::Extraction,
        _ => FailureClass::Transient,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RecoveryPolicy {
    pub refresh_every: usize,
    pub failure_backoff: Duration,
    pub refresh_backoff: Duration,
    pub shutdown_grace: Duration,
}

impl From<&ScraperOptions> for RecoveryPolicy {
    fn from(o: &ScraperOptions) -> Self {
        Self {
            refresh_every: o.refresh_every.max(1),
            failure_backoff: o.failure_backoff(),
            refresh_backoff: o.refresh_backoff(),
            shutdown_grace: o.shutdown_grace(),
        }
    }
}

pub struct RecoveryManager {
    factory: Box<dyn SessionFactory>,
    session: Option<Box<dyn PageSession>>,
    policy: RecoveryPolicy,
    refreshes: usize,
}

impl RecoveryManager {
    pub fn new(factory: Box<dyn SessionFactory>, policy: RecoveryPolicy) -> Self {
        Self { factory, session: None, policy, refreshes: 0 }
    }

    pub fn policy(&self) -> &RecoveryPolicy { &self.policy }

    /// Sessions replaced so far, the first launch not included.
    pub fn refreshes(&self) -> usize { self.refreshes }

    pub fn has_session(&self) -> bool { self.session.is_some() }

    /// Launch a session if there is none.
    pub fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_none() {
            let fresh = self.launch_probed()?;
            info!("browser session started");
            self.session = Some(fresh);
        }
        Ok(())
    }

    /// Stop the current session (if any) and replace it with a probed one.
    /// On failure the manager is left without a session.
    pub fn refresh_session(&mut self) -> Result<()> {
        if let Some(mut old) = self.session.take() {
            if let Err(e) = old.stop() {
                debug!("stopping old session: {e}");
            }
        }
        let fresh = self.launch_probed()?;
        self.refreshes += 1;
        info!(refreshes = self.refreshes, "browser session refreshed");
        self.session = Some(fresh);
        Ok(())
    }

    fn launch_probed(&mut self) -> Result<Box<dyn PageSession>> {
        let mut s = self.factory.launch().map_err(HarvestError::Refresh)?;
        if let Err(e) = s.navigate(BLANK_URL) {
            let _ = s.stop();
            return Err(HarvestError::Refresh(e));
        }
        Ok(s)
    }

    /// Proactive refresh is due before the `index`-th ticker (0-based).
    pub fn refresh_due(&self, index: usize) -> bool {
        index > 0 && index % self.policy.refresh_every == 0
    }

    /// Get a usable session before the `index`-th ticker.
    ///
    /// `Ok(false)` means the session could not be (re)created: the failure is
    /// logged, the refresh backoff has elapsed, and the ticker should be
    /// skipped. `Err` is only ever cancellation.
    pub fn prepare(&mut self, index: usize, ticker: &str, pacer: &Pacer) -> Result<bool> {
        let outcome = if self.refresh_due(index) {
            debug!(ticker, index, "proactive session refresh");
            self.refresh_session()
        } else {
            self.ensure_session()
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(ticker, "session refresh failed, skipping: {e}");
                pacer.pause(self.policy.refresh_backoff)?;
                Ok(false)
            }
        }
    }

    /// The live session. Call `ensure_session` or `prepare` first.
    pub fn session(&mut self) -> Result<&mut dyn PageSession> {
        match self.session.as_deref_mut() {
            Some(s) => Ok(s),
            None => Err(HarvestError::Session(SessionError::Closed)),
        }
    }

    /// Apply the failure policy for `err` and return its class.
    /// Navigation failures get a reactive refresh; everything else keeps
    /// the session. `Err` is only ever cancellation.
    pub fn handle_failure(&mut self, ticker: &str, err: &HarvestError, pacer: &Pacer) -> Result<FailureClass> {
        let class = classify(err);
        match class {
            FailureClass::Navigation => {
                warn!(ticker, "navigation failure, refreshing session: {err}");
                match self.refresh_session() {
                    Ok(()) => pacer.pause(self.policy.failure_backoff)?,
                    Err(e) => {
                        error!(ticker, "reactive refresh failed: {e}");
                        pacer.pause(self.policy.refresh_backoff)?;
                    }
                }
            }
            FailureClass::Extraction | FailureClass::Transient => {
                warn!(ticker, class = ?class, "failed: {err}");
                pacer.pause(self.policy.failure_backoff)?;
            }
        }
        Ok(class)
    }

    /// Stop the session, giving up after the grace period.
    /// A session that does not stop in time is abandoned on its thread.
    pub fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else { return };
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(s!("session-shutdown"))
            .spawn(move || {
                let _ = tx.send(session.stop());
            });
        if let Err(e) = spawned {
            warn!("could not spawn shutdown thread: {e}");
            return;
        }
        match rx.recv_timeout(self.policy.shutdown_grace) {
            Ok(Ok(())) => info!("browser session stopped"),
            Ok(Err(e)) => warn!("browser session stop reported: {e}"),
            Err(_) => warn!(grace = ?self.policy.shutdown_grace, "browser session did not stop in time, abandoning it"),
        }
    }
}

impl Drop for RecoveryManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
