// src/session/mod.rs
//! The page capability the harvester drives.
//!
//! A `PageSession` is one live, stateful browser tab. The harvester never
//! looks at markup directly: it navigates, waits for a selector, and runs
//! scripts whose JSON results are decoded into typed values right here at
//! the boundary (`evaluate_as`). Nothing downstream sees untyped data.
//!
//! Real automation engines live outside this crate; `replay` provides a
//! fixture-backed implementation for offline runs and tests.

pub mod replay;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("context canceled")]
    Closed,
    #[error("timed out waiting for {0}")]
    NotReady(String),
    #[error("script failed: {0}")]
    Script(String),
    #[error("could not decode script result: {0}")]
    Decode(String),
    #[error("browser launch failed: {0}")]
    Launch(String),
}

impl SessionError {
    /// True when the session itself is gone rather than one call failing.
    pub fn is_dead(&self) -> bool {
        matches!(self, SessionError::Closed | SessionError::Launch(_))
    }
}

/// Called with the dialog message; return `true` to accept it.
pub type DialogHandler = Box<dyn FnMut(&str) -> bool + Send>;

pub trait PageSession: Send {
    fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Block until `selector` matches something on the current document.
    fn wait_ready(&mut self, selector: &str) -> Result<(), SessionError>;

    /// Run `script` in the page and hand back its raw JSON result.
    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, SessionError>;

    /// Replace the handler for transient `alert`/`confirm` dialogs.
    fn on_dialog(&mut self, handler: DialogHandler);

    fn stop(&mut self) -> Result<(), SessionError>;
}

/// Creates fresh sessions; used at startup and on every refresh.
pub trait SessionFactory {
    fn launch(&mut self) -> Result<Box<dyn PageSession>, SessionError>;
}

/// Evaluate and decode into `T` in one step.
pub fn evaluate_as<T: DeserializeOwned>(
    session: &mut dyn PageSession,
    script: &str,
) -> Result<T, SessionError> {
    let value = session.evaluate(script)?;
    serde_json::from_value(value).map_err(|e| SessionError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo(serde_json::Value);

    impl PageSession for Echo {
        fn navigate(&mut self, _url: &str) -> Result<(), SessionError> { Ok(()) }
        fn wait_ready(&mut self, _selector: &str) -> Result<(), SessionError> { Ok(()) }
        fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, SessionError> {
            Ok(self.0.clone())
        }
        fn on_dialog(&mut self, _handler: DialogHandler) {}
        fn stop(&mut self) -> Result<(), SessionError> { Ok(()) }
    }

    #[test]
    fn evaluate_as_decodes_typed_result() {
        let mut s = Echo(json!([1, 2, 3]));
        let v: Vec<u32> = evaluate_as(&mut s, "x").unwrap();
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn evaluate_as_reports_shape_mismatch() {
        let mut s = Echo(json!({"not": "a list"}));
        let err = evaluate_as::<Vec<u32>>(&mut s, "x").unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
        assert!(!err.is_dead());
    }
}
