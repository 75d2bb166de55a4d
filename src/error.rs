// src/error.rs
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionError;

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The session stopped answering (closed context, dead browser).
    #[error("failed to navigate: {source}")]
    Navigation {
        #[source]
        source: SessionError,
    },

    /// A page could not be read or decoded mid-fetch.
    #[error("failed to extract page {page}: {source}")]
    Extraction {
        page: u32,
        #[source]
        source: SessionError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not parse {field} value {value:?}")]
    Parse { field: &'static str, value: String },

    #[error("session refresh failed: {0}")]
    Refresh(#[source] SessionError),

    #[error("{ticker}: gave up after {limit:?}")]
    Timeout { ticker: String, limit: Duration },

    #[error("run cancelled")]
    Cancelled,

    /// A session call outside any page, e.g. the preflight probe.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("could not load configuration: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),
}

impl HarvestError {
    /// Map a capability failure seen while working on `page`.
    /// A dead session is a navigation failure wherever it shows up.
    pub fn from_page(page: u32, source: SessionError) -> Self {
        if source.is_dead() {
            HarvestError::Navigation { source }
        } else {
            HarvestError::Extraction { page, source }
        }
    }

    /// True when the browser has to be replaced before going on.
    pub fn is_navigation(&self) -> bool {
        match self {
            HarvestError::Navigation { .. } => true,
            HarvestError::Session(e) => e.is_dead(),
            _ => false,
        }
    }
}

impl From<figment::Error> for HarvestError {
    fn from(e: figment::Error) -> Self {
        HarvestError::ConfigLoad(Box::new(e))
    }
}
