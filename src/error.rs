//! Error types shared by the webhook adapter, cache, and fee desk.
//!
//! Extraction and date parsing never produce errors (they fall back to
//! defaults); only I/O-shaped failures and caller input problems surface
//! here.

use thiserror::Error;

use crate::filter::FilterError;

#[derive(Debug, Error)]
pub enum FeesError {
    #[error("{0}")]
    Network(String),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("Invalid JSON from webhook: {0}")]
    InvalidJson(String),

    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Local cache error: {0}")]
    Cache(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl From<rusqlite::Error> for FeesError {
    fn from(err: rusqlite::Error) -> Self {
        FeesError::Cache(err.to_string())
    }
}

pub type FeesResult<T> = Result<T, FeesError>;
