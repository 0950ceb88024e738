//! Error taxonomy for page loading and bootstrap.
//!
//! "Not found" and "cancelled" are navigation outcomes, not errors, and never appear here.

use std::time::Duration;
use thiserror::Error;

/// A page loader failed for a reason other than being superseded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {}", humantime::format_duration(*.0))]
    TimedOut(Duration),

    #[error("request failed: {0}")]
    Http(String),
}

impl LoaderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LoaderError::TimedOut(_))
    }
}

impl From<reqwest::Error> for LoaderError {
    fn from(e: reqwest::Error) -> Self {
        LoaderError::Http(e.to_string())
    }
}

/// Global data could not be fetched. Fatal to the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("fetching global data failed after {attempts} attempt(s): {message}")]
    Fetch { attempts: u32, message: String },

    #[error("global data is malformed: {0}")]
    Decode(String),
}
