//! Error type for pygdb.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("logging already initialized by another logger")]
    LoggerConflict,
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[cfg(unix)]
    #[error("failed to install SIGCONT handler: {0}")]
    Signal(#[from] nix::Error),
}

impl Error {
    pub(crate) fn invalid_filter(filter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.to_string(),
            reason: reason.into(),
        }
    }
}
