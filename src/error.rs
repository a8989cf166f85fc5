//! Error types for the harvester core.
//!
//! Nothing here is fatal to the process: fetch errors degrade to
//! "no items from this page", forward errors to "nothing sent this cycle".

use thiserror::Error;

/// Errors that can occur while fetching one listing page
#[derive(Error, Debug)]
pub enum FetchError {
    /// Upstream answered 429
    #[error("rate limited by upstream")]
    RateLimited,

    /// Any other non-success status
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Body was not a listing page
    #[error("malformed page body: {0}")]
    Parse(String),
}

/// How the collection loop should react to a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Transient,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::RateLimited => FailureKind::RateLimited,
            FetchError::Status(_) | FetchError::Transport(_) | FetchError::Parse(_) => {
                FailureKind::Transient
            }
        }
    }
}

/// Errors that can occur while posting ids downstream
#[derive(Error, Debug)]
pub enum ForwardError {
    /// Downstream answered with a non-2xx status
    #[error("downstream returned status {0}")]
    Status(u16),

    /// Connection or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
