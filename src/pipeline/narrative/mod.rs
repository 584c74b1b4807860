pub mod client;
pub mod prompt;
pub mod requestor;

pub use client::*;
pub use prompt::*;
pub use requestor::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrativeError {
    #[error("Narrative service is not reachable at {0}")]
    Connection(String),

    #[error("Narrative request timed out after {0}s")]
    Timeout(u64),

    #[error("Narrative service returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("Malformed narrative response: {0}")]
    MalformedResponse(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NarrativeError {
    /// Transient failures worth another attempt: unreachable, timed out,
    /// rate-limited or a 5xx from the service.
    pub fn is_retryable(&self) -> bool {
        match self {
            NarrativeError::Connection(_) | NarrativeError::Timeout(_) => true,
            NarrativeError::Service { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
