//! Application-wide error types.
//!
//! The taxonomy matters to callers: `Network` and `Server` are safe to retry,
//! `Conflict` requires a status re-read (reset-then-recreate), `Unauthorized`
//! needs a fresh credential, and `NotFound` is fatal to the current flow.
//! A dismissed gateway checkout is *not* an error — see
//! [`crate::gateway::GatewayOutcome::Cancelled`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Payment verification failed: {0}")]
    PaymentVerification(String),

    #[error("Action already in flight for project {project_id}, milestone {index}")]
    ActionInFlight { project_id: u64, index: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Journal storage error for key `{key}`: {source}")]
    Storage {
        key: String,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EscrowError>;
