//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use crate::errors::{EscrowError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the escrow/milestone ledger REST API
    pub ledger_url: String,
    /// Opaque bearer credential attached to every ledger call
    pub api_token: String,
    /// Per-request transport timeout in seconds
    pub request_timeout_secs: u64,
    /// How many times a transport failure is retried before surfacing
    pub max_retries: u32,
    /// Directory the local payment journal persists its JSON files into
    pub journal_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load optional .env file (ignored if missing).
        let _ = dotenvy::dotenv();

        Ok(Config {
            ledger_url: env_var("LEDGER_URL").map_err(|_| {
                EscrowError::Config("LEDGER_URL environment variable is required".to_string())
            })?,
            api_token: env_var("LEDGER_API_TOKEN").map_err(|_| {
                EscrowError::Config("LEDGER_API_TOKEN environment variable is required".to_string())
            })?,
            request_timeout_secs: env_var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| EscrowError::Config("Invalid REQUEST_TIMEOUT_SECS".to_string()))?,
            max_retries: env_var("LEDGER_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| EscrowError::Config("Invalid LEDGER_MAX_RETRIES".to_string()))?,
            journal_dir: env_var("JOURNAL_DIR")
                .unwrap_or_else(|_| "./payment_journal".to_string())
                .into(),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| EscrowError::Config(format!("Missing env var: {key}")))
}
