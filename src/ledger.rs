//! Escrow ledger REST client — stateless wrappers around the server-side
//! escrow/milestone API.
//!
//! ## Resilience
//!
//! * Transport failures (connection reset, timeout) are retried with
//!   exponential back-off, up to [`Config::max_retries`] attempts and capped
//!   at [`MAX_BACKOFF_SECS`] seconds between attempts.
//! * `Conflict` (duplicate escrow) is **never** retried here; the orchestrator
//!   must re-read status and take the reset-then-recreate path.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::{EscrowError, Result};
use crate::gateway::PaymentProof;
use crate::types::{EscrowAccount, Milestone, ReleaseResult};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

/// The seam the orchestrator drives. [`LedgerClient`] is the HTTP
/// implementation; tests substitute an in-memory double.
#[allow(async_fn_in_trait)]
pub trait EscrowLedger {
    /// Create the escrow order for a project. Fails `Conflict` if a live
    /// escrow already exists.
    async fn create_escrow(&self, project_id: u64, amount: f64) -> Result<EscrowOrder>;

    /// Verify a gateway payment proof against the escrow order.
    async fn verify_escrow(&self, project_id: u64, proof: &PaymentProof) -> Result<bool>;

    async fn get_escrow_status(&self, project_id: u64) -> Result<EscrowAccount>;

    /// Compensating action for stalled funding; only valid while the escrow
    /// is `Pending`.
    async fn reset_escrow(&self, project_id: u64) -> Result<()>;

    async fn release_milestone(&self, project_id: u64, index: u32) -> Result<ReleaseResult>;

    async fn approve_milestone(&self, project_id: u64, index: u32) -> Result<ReleaseResult>;

    async fn reject_milestone(&self, project_id: u64, index: u32) -> Result<()>;

    async fn complete_milestone(
        &self,
        project_id: u64,
        index: u32,
        notes: &str,
        evidence: &str,
    ) -> Result<()>;

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<Milestone>>;
}

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

/// Response of `POST /escrow/create`.
#[derive(Debug, Clone, Deserialize)]
pub struct EscrowOrder {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
struct CreateEscrowRequest {
    project_id: u64,
    final_amount: f64,
}

#[derive(Debug, Serialize)]
struct VerifyEscrowRequest<'a> {
    project_id: u64,
    payment_id: &'a str,
    signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyEscrowResponse {
    verified: bool,
}

#[derive(Debug, Serialize)]
struct ProjectRequest {
    project_id: u64,
}

#[derive(Debug, Serialize)]
struct MilestoneRequest {
    project_id: u64,
    milestone_index: u32,
}

#[derive(Debug, Serialize)]
struct CompleteMilestoneRequest<'a> {
    project_id: u64,
    milestone_index: u32,
    completion_notes: &'a str,
    evidence: &'a str,
}

#[derive(Debug, Deserialize)]
struct MilestonesResponse {
    milestones: Vec<Milestone>,
}

// ─────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────

pub struct LedgerClient {
    client: Client,
    base_url: String,
    api_token: String,
    max_retries: u32,
}

impl LedgerClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.ledger_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `path`, retrying transport failures with back-off.
    ///
    /// HTTP-level failures are mapped to the error taxonomy immediately and
    /// never retried here.
    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{path}", self.base_url);
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 0u32;

        loop {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_token)
                .json(body)
                .send()
                .await;

            match response {
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(EscrowError::Network(e));
                    }
                    warn!("ledger request `{path}` failed (retry {attempt} in {backoff}s): {e}");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if resp.status().is_success() {
                        debug!("ledger request `{path}` ok");
                        return Ok(resp.json().await?);
                    }
                    let message = resp.text().await.unwrap_or_default();
                    return Err(map_status(status, path, message));
                }
            }
        }
    }
}

/// Map an HTTP status to the error taxonomy.
fn map_status(status: u16, path: &str, message: String) -> EscrowError {
    let detail = if message.is_empty() {
        format!("`{path}` returned {status}")
    } else {
        format!("`{path}`: {message}")
    };
    match status {
        401 | 403 => EscrowError::Unauthorized(detail),
        404 => EscrowError::NotFound(detail),
        409 => EscrowError::Conflict(detail),
        _ => EscrowError::Server {
            status,
            message: detail,
        },
    }
}

impl EscrowLedger for LedgerClient {
    async fn create_escrow(&self, project_id: u64, amount: f64) -> Result<EscrowOrder> {
        self.post(
            "escrow/create",
            &CreateEscrowRequest {
                project_id,
                final_amount: amount,
            },
        )
        .await
    }

    async fn verify_escrow(&self, project_id: u64, proof: &PaymentProof) -> Result<bool> {
        let resp: VerifyEscrowResponse = self
            .post(
                "escrow/verify",
                &VerifyEscrowRequest {
                    project_id,
                    payment_id: &proof.payment_id,
                    signature: &proof.signature,
                },
            )
            .await?;
        Ok(resp.verified)
    }

    async fn get_escrow_status(&self, project_id: u64) -> Result<EscrowAccount> {
        self.post("escrow/status", &ProjectRequest { project_id })
            .await
    }

    async fn reset_escrow(&self, project_id: u64) -> Result<()> {
        let _: serde_json::Value = self
            .post("escrow/reset", &ProjectRequest { project_id })
            .await?;
        Ok(())
    }

    async fn release_milestone(&self, project_id: u64, index: u32) -> Result<ReleaseResult> {
        self.post(
            "escrow/release-milestone",
            &MilestoneRequest {
                project_id,
                milestone_index: index,
            },
        )
        .await
    }

    async fn approve_milestone(&self, project_id: u64, index: u32) -> Result<ReleaseResult> {
        self.post(
            "milestone/approve",
            &MilestoneRequest {
                project_id,
                milestone_index: index,
            },
        )
        .await
    }

    async fn reject_milestone(&self, project_id: u64, index: u32) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "milestone/reject",
                &MilestoneRequest {
                    project_id,
                    milestone_index: index,
                },
            )
            .await?;
        Ok(())
    }

    async fn complete_milestone(
        &self,
        project_id: u64,
        index: u32,
        notes: &str,
        evidence: &str,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "milestone/complete",
                &CompleteMilestoneRequest {
                    project_id,
                    milestone_index: index,
                    completion_notes: notes,
                    evidence,
                },
            )
            .await?;
        Ok(())
    }

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<Milestone>> {
        let resp: MilestonesResponse = self
            .post("milestone/list", &ProjectRequest { project_id })
            .await?;
        Ok(resp.milestones)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
