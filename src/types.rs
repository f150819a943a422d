//! Domain model shared across the workflow: projects, bids, escrow accounts,
//! milestones, and journal entries.
//!
//! ## Design decisions
//!
//! ### Stored flags vs. derived status
//!
//! A [`Milestone`] carries the raw server flags (`is_completed`,
//! `payment_released`, `auto_released`, ...). Consumers never interpret those
//! flags directly; the single canonical reading lives in
//! [`crate::status::resolve`].
//!
//! ### `pending_payment` is not `accepted`
//!
//! [`BidStatus::PendingPayment`] means "accepted by the client but escrow not
//! yet funded". A bid reaches [`BidStatus::Accepted`] only after escrow
//! funding verification succeeds; the two must never be conflated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Accepting bids.
    Open,
    /// A bid was accepted and escrow funded; work in progress.
    Active,
    /// All milestones delivered and paid out.
    Completed,
    Cancelled,
}

/// An agreement between one client and one freelancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub budget: f64,
    /// Set at bid acceptance; the amount the escrow is funded with.
    pub final_amount: Option<f64>,
    pub status: ProjectStatus,
}

/// Lifecycle status of a freelancer's bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    /// Accepted by the client, escrow funding not yet verified.
    PendingPayment,
    /// Escrow funding verified; the bid is binding.
    Accepted,
    Rejected,
    Withdrawn,
}

/// A freelancer's proposal on an open project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: u64,
    pub project_id: u64,
    pub freelancer_id: u64,
    pub amount: f64,
    pub status: BidStatus,
}

impl Bid {
    /// `true` while the bid is waiting on escrow funding — the state the
    /// payment workflow starts from.
    pub fn awaiting_payment(&self) -> bool {
        self.status == BidStatus::PendingPayment
    }
}

/// Funding state of a project's escrow account, as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// No escrow exists yet; funding starts with `create_escrow`.
    NotCreated,
    /// An order was created but payment never verified (stalled funding).
    Pending,
    /// Funded and verified; milestones may be released.
    Completed,
}

/// One escrow account per project, at most one live at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub project_id: u64,
    pub status: EscrowStatus,
    pub amount: f64,
    /// Gateway-assigned order identifier, present once created.
    pub order_id: Option<String>,
    pub currency: String,
}

/// A deliverable unit within a project's escrow.
///
/// `index` is the milestone's stable identity within its project. The boolean
/// flags are server-owned; do not interpret them ad hoc — use
/// [`crate::status::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub index: u32,
    pub title: String,
    pub description: String,
    pub amount: f64,
    pub due_date: Option<DateTime<Utc>>,
    /// Freelancer marked the work done.
    pub is_completed: bool,
    /// Server confirmed the payout left escrow.
    pub payment_released: bool,
    /// `None` until a release attempt occurs; `Some(true)` = gateway payout
    /// succeeded automatically; `Some(false)` = payout failed and went to
    /// manual handling.
    pub auto_released: Option<bool>,
    pub payment_initiated: bool,
    pub manual_processing: bool,
    pub completion_notes: Option<String>,
    pub evidence: Option<String>,
}

/// Outcome of a `release_milestone` (or `approve_milestone`) ledger call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseResult {
    /// Gateway payout went through without human intervention.
    pub automatic_transfer: bool,
    /// Payout handed off to the ops team.
    pub manual_processing_required: bool,
    pub payout_id: Option<String>,
    pub transfer_id: Option<String>,
}

/// Status of a locally journalled payment action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEntryStatus {
    /// Submitted for manual processing, awaiting server confirmation.
    Submitted,
    Completed,
    Rejected,
    Transferred,
}

/// Client-durable record of a submitted-but-unconfirmed payment action.
///
/// Advisory only: it bridges UI state across reloads while the server
/// processes asynchronously. Server state always wins on conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub milestone_index: u32,
    pub amount: f64,
    pub title: String,
    pub payment_id: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub status: JournalEntryStatus,
}
