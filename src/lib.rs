//! # escrow-flow
//!
//! Client-side core of a freelance-marketplace payment flow: the state
//! machine that takes a project from bid acceptance through escrow funding to
//! per-milestone completion, approval, and payout — including
//! gateway-callback handling and the manual-processing fallback.
//!
//! | Concern             | Module                                    |
//! |---------------------|-------------------------------------------|
//! | Ledger REST API     | [`ledger`] ([`ledger::LedgerClient`])     |
//! | Hosted checkout     | [`gateway`] ([`gateway::ChannelGateway`]) |
//! | Status derivation   | [`status`] ([`status::resolve`])          |
//! | Workflow            | [`orchestrator`]                          |
//! | Local journal       | [`journal`]                               |
//!
//! The orchestrator is generic over the [`ledger::EscrowLedger`] and
//! [`gateway::PaymentGateway`] seams, so hosts embed their own transport or
//! checkout bridge and tests run against in-memory doubles. The server is
//! always the source of truth; the local journal only bridges UI state across
//! reloads while payouts settle asynchronously.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod journal;
pub mod ledger;
pub mod orchestrator;
pub mod status;
pub mod types;

pub use config::Config;
pub use errors::{EscrowError, Result};
pub use gateway::{ChannelGateway, CheckoutOrder, GatewayHandle, GatewayOutcome, PaymentProof};
pub use journal::{JournalStore, JsonFileStore, MemoryStore, PaymentJournal};
pub use ledger::{EscrowLedger, EscrowOrder, LedgerClient};
pub use orchestrator::{Orchestrator, Outcome};
pub use status::{resolve, MilestoneStatus};
pub use types::{
    Bid, BidStatus, EscrowAccount, EscrowStatus, JournalEntry, JournalEntryStatus, Milestone,
    Project, ProjectStatus, ReleaseResult,
};
