//! The escrow workflow state machine.
//!
//! Drives a project from escrow funding through per-milestone release, one
//! awaited step at a time:
//!
//! ```text
//! NotCreated ──create──► gateway ──verify──► release ──► outcome
//! Pending    ──reset───► (funding path above)
//! Completed  ─────────────────────────────► release ──► outcome
//! ```
//!
//! A dismissed checkout aborts the attempt without touching escrow or
//! milestone state. `create` is never re-issued for a `Completed` escrow, and
//! verification is only reachable from inside the funding path, strictly
//! after `create` — there is no verb that verifies without creating.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::{EscrowError, Result};
use crate::gateway::{CheckoutOrder, GatewayOutcome, PaymentGateway};
use crate::journal::{JournalStore, PaymentJournal};
use crate::ledger::EscrowLedger;
use crate::status::{self, MilestoneStatus};
use crate::types::{EscrowStatus, JournalEntry, JournalEntryStatus, Milestone, ReleaseResult};

/// Terminal result of a payment action.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Gateway payout succeeded automatically.
    AutoPaid { payout_id: Option<String> },
    /// Payout handed off to manual processing; the journal keeps a
    /// provisional entry until the server confirms.
    ManualProcessing { payout_id: Option<String> },
    /// Released without an automatic transfer.
    Completed { payout_id: Option<String> },
    /// User dismissed the checkout. Nothing changed; safe to retry.
    Cancelled,
}

/// Exclusive per-milestone action lock, held for the duration of one
/// workflow invocation.
///
/// Released on drop, which covers every exit path — early `?` returns and
/// the owning future being dropped mid-await (e.g. a host timing out the
/// user-paced checkout wait). A leaked index would otherwise wedge the
/// milestone behind [`EscrowError::ActionInFlight`] forever.
struct ActionGuard {
    locks: Arc<Mutex<HashSet<u32>>>,
    index: u32,
}

impl ActionGuard {
    fn acquire(locks: &Arc<Mutex<HashSet<u32>>>, project_id: u64, index: u32) -> Result<Self> {
        let mut held = locks.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(index) {
            return Err(EscrowError::ActionInFlight { project_id, index });
        }
        drop(held);
        Ok(Self {
            locks: Arc::clone(locks),
            index,
        })
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        let mut held = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.index);
    }
}

/// Per-project workflow orchestrator.
///
/// All ledger and gateway calls are awaited sequentially within one
/// invocation. The in-flight set is the exclusive per-milestone action lock:
/// a second trigger for the same milestone while one is running gets
/// [`EscrowError::ActionInFlight`].
pub struct Orchestrator<L, G, S>
where
    L: EscrowLedger,
    G: PaymentGateway,
    S: JournalStore,
{
    project_id: u64,
    ledger: L,
    gateway: G,
    journal: PaymentJournal<S>,
    in_flight: Arc<Mutex<HashSet<u32>>>,
}

impl<L, G, S> Orchestrator<L, G, S>
where
    L: EscrowLedger,
    G: PaymentGateway,
    S: JournalStore,
{
    pub fn new(project_id: u64, ledger: L, gateway: G, journal: PaymentJournal<S>) -> Self {
        Self {
            project_id,
            ledger,
            gateway,
            journal,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn journal(&self) -> &PaymentJournal<S> {
        &self.journal
    }

    /// Fund the escrow if needed, then release the milestone's payout.
    ///
    /// `final_amount` is the full escrow funding amount fixed at bid
    /// acceptance; the journal entry records the milestone's own amount.
    pub async fn pay_milestone(
        &mut self,
        milestone: &Milestone,
        final_amount: f64,
    ) -> Result<Outcome> {
        let _guard = ActionGuard::acquire(&self.in_flight, self.project_id, milestone.index)?;
        self.pay_inner(milestone, final_amount).await
    }

    /// Client approval of a completed milestone; triggers the payout and
    /// records the outcome in the journal.
    pub async fn approve_milestone(&mut self, milestone: &Milestone) -> Result<Outcome> {
        let _guard = ActionGuard::acquire(&self.in_flight, self.project_id, milestone.index)?;
        self.approve_inner(milestone).await
    }

    /// Client rejection: the milestone is reset for rework.
    pub async fn reject_milestone(&mut self, milestone: &Milestone) -> Result<()> {
        let _guard = ActionGuard::acquire(&self.in_flight, self.project_id, milestone.index)?;
        self.reject_inner(milestone).await
    }

    /// Freelancer marks the milestone done, attaching notes and evidence.
    pub async fn complete_milestone(
        &mut self,
        index: u32,
        notes: &str,
        evidence: &str,
    ) -> Result<()> {
        let _guard = ActionGuard::acquire(&self.in_flight, self.project_id, index)?;
        self.ledger
            .complete_milestone(self.project_id, index, notes, evidence)
            .await?;
        info!(
            "milestone {index} of project {} submitted for approval",
            self.project_id
        );
        Ok(())
    }

    /// Fetch milestones, reconcile the journal against server state, and
    /// return each milestone with its canonical status.
    pub async fn refresh_milestones(&mut self) -> Result<Vec<(Milestone, MilestoneStatus)>> {
        let milestones = self.ledger.list_milestones(self.project_id).await?;
        let cleared = self.journal.reconcile(&milestones)?;
        if cleared > 0 {
            info!(
                "journal: {cleared} provisional entr{} confirmed by server",
                if cleared == 1 { "y" } else { "ies" }
            );
        }
        Ok(milestones
            .into_iter()
            .map(|m| {
                let s = status::resolve(&m);
                (m, s)
            })
            .collect())
    }

    // ─────────────────────────────────────────────────────
    // State machine internals
    // ─────────────────────────────────────────────────────

    async fn pay_inner(&mut self, milestone: &Milestone, final_amount: f64) -> Result<Outcome> {
        let escrow = self.ledger.get_escrow_status(self.project_id).await?;

        match escrow.status {
            EscrowStatus::Completed => {
                // Already funded: route straight to release, never re-create.
                info!(
                    "escrow for project {} already funded, releasing milestone {}",
                    self.project_id, milestone.index
                );
                let result = self
                    .ledger
                    .release_milestone(self.project_id, milestone.index)
                    .await?;
                self.record_outcome(milestone, result, None)
            }
            EscrowStatus::Pending => {
                // Funding stalled on a previous attempt; compensate first.
                warn!(
                    "escrow for project {} stalled in pending, resetting before re-funding",
                    self.project_id
                );
                self.ledger.reset_escrow(self.project_id).await?;
                self.fund_and_release(milestone, final_amount).await
            }
            EscrowStatus::NotCreated => self.fund_and_release(milestone, final_amount).await,
        }
    }

    async fn fund_and_release(
        &mut self,
        milestone: &Milestone,
        final_amount: f64,
    ) -> Result<Outcome> {
        let order = match self.ledger.create_escrow(self.project_id, final_amount).await {
            Ok(order) => order,
            Err(EscrowError::Conflict(msg)) => {
                // A stale escrow raced the status read. Reset and recreate
                // once; a second conflict is surfaced.
                warn!(
                    "duplicate escrow for project {} ({msg}), resetting and recreating",
                    self.project_id
                );
                self.ledger.reset_escrow(self.project_id).await?;
                self.ledger.create_escrow(self.project_id, final_amount).await?
            }
            Err(e) => return Err(e),
        };

        let checkout = CheckoutOrder {
            order_id: order.order_id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            description: milestone.title.clone(),
        };

        let proof = match self.gateway.collect(&checkout).await? {
            GatewayOutcome::Paid(proof) => proof,
            GatewayOutcome::Cancelled => {
                info!(
                    "checkout for order {} dismissed, aborting funding attempt",
                    order.order_id
                );
                return Ok(Outcome::Cancelled);
            }
        };

        let verified = self.ledger.verify_escrow(self.project_id, &proof).await?;
        if !verified {
            return Err(EscrowError::PaymentVerification(format!(
                "proof for payment {} rejected by ledger",
                proof.payment_id
            )));
        }
        info!(
            "escrow for project {} funded and verified (payment {})",
            self.project_id, proof.payment_id
        );

        let result = self
            .ledger
            .release_milestone(self.project_id, milestone.index)
            .await?;
        self.record_outcome(milestone, result, Some(proof.payment_id))
    }

    async fn approve_inner(&mut self, milestone: &Milestone) -> Result<Outcome> {
        let result = self
            .ledger
            .approve_milestone(self.project_id, milestone.index)
            .await?;
        self.record_outcome(milestone, result, None)
    }

    async fn reject_inner(&mut self, milestone: &Milestone) -> Result<()> {
        self.ledger
            .reject_milestone(self.project_id, milestone.index)
            .await?;
        info!(
            "milestone {} of project {} rejected, reset for rework",
            milestone.index, self.project_id
        );
        self.journal.record_history(JournalEntry {
            milestone_index: milestone.index,
            amount: milestone.amount,
            title: milestone.title.clone(),
            payment_id: String::new(),
            timestamp: Utc::now().timestamp(),
            status: JournalEntryStatus::Rejected,
        })
    }

    /// Branch on the release result and journal accordingly.
    fn record_outcome(
        &mut self,
        milestone: &Milestone,
        result: ReleaseResult,
        payment_id: Option<String>,
    ) -> Result<Outcome> {
        let payment_id = payment_id
            .or_else(|| result.payout_id.clone())
            .unwrap_or_default();
        let entry = |status| JournalEntry {
            milestone_index: milestone.index,
            amount: milestone.amount,
            title: milestone.title.clone(),
            payment_id: payment_id.clone(),
            timestamp: Utc::now().timestamp(),
            status,
        };

        if result.automatic_transfer {
            info!(
                "milestone {} of project {} paid out automatically (payout {:?})",
                milestone.index, self.project_id, result.payout_id
            );
            self.journal
                .record_history(entry(JournalEntryStatus::Transferred))?;
            Ok(Outcome::AutoPaid {
                payout_id: result.payout_id,
            })
        } else if result.manual_processing_required {
            warn!(
                "milestone {} of project {} handed to manual processing (payout {:?})",
                milestone.index, self.project_id, result.payout_id
            );
            self.journal
                .record_submission(entry(JournalEntryStatus::Submitted))?;
            Ok(Outcome::ManualProcessing {
                payout_id: result.payout_id,
            })
        } else {
            info!(
                "milestone {} of project {} released (payout {:?})",
                milestone.index, self.project_id, result.payout_id
            );
            self.journal
                .record_history(entry(JournalEntryStatus::Completed))?;
            Ok(Outcome::Completed {
                payout_id: result.payout_id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let locks = Arc::new(Mutex::new(HashSet::new()));

        let guard = ActionGuard::acquire(&locks, 7, 0).unwrap();
        assert!(matches!(
            ActionGuard::acquire(&locks, 7, 0),
            Err(EscrowError::ActionInFlight {
                project_id: 7,
                index: 0
            })
        ));

        // Independent milestones are not serialized against each other.
        let _other = ActionGuard::acquire(&locks, 7, 1).unwrap();

        drop(guard);
        assert!(ActionGuard::acquire(&locks, 7, 0).is_ok());
    }

    #[test]
    fn dropping_the_guard_releases_the_lock() {
        let locks = Arc::new(Mutex::new(HashSet::new()));
        drop(ActionGuard::acquire(&locks, 7, 3).unwrap());
        assert!(locks.lock().unwrap().is_empty());
    }
}
