//! Canonical milestone status derivation.
//!
//! The one place where the raw milestone flags are interpreted. Several
//! consumers (client review, freelancer tracking, payout history) all display
//! the same canonical value; none of them re-derive it from the flags.

use serde::{Deserialize, Serialize};

use crate::types::Milestone;

/// Canonical display status of a milestone. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    /// Work not yet marked done.
    Pending,
    /// A payment pipeline has started but not concluded.
    PaymentInitiated,
    /// Done, waiting on client approval.
    PendingApproval,
    /// Paid out (non-automatic path concluded).
    Completed,
    /// Payout attempted, gateway failed; ops team intervention pending.
    ManualProcessing,
    /// Gateway payout succeeded automatically.
    AutoPaid,
}

impl MilestoneStatus {
    /// Short identifier string, e.g. for logs or display keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PaymentInitiated => "payment_initiated",
            Self::PendingApproval => "pending_approval",
            Self::Completed => "completed",
            Self::ManualProcessing => "manual_processing",
            Self::AutoPaid => "auto_paid",
        }
    }
}

/// Map a milestone's raw flags to its canonical status.
///
/// Pure function; the branch order is load-bearing. `auto_released` is
/// checked before the generic `manual_processing` flag because a failed
/// automatic payout still sets `payment_released = true`.
pub fn resolve(m: &Milestone) -> MilestoneStatus {
    if !m.is_completed {
        // Edge case: payment pipeline started before the completion flag synced.
        return if m.payment_initiated {
            MilestoneStatus::PaymentInitiated
        } else {
            MilestoneStatus::Pending
        };
    }

    if !m.payment_released {
        return if m.payment_initiated {
            MilestoneStatus::PaymentInitiated
        } else {
            MilestoneStatus::PendingApproval
        };
    }

    match m.auto_released {
        Some(true) => MilestoneStatus::AutoPaid,
        Some(false) => MilestoneStatus::ManualProcessing,
        None if m.manual_processing && m.payment_initiated => MilestoneStatus::ManualProcessing,
        None => MilestoneStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(
        is_completed: bool,
        payment_released: bool,
        auto_released: Option<bool>,
        payment_initiated: bool,
        manual_processing: bool,
    ) -> Milestone {
        Milestone {
            is_completed,
            payment_released,
            auto_released,
            payment_initiated,
            manual_processing,
            ..Milestone::default()
        }
    }

    #[test]
    fn not_completed_is_pending() {
        let m = milestone(false, false, None, false, false);
        assert_eq!(resolve(&m), MilestoneStatus::Pending);
    }

    #[test]
    fn not_completed_but_payment_initiated() {
        let m = milestone(false, false, None, true, false);
        assert_eq!(resolve(&m), MilestoneStatus::PaymentInitiated);
    }

    #[test]
    fn completed_unreleased_is_pending_approval() {
        let m = milestone(true, false, None, false, false);
        assert_eq!(resolve(&m), MilestoneStatus::PendingApproval);
    }

    #[test]
    fn completed_unreleased_with_payment_initiated() {
        let m = milestone(true, false, None, true, false);
        assert_eq!(resolve(&m), MilestoneStatus::PaymentInitiated);
    }

    #[test]
    fn released_automatically_is_auto_paid() {
        let m = milestone(true, true, Some(true), false, false);
        assert_eq!(resolve(&m), MilestoneStatus::AutoPaid);
    }

    #[test]
    fn failed_auto_release_is_manual_processing() {
        let m = milestone(true, true, Some(false), false, false);
        assert_eq!(resolve(&m), MilestoneStatus::ManualProcessing);
    }

    #[test]
    fn auto_released_false_wins_over_manual_flags() {
        // Both signals present: the concluded release attempt decides.
        let m = milestone(true, true, Some(false), true, true);
        assert_eq!(resolve(&m), MilestoneStatus::ManualProcessing);

        let m = milestone(true, true, Some(true), true, true);
        assert_eq!(resolve(&m), MilestoneStatus::AutoPaid);
    }

    #[test]
    fn manual_flags_without_release_attempt() {
        let m = milestone(true, true, None, true, true);
        assert_eq!(resolve(&m), MilestoneStatus::ManualProcessing);
    }

    #[test]
    fn manual_flag_alone_is_not_manual_processing() {
        // `manual_processing` only counts together with `payment_initiated`.
        let m = milestone(true, true, None, false, true);
        assert_eq!(resolve(&m), MilestoneStatus::Completed);
    }

    #[test]
    fn released_without_flags_is_completed() {
        let m = milestone(true, true, None, false, false);
        assert_eq!(resolve(&m), MilestoneStatus::Completed);
    }

    #[test]
    fn resolution_is_deterministic_over_all_flag_combinations() {
        for bits in 0u8..16 {
            for auto in [None, Some(false), Some(true)] {
                let m = milestone(
                    bits & 1 != 0,
                    bits & 2 != 0,
                    auto,
                    bits & 4 != 0,
                    bits & 8 != 0,
                );
                assert_eq!(resolve(&m), resolve(&m.clone()));
            }
        }
    }

    #[test]
    fn status_as_str() {
        assert_eq!(MilestoneStatus::Pending.as_str(), "pending");
        assert_eq!(
            MilestoneStatus::PaymentInitiated.as_str(),
            "payment_initiated"
        );
        assert_eq!(
            MilestoneStatus::PendingApproval.as_str(),
            "pending_approval"
        );
        assert_eq!(MilestoneStatus::Completed.as_str(), "completed");
        assert_eq!(
            MilestoneStatus::ManualProcessing.as_str(),
            "manual_processing"
        );
        assert_eq!(MilestoneStatus::AutoPaid.as_str(), "auto_paid");
    }
}
