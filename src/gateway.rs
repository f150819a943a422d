//! Hosted checkout session, modelled as a single awaitable operation.
//!
//! The third-party SDK drives a `handler`/`ondismiss` callback pair; here a
//! session is one `collect` call that resolves to either
//! [`GatewayOutcome::Paid`] with the gateway-issued proof, or
//! [`GatewayOutcome::Cancelled`] when the user dismisses the checkout.
//! Cancellation is a recoverable abort, never an error.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::errors::Result;

/// Proof of payment issued by the gateway exactly once per completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub payment_id: String,
    pub signature: String,
}

/// Parameters for one checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOrder {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub description: String,
}

/// How a checkout session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    Paid(PaymentProof),
    /// User dismissed the session before completing payment.
    Cancelled,
}

/// One funding attempt = one session. Implementations must not reuse a
/// session across `collect` calls.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn collect(&self, order: &CheckoutOrder) -> Result<GatewayOutcome>;
}

// ─────────────────────────────────────────────────────────
// Channel-backed session
// ─────────────────────────────────────────────────────────

/// Bridges the SDK's callbacks into the awaitable model: the host wires the
/// real `handler` to [`GatewayHandle::paid`] and `ondismiss` to
/// [`GatewayHandle::cancelled`]; `collect` awaits whichever fires first.
pub struct ChannelGateway {
    rx: Mutex<mpsc::Receiver<GatewayOutcome>>,
}

/// Sender half handed to the host embedding the checkout UI.
#[derive(Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<GatewayOutcome>,
}

impl ChannelGateway {
    pub fn new() -> (Self, GatewayHandle) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                rx: Mutex::new(rx),
            },
            GatewayHandle { tx },
        )
    }
}

impl GatewayHandle {
    /// Deliver the gateway-issued proof for the open session.
    pub async fn paid(&self, proof: PaymentProof) -> bool {
        self.tx.send(GatewayOutcome::Paid(proof)).await.is_ok()
    }

    /// Report that the user dismissed the checkout.
    pub async fn cancelled(&self) -> bool {
        self.tx.send(GatewayOutcome::Cancelled).await.is_ok()
    }
}

impl PaymentGateway for ChannelGateway {
    async fn collect(&self, order: &CheckoutOrder) -> Result<GatewayOutcome> {
        debug!(
            "opening checkout session for order {} ({} {})",
            order.order_id, order.amount, order.currency
        );
        let mut rx = self.rx.lock().await;
        // Sessions are single-use: a callback that fired while no session
        // was open belongs to a torn-down checkout, not this one. Discard
        // anything buffered before listening.
        while let Ok(stale) = rx.try_recv() {
            debug!("discarding stale checkout outcome {stale:?}");
        }
        // A dropped handle means the host tore the checkout down; treat it
        // the same as a dismissal.
        Ok(rx.recv().await.unwrap_or(GatewayOutcome::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> CheckoutOrder {
        CheckoutOrder {
            order_id: "order_1".to_string(),
            amount: 10_000.0,
            currency: "INR".to_string(),
            description: "Milestone 1".to_string(),
        }
    }

    #[tokio::test]
    async fn collect_resolves_with_proof() {
        let (gateway, handle) = ChannelGateway::new();
        tokio::spawn(async move {
            assert!(
                handle
                    .paid(PaymentProof {
                        payment_id: "pay_1".to_string(),
                        signature: "sig_1".to_string(),
                    })
                    .await
            );
        });

        let outcome = gateway.collect(&order()).await.unwrap();
        match outcome {
            GatewayOutcome::Paid(proof) => assert_eq!(proof.payment_id, "pay_1"),
            other => panic!("expected Paid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn collect_resolves_cancelled_on_dismiss() {
        let (gateway, handle) = ChannelGateway::new();
        tokio::spawn(async move {
            assert!(handle.cancelled().await);
        });

        let outcome = gateway.collect(&order()).await.unwrap();
        assert_eq!(outcome, GatewayOutcome::Cancelled);
    }

    #[tokio::test]
    async fn outcome_sent_between_sessions_is_not_replayed() {
        let (gateway, handle) = ChannelGateway::new();

        // A dismissal callback fires while no session is open (the host tore
        // the previous checkout down late). It must not leak into the next
        // session.
        assert!(handle.cancelled().await);

        let live = handle.clone();
        tokio::spawn(async move {
            assert!(
                live.paid(PaymentProof {
                    payment_id: "pay_2".to_string(),
                    signature: "sig_2".to_string(),
                })
                .await
            );
        });

        let outcome = gateway.collect(&order()).await.unwrap();
        match outcome {
            GatewayOutcome::Paid(proof) => assert_eq!(proof.payment_id, "pay_2"),
            other => panic!("expected Paid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_handle_counts_as_cancelled() {
        let (gateway, handle) = ChannelGateway::new();
        drop(handle);

        let outcome = gateway.collect(&order()).await.unwrap();
        assert_eq!(outcome, GatewayOutcome::Cancelled);
    }
}
