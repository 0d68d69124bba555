//! Checkout Orchestrator
//!
//! Drives one checkout attempt through
//! `Loading → Validating → (Blocked | Ready) → Paying → Verifying → Committing → Done`.
//! Steps are strictly sequential. Failures before commit give back every
//! hold taken in the attempt and leave the session in `Ready` or `Blocked`
//! so the buyer can correct and retry.

use super::error::CheckoutError;
use super::pricing::{calculate_totals, ShippingRates};
use super::validation::validate_cart;
use crate::orders::{CommitRequest, OrderCommitter, PricedLine};
use crate::payment::{OrderContext, PaymentError, PaymentGatewayAdapter, PaymentRequest};
use crate::stock::{ReserveRequest, StockError, StockHold, StockHoldMode, StockReservationManager};
use serde::{Deserialize, Serialize};
use shared::models::{
    CartLine, OrderTotals, PaymentMethod, PaymentStatus, StockIssue, StockIssueKind,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    Loading,
    Validating,
    Blocked,
    Ready,
    Paying,
    Verifying,
    Committing,
    Done,
}

/// What to do when the verifier cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFallback {
    /// Release stock and report a retryable failure
    #[default]
    Block,
    /// Commit with `payment_status = pending` and flag for review
    Provisional,
}

impl std::str::FromStr for VerificationFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "provisional" => Ok(Self::Provisional),
            other => Err(format!("unknown verification fallback: {other}")),
        }
    }
}

/// One buyer's checkout attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub customer_id: i64,
    pub email: String,
    pub cart: Vec<CartLine>,
    pub lines: Vec<PricedLine>,
    pub issues: Vec<StockIssue>,
    pub shipping_region: String,
    pub totals: OrderTotals,
    pub state: CheckoutState,
}

impl CheckoutSession {
    pub fn is_blocked(&self) -> bool {
        self.state == CheckoutState::Blocked
    }
}

/// Returned to the confirmation view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: i64,
    pub order_number: String,
    pub totals: OrderTotals,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub needs_review: bool,
}

pub struct CheckoutOrchestrator {
    stock: Arc<StockReservationManager>,
    committer: Arc<OrderCommitter>,
    payments: Arc<PaymentGatewayAdapter>,
    rates: ShippingRates,
    fallback: VerificationFallback,
}

impl CheckoutOrchestrator {
    pub fn new(
        stock: Arc<StockReservationManager>,
        committer: Arc<OrderCommitter>,
        payments: Arc<PaymentGatewayAdapter>,
        rates: ShippingRates,
        fallback: VerificationFallback,
    ) -> Self {
        Self {
            stock,
            committer,
            payments,
            rates,
            fallback,
        }
    }

    pub fn payments(&self) -> &Arc<PaymentGatewayAdapter> {
        &self.payments
    }

    pub fn rates(&self) -> &ShippingRates {
        &self.rates
    }

    /// Load catalog data for the cart, validate stock and price it
    pub async fn initialize(
        &self,
        customer_id: Option<i64>,
        email: &str,
        cart: Vec<CartLine>,
        shipping_region: &str,
    ) -> Result<CheckoutSession, CheckoutError> {
        let customer_id = customer_id.ok_or(CheckoutError::Unauthenticated)?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut session = CheckoutSession {
            customer_id,
            email: email.to_string(),
            cart,
            lines: Vec::new(),
            issues: Vec::new(),
            shipping_region: shipping_region.to_string(),
            totals: OrderTotals::default(),
            state: CheckoutState::Loading,
        };
        self.validate(&mut session).await?;
        Ok(session)
    }

    /// Change the delivery region; shipping and VAT are recomputed together
    pub fn set_region(&self, session: &mut CheckoutSession, shipping_region: &str) {
        session.shipping_region = shipping_region.to_string();
        self.price(session);
    }

    /// Fresh stock read for every line
    pub async fn validate(&self, session: &mut CheckoutSession) -> Result<(), CheckoutError> {
        session.state = CheckoutState::Validating;
        let ids: Vec<i64> = session.cart.iter().map(|l| l.product_id).collect();
        let products = self.stock.ledger().find_products(&ids).await?;
        let validated = validate_cart(&session.cart, &products)?;

        session.lines = validated.lines;
        session.issues = validated.issues;
        self.price(session);
        session.state = if session.issues.is_empty() {
            CheckoutState::Ready
        } else {
            tracing::info!(
                customer_id = session.customer_id,
                issues = session.issues.len(),
                "Checkout blocked by stock"
            );
            CheckoutState::Blocked
        };
        Ok(())
    }

    /// Run payment, verification and commit for a validated session
    ///
    /// `reference` lets the caller fix the payment reference up front (to
    /// watch for the provider's authorization URL); one is generated
    /// otherwise.
    pub async fn checkout(
        &self,
        session: &mut CheckoutSession,
        payment_method: PaymentMethod,
        reference: Option<String>,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        if session.state == CheckoutState::Done {
            return Err(CheckoutError::InvalidCart(
                "checkout already completed".into(),
            ));
        }

        // Second validation, right before any money moves
        self.validate(session).await?;
        if session.is_blocked() {
            return Err(CheckoutError::Blocked(session.issues.clone()));
        }

        let holds = self.take_holds(session).await?;

        if payment_method.is_cash_on_delivery() {
            return self
                .commit(session, payment_method, PaymentStatus::Pending, None, false, holds)
                .await;
        }

        // Paying
        session.state = CheckoutState::Paying;
        let reference = reference.unwrap_or_else(|| self.payments.new_reference());
        let request = PaymentRequest {
            email: session.email.clone(),
            amount: session.totals.total_amount,
            reference: reference.clone(),
            channels: payment_method
                .channels()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            metadata: serde_json::json!({
                "customer_id": session.customer_id,
                "shipping_region": session.shipping_region,
                "lines": session.lines.len(),
            }),
        };
        if let Err(e) = self.payments.initiate_payment(&request).await {
            self.abort(session, &holds).await;
            return Err(e.into());
        }

        // Verifying
        session.state = CheckoutState::Verifying;
        let context = OrderContext {
            customer_id: session.customer_id,
            line_count: session.lines.len(),
            shipping_region: session.shipping_region.clone(),
        };
        let (payment_status, needs_review) = match self
            .payments
            .verify_payment(&reference, session.totals.total_amount, context)
            .await
        {
            Ok(result) if result.verified => (PaymentStatus::Paid, false),
            Ok(result) => {
                tracing::warn!(
                    target: "audit",
                    reference = %reference,
                    customer_id = session.customer_id,
                    provider_status = %result.status,
                    "Payment not verified, no order created"
                );
                self.abort(session, &holds).await;
                return Err(PaymentError::VerificationFailed {
                    reference,
                    reason: result
                        .gateway_response
                        .unwrap_or_else(|| format!("provider status {}", result.status)),
                }
                .into());
            }
            Err(PaymentError::VerifierUnavailable(msg)) => match self.fallback {
                VerificationFallback::Block => {
                    tracing::warn!(
                        target: "audit",
                        reference = %reference,
                        customer_id = session.customer_id,
                        error = %msg,
                        "Verifier unavailable, checkout blocked"
                    );
                    self.abort(session, &holds).await;
                    return Err(CheckoutError::VerificationUnavailable { reference });
                }
                VerificationFallback::Provisional => {
                    tracing::warn!(
                        target: "audit",
                        reference = %reference,
                        customer_id = session.customer_id,
                        error = %msg,
                        "Verifier unavailable, committing provisionally for review"
                    );
                    (PaymentStatus::Pending, true)
                }
            },
            Err(e) => {
                self.abort(session, &holds).await;
                return Err(e.into());
            }
        };

        self.commit(
            session,
            payment_method,
            payment_status,
            Some(reference),
            needs_review,
            holds,
        )
        .await
    }

    /// Reserve every line up front in reserve mode
    async fn take_holds(&self, session: &mut CheckoutSession) -> Result<Vec<StockHold>, CheckoutError> {
        if self.committer.mode() != StockHoldMode::Reserve {
            return Ok(Vec::new());
        }

        let requests: Vec<ReserveRequest> = session
            .lines
            .iter()
            .map(|l| ReserveRequest {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect();

        match self
            .stock
            .reserve_multiple(&requests, session.customer_id)
            .await
            .into_result()
        {
            Ok(holds) => Ok(holds),
            Err(StockError::Insufficient {
                product_id,
                requested,
                current_stock,
            }) => {
                // Lost a race since validation: show the line like a validation block
                let name = session
                    .lines
                    .iter()
                    .find(|l| l.product_id == product_id)
                    .map(|l| l.name.clone())
                    .unwrap_or_default();
                let issue = StockIssue {
                    product_id,
                    name,
                    requested,
                    available: current_stock,
                    kind: if current_stock == 0 {
                        StockIssueKind::OutOfStock
                    } else {
                        StockIssueKind::Insufficient
                    },
                    current_price: None,
                };
                session.issues = vec![issue];
                session.state = CheckoutState::Blocked;
                Err(CheckoutError::Blocked(session.issues.clone()))
            }
            Err(e) => {
                session.state = CheckoutState::Ready;
                Err(e.into())
            }
        }
    }

    async fn commit(
        &self,
        session: &mut CheckoutSession,
        payment_method: PaymentMethod,
        payment_status: PaymentStatus,
        payment_reference: Option<String>,
        needs_review: bool,
        holds: Vec<StockHold>,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        session.state = CheckoutState::Committing;
        let request = CommitRequest {
            customer_id: session.customer_id,
            lines: session.lines.clone(),
            totals: session.totals,
            shipping_region: session.shipping_region.clone(),
            payment_method,
            payment_status,
            payment_reference: payment_reference.clone(),
            needs_review,
            holds,
        };

        match self.committer.commit(request).await {
            Ok(committed) => {
                session.state = CheckoutState::Done;
                let order = committed.order;
                let totals = order.totals();
                Ok(CheckoutReceipt {
                    order_id: order.id,
                    order_number: order.order_number,
                    totals,
                    payment_method: order.payment_method,
                    payment_status: order.payment_status,
                    payment_reference: order.payment_reference,
                    needs_review: order.needs_review,
                })
            }
            Err(e) => {
                if payment_status == PaymentStatus::Paid || needs_review {
                    tracing::error!(
                        target: "audit",
                        reference = ?payment_reference,
                        customer_id = session.customer_id,
                        total = %session.totals.total_amount,
                        error = %e,
                        "Payment taken but order not committed, refund review required"
                    );
                }
                session.state = CheckoutState::Ready;
                Err(e.into())
            }
        }
    }

    /// Give back holds after a pre-commit failure
    async fn abort(&self, session: &mut CheckoutSession, holds: &[StockHold]) {
        let released = self.stock.release_holds(holds).await;
        tracing::info!(
            customer_id = session.customer_id,
            released,
            "Checkout attempt aborted, holds released"
        );
        session.state = CheckoutState::Ready;
    }

    fn price(&self, session: &mut CheckoutSession) {
        let shipping = self.rates.fee_for(&session.shipping_region);
        session.totals = calculate_totals(&session.lines, shipping);
    }
}
