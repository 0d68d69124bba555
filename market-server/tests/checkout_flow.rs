//! Checkout flow against the in-memory ledger
//!
//! The payment window and the verifier are scripted; everything else is the
//! production wiring.

use async_trait::async_trait;
use futures::future::join_all;
use market_server::checkout::{
    CheckoutError, CheckoutOrchestrator, CheckoutState, ShippingRates, VerificationFallback,
};
use market_server::ledger::{LedgerStore, MemoryLedger, SharedLedger};
use market_server::orders::{OrderCommitter, OrderReconciler, PARTIAL_COMMIT_REASON};
use market_server::payment::{
    CallbackStatus, PaymentCallback, PaymentError, PaymentGatewayAdapter, PaymentRequest,
    PaymentResult, PaymentUi, PaymentVerifier, VerificationRequest, VerificationResult,
};
use market_server::stock::{StockError, StockHoldMode, StockReservationManager, StockSettings};
use rust_decimal_macros::dec;
use shared::models::{
    CartLine, NewOrder, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus, Product,
    ReservationStatus, StockIssueKind,
};
use shared::util::now_millis;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const TABLE: i64 = 10;
const LAMP: i64 = 11;
const RUG: i64 = 12;

/// Payment window that answers immediately with a fixed status
struct ScriptedUi {
    status: CallbackStatus,
    opened: AtomicUsize,
}

#[async_trait]
impl PaymentUi for ScriptedUi {
    async fn open(&self, request: &PaymentRequest) -> PaymentResult<PaymentCallback> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentCallback {
            reference: request.reference.clone(),
            status: self.status.clone(),
        })
    }
}

#[derive(Clone, Copy)]
enum Verdict {
    Paid,
    NotPaid,
    Unreachable,
}

struct ScriptedVerifier {
    verdict: Verdict,
    calls: AtomicUsize,
}

#[async_trait]
impl PaymentVerifier for ScriptedVerifier {
    async fn verify(&self, request: &VerificationRequest) -> PaymentResult<VerificationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (verified, status) = match self.verdict {
            Verdict::Paid => (true, "success"),
            Verdict::NotPaid => (false, "abandoned"),
            Verdict::Unreachable => {
                return Err(PaymentError::VerifierUnavailable("connection refused".into()));
            }
        };
        Ok(VerificationResult {
            reference: request.reference.clone(),
            verified,
            status: status.into(),
            gateway_response: None,
            raw: serde_json::Value::Null,
        })
    }
}

struct Market {
    ledger: Arc<MemoryLedger>,
    stock: Arc<StockReservationManager>,
    ui: Arc<ScriptedUi>,
    verifier: Arc<ScriptedVerifier>,
    checkout: CheckoutOrchestrator,
}

struct MarketBuilder {
    callback: CallbackStatus,
    verdict: Verdict,
    fallback: VerificationFallback,
    mode: StockHoldMode,
}

impl MarketBuilder {
    fn new() -> Self {
        Self {
            callback: CallbackStatus::Success,
            verdict: Verdict::Paid,
            fallback: VerificationFallback::Block,
            mode: StockHoldMode::Reserve,
        }
    }

    fn callback(mut self, callback: CallbackStatus) -> Self {
        self.callback = callback;
        self
    }

    fn verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = verdict;
        self
    }

    fn fallback(mut self, fallback: VerificationFallback) -> Self {
        self.fallback = fallback;
        self
    }

    fn mode(mut self, mode: StockHoldMode) -> Self {
        self.mode = mode;
        self
    }

    fn build(self) -> Market {
        let ledger = Arc::new(MemoryLedger::new());
        for (id, name, seller_id, price, stock_quantity) in [
            (TABLE, "Teak side table", 3, dec!(100.00), 4),
            (LAMP, "Brass lamp", 3, dec!(45.50), 10),
            (RUG, "Wool rug", 8, dec!(80.00), 2),
        ] {
            ledger.put_product(Product {
                id,
                name: name.into(),
                seller_id,
                price,
                stock_quantity,
            });
        }

        // A conflict needs another writer's success, so this bounds retries under load
        let settings = StockSettings {
            max_attempts: 1_000,
            ..StockSettings::default()
        };
        let stock = Arc::new(StockReservationManager::new(ledger.clone(), settings));
        let committer = Arc::new(OrderCommitter::new(stock.clone(), self.mode));
        let ui = Arc::new(ScriptedUi {
            status: self.callback,
            opened: AtomicUsize::new(0),
        });
        let verifier = Arc::new(ScriptedVerifier {
            verdict: self.verdict,
            calls: AtomicUsize::new(0),
        });
        let payments = Arc::new(PaymentGatewayAdapter::new(
            ui.clone(),
            verifier.clone(),
            "MKT",
        ));
        let rates = ShippingRates::new(dec!(20.00)).with_rate("Northern", dec!(35.00));
        let checkout = CheckoutOrchestrator::new(stock.clone(), committer, payments, rates, self.fallback);

        Market {
            ledger,
            stock,
            ui,
            verifier,
            checkout,
        }
    }
}

fn line(product_id: i64, quantity: i32) -> CartLine {
    CartLine {
        product_id,
        quantity,
        unit_price: None,
    }
}

async fn pay(
    market: &Market,
    cart: Vec<CartLine>,
    method: PaymentMethod,
) -> Result<market_server::checkout::CheckoutReceipt, CheckoutError> {
    let mut session = market
        .checkout
        .initialize(Some(501), "ama@example.com", cart, "Greater Accra")
        .await?;
    market.checkout.checkout(&mut session, method, None).await
}

#[tokio::test]
async fn vat_applies_to_subtotal_plus_shipping() {
    let market = MarketBuilder::new().build();
    let mut session = market
        .checkout
        .initialize(Some(501), "ama@example.com", vec![line(TABLE, 1)], "Greater Accra")
        .await
        .unwrap();

    assert_eq!(session.state, CheckoutState::Ready);
    assert_eq!(
        session.totals,
        OrderTotals {
            subtotal: dec!(100.00),
            shipping_fee: dec!(20.00),
            tax: dec!(21.00),
            total_amount: dec!(141.00),
        }
    );

    // Region change moves shipping and VAT together
    market.checkout.set_region(&mut session, "Northern");
    assert_eq!(session.totals.shipping_fee, dec!(35.00));
    assert_eq!(session.totals.tax, dec!(23.63));
    assert_eq!(session.totals.total_amount, dec!(158.63));
}

#[tokio::test]
async fn verified_card_payment_commits_paid_order() {
    let market = MarketBuilder::new().build();
    let receipt = pay(&market, vec![line(TABLE, 2), line(RUG, 1)], PaymentMethod::Card)
        .await
        .unwrap();

    assert_eq!(receipt.payment_status, PaymentStatus::Paid);
    assert!(!receipt.needs_review);
    assert_eq!(receipt.totals.subtotal, dec!(280.00));
    assert!(receipt.order_number.starts_with("ORD-"));
    assert!(receipt.payment_reference.as_deref().unwrap().starts_with("MKT"));

    let order = market.ledger.find_order(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(order.order_status, OrderStatus::Confirmed);
    // Two sellers, so no header seller
    assert_eq!(order.seller_id, None);
    let items = market.ledger.find_order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 2);

    // Stock taken once, holds confirmed
    assert_eq!(market.ledger.stock_of(TABLE), Some(2));
    assert_eq!(market.ledger.stock_of(RUG), Some(1));
    assert!(
        market
            .ledger
            .reservations()
            .iter()
            .all(|r| r.status == ReservationStatus::Confirmed)
    );
    assert_eq!(market.verifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unverified_payment_creates_no_order() {
    let market = MarketBuilder::new().verdict(Verdict::NotPaid).build();
    let err = pay(&market, vec![line(TABLE, 1)], PaymentMethod::MobileMoney)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Payment(PaymentError::VerificationFailed { .. })
    ));
    assert!(!err.is_retryable());
    assert!(market.ledger.orders().is_empty());
    assert_eq!(market.ledger.stock_of(TABLE), Some(4));
}

#[tokio::test]
async fn buyer_cancel_releases_stock_and_skips_verification() {
    let market = MarketBuilder::new()
        .callback(CallbackStatus::Cancelled)
        .build();
    let err = pay(&market, vec![line(LAMP, 3)], PaymentMethod::Card)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Payment(PaymentError::Cancelled { .. })));
    assert!(err.is_retryable());
    assert_eq!(market.ledger.stock_of(LAMP), Some(10));
    assert_eq!(market.verifier.calls.load(Ordering::SeqCst), 0);
    assert!(market.ledger.orders().is_empty());
}

#[tokio::test]
async fn declined_payment_is_distinct_from_cancel() {
    let market = MarketBuilder::new()
        .callback(CallbackStatus::Failed {
            reason: Some("Insufficient funds".into()),
        })
        .build();
    let err = pay(&market, vec![line(LAMP, 1)], PaymentMethod::Card)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Payment(PaymentError::Declined { reason: Some(ref r) }) if r == "Insufficient funds"
    ));
    assert_eq!(market.ledger.stock_of(LAMP), Some(10));
}

#[tokio::test]
async fn cash_on_delivery_commits_without_payment_window() {
    let market = MarketBuilder::new().build();
    let receipt = pay(&market, vec![line(LAMP, 2)], PaymentMethod::CashOnDelivery)
        .await
        .unwrap();

    assert_eq!(receipt.payment_status, PaymentStatus::Pending);
    assert_eq!(receipt.payment_reference, None);
    assert_eq!(market.ui.opened.load(Ordering::SeqCst), 0);
    assert_eq!(market.verifier.calls.load(Ordering::SeqCst), 0);

    let order = market.ledger.find_order(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(order.order_status, OrderStatus::Pending);
    assert_eq!(order.seller_id, Some(3));
    assert_eq!(market.ledger.stock_of(LAMP), Some(8));
}

#[tokio::test]
async fn unreachable_verifier_blocks_by_default() {
    let market = MarketBuilder::new().verdict(Verdict::Unreachable).build();
    let err = pay(&market, vec![line(RUG, 2)], PaymentMethod::Card)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::VerificationUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(market.ledger.orders().is_empty());
    assert_eq!(market.ledger.stock_of(RUG), Some(2));
}

#[tokio::test]
async fn unreachable_verifier_commits_provisionally_when_configured() {
    let market = MarketBuilder::new()
        .verdict(Verdict::Unreachable)
        .fallback(VerificationFallback::Provisional)
        .build();
    let receipt = pay(&market, vec![line(RUG, 2)], PaymentMethod::Card)
        .await
        .unwrap();

    assert_eq!(receipt.payment_status, PaymentStatus::Pending);
    assert!(receipt.needs_review);
    assert_eq!(market.ledger.stock_of(RUG), Some(0));

    let reference = receipt.payment_reference.unwrap();
    let order = market
        .ledger
        .find_order_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.id, receipt.order_id);
    assert_eq!(order.order_status, OrderStatus::Pending);
}

#[tokio::test]
async fn blocked_cart_lists_every_offending_line() {
    let market = MarketBuilder::new().build();
    market.ledger.put_product(Product {
        id: TABLE,
        name: "Teak side table".into(),
        seller_id: 3,
        price: dec!(100.00),
        stock_quantity: 0,
    });

    let mut session = market
        .checkout
        .initialize(
            Some(501),
            "ama@example.com",
            vec![line(TABLE, 1), line(LAMP, 1), line(RUG, 5)],
            "Greater Accra",
        )
        .await
        .unwrap();
    assert_eq!(session.state, CheckoutState::Blocked);

    let err = market
        .checkout
        .checkout(&mut session, PaymentMethod::Card, None)
        .await
        .unwrap_err();
    let CheckoutError::Blocked(issues) = &err else {
        panic!("expected blocked checkout, got {err:?}");
    };
    assert_eq!(issues.len(), 2);
    let table = issues.iter().find(|i| i.product_id == TABLE).unwrap();
    assert_eq!(table.kind, StockIssueKind::OutOfStock);
    let rug = issues.iter().find(|i| i.product_id == RUG).unwrap();
    assert_eq!(rug.kind, StockIssueKind::Insufficient);
    assert_eq!(rug.available, 2);

    let message = err.to_string();
    assert!(message.contains("Teak side table"));
    assert!(message.contains("Wool rug"));
    assert_eq!(market.ui.opened.load(Ordering::SeqCst), 0);
    assert_eq!(market.ledger.stock_of(LAMP), Some(10));
}

#[tokio::test]
async fn checkout_requires_customer_and_items() {
    let market = MarketBuilder::new().build();
    let anonymous = market
        .checkout
        .initialize(None, "ama@example.com", vec![line(LAMP, 1)], "Greater Accra")
        .await;
    assert!(matches!(anonymous, Err(CheckoutError::Unauthenticated)));

    let empty = market
        .checkout
        .initialize(Some(501), "ama@example.com", Vec::new(), "Greater Accra")
        .await;
    assert!(matches!(empty, Err(CheckoutError::EmptyCart)));
}

#[tokio::test]
async fn completed_session_cannot_be_replayed() {
    let market = MarketBuilder::new().build();
    let mut session = market
        .checkout
        .initialize(Some(501), "ama@example.com", vec![line(LAMP, 1)], "Greater Accra")
        .await
        .unwrap();
    market
        .checkout
        .checkout(&mut session, PaymentMethod::Card, None)
        .await
        .unwrap();
    assert_eq!(session.state, CheckoutState::Done);

    let replay = market
        .checkout
        .checkout(&mut session, PaymentMethod::Card, None)
        .await;
    assert!(matches!(replay, Err(CheckoutError::InvalidCart(_))));
    assert_eq!(market.ledger.orders().len(), 1);
    assert_eq!(market.ledger.stock_of(LAMP), Some(9));
}

#[tokio::test]
async fn decrement_on_commit_mode_takes_stock_once() {
    let market = MarketBuilder::new()
        .mode(StockHoldMode::DecrementOnCommit)
        .build();
    pay(&market, vec![line(TABLE, 3)], PaymentMethod::Card)
        .await
        .unwrap();

    assert_eq!(market.ledger.stock_of(TABLE), Some(1));
    assert!(market.ledger.reservations().is_empty());
}

/// Concurrent single-lamp cash orders; returns their order numbers
async fn cod_orders(market: &Arc<Market>, count: usize) -> Vec<String> {
    let handles = (0..count).map(|_| {
        let market = market.clone();
        tokio::spawn(async move {
            pay(&market, vec![line(LAMP, 1)], PaymentMethod::CashOnDelivery)
                .await
                .map(|receipt| receipt.order_number)
        })
    });
    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn order_numbers_unique_across_concurrent_commits() {
    let market = Arc::new(
        MarketBuilder::new()
            .mode(StockHoldMode::DecrementOnCommit)
            .build(),
    );
    market.ledger.put_product(Product {
        id: LAMP,
        name: "Brass lamp".into(),
        seller_id: 3,
        price: dec!(45.50),
        stock_quantity: 1000,
    });

    // Half from the server sequence, half from the local fallback
    let mut numbers = cod_orders(&market, 500).await;
    market.ledger.set_sequence_enabled(false);
    numbers.extend(cod_orders(&market, 500).await);

    let unique: HashSet<&String> = numbers.iter().collect();
    assert_eq!(unique.len(), 1000);
    assert_eq!(market.ledger.stock_of(LAMP), Some(0));
}

#[tokio::test]
async fn cancellation_releases_stock_once() {
    let market = MarketBuilder::new().build();
    let receipt = pay(
        &market,
        vec![line(TABLE, 2), line(LAMP, 4)],
        PaymentMethod::CashOnDelivery,
    )
    .await
    .unwrap();
    assert_eq!(market.ledger.stock_of(TABLE), Some(2));
    assert_eq!(market.ledger.stock_of(LAMP), Some(6));

    let cancelled = market
        .stock
        .cancel_order(receipt.order_id, "customer_request")
        .await
        .unwrap();
    assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("customer_request"));
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(market.ledger.stock_of(TABLE), Some(4));
    assert_eq!(market.ledger.stock_of(LAMP), Some(10));

    let again = market
        .stock
        .cancel_order(receipt.order_id, "customer_request")
        .await;
    assert!(matches!(again, Err(StockError::OrderAlreadyCancelled(id)) if id == receipt.order_id));
    assert_eq!(market.ledger.stock_of(TABLE), Some(4));
}

#[tokio::test]
async fn shipped_and_unknown_orders_cannot_be_cancelled() {
    let market = MarketBuilder::new().build();
    let shipped = market
        .ledger
        .insert_order(&NewOrder {
            order_number: "ORD-000900".into(),
            customer_id: 501,
            seller_id: Some(3),
            totals: OrderTotals {
                subtotal: dec!(45.50),
                shipping_fee: dec!(20.00),
                tax: dec!(11.46),
                total_amount: dec!(76.96),
            },
            shipping_region: "Greater Accra".into(),
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Paid,
            order_status: OrderStatus::Shipped,
            payment_reference: Some("MKT-shipped".into()),
            needs_review: false,
            created_at: now_millis(),
        })
        .await
        .unwrap();

    let err = market
        .stock
        .cancel_order(shipped.id, "customer_request")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StockError::OrderNotCancellable {
            status: OrderStatus::Shipped,
            ..
        }
    ));

    let missing = market.stock.cancel_order(987_654, "customer_request").await;
    assert!(matches!(missing, Err(StockError::OrderNotFound(987_654))));
}

#[tokio::test]
async fn partial_commit_returns_stock_and_is_voided_later() {
    let market = MarketBuilder::new().build();
    market.ledger.fail_order_item_inserts(true);

    let err = pay(&market, vec![line(TABLE, 1)], PaymentMethod::Card)
        .await
        .unwrap_err();
    let CheckoutError::PartialCommit { order_id } = err else {
        panic!("expected partial commit, got {err:?}");
    };
    assert_eq!(market.ledger.stock_of(TABLE), Some(4));

    let header = market.ledger.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(header.payment_status, PaymentStatus::Paid);
    assert!(market.ledger.find_order_items(order_id).await.unwrap().is_empty());

    // Within the grace period the header is left alone
    let ledger: SharedLedger = market.ledger.clone();
    let patient = OrderReconciler::new(ledger.clone(), Duration::from_secs(3600));
    assert_eq!(patient.reconcile_once().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let reconciler = OrderReconciler::new(ledger, Duration::ZERO);
    assert_eq!(reconciler.reconcile_once().await.unwrap(), 1);
    assert_eq!(reconciler.reconcile_once().await.unwrap(), 0);

    let voided = market.ledger.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(voided.order_status, OrderStatus::Cancelled);
    assert_eq!(voided.cancellation_reason.as_deref(), Some(PARTIAL_COMMIT_REASON));
    // Voiding never touches stock
    assert_eq!(market.ledger.stock_of(TABLE), Some(4));
}
