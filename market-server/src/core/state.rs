//! Server state shared by every handler

use crate::checkout::CheckoutOrchestrator;
use crate::core::Config;
use crate::core::outcomes::CheckoutOutcomes;
use crate::ledger::{MemoryLedger, PgLedger, SharedLedger};
use crate::orders::{OrderCommitter, OrderReconciler};
use crate::payment::{
    CallbackRegistry, HostedCheckout, HttpPaymentVerifier, PaymentGatewayAdapter, PaymentVerifier,
    PaystackClient, PaystackVerifier,
};
use crate::stock::StockReservationManager;
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub ledger: SharedLedger,
    pub stock: Arc<StockReservationManager>,
    pub committer: Arc<OrderCommitter>,
    pub checkout: Arc<CheckoutOrchestrator>,
    /// Buyers waiting on the hosted payment page, keyed by reference
    pub payment_callbacks: Arc<CallbackRegistry>,
    /// Backs the server-side verification endpoint
    pub verifier: Arc<dyn PaymentVerifier>,
    /// Outcome of each checkout attempt, keyed by payment reference
    pub checkouts: Arc<CheckoutOutcomes>,
}

impl ServerState {
    /// Connect to the configured ledger and build the state
    ///
    /// Without `DATABASE_URL` (development only) an empty in-memory ledger is used.
    pub async fn initialize(config: &Config) -> Result<Self, BoxError> {
        let ledger: SharedLedger = match &config.database_url {
            Some(url) => {
                let ledger = PgLedger::connect(url).await?;
                tracing::info!("Connected to PostgreSQL ledger");
                Arc::new(ledger)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory ledger");
                Arc::new(MemoryLedger::new())
            }
        };
        Ok(Self::with_ledger(config, ledger))
    }

    /// Build the state around an existing ledger
    pub fn with_ledger(config: &Config, ledger: SharedLedger) -> Self {
        let paystack =
            PaystackClient::with_base_url(&config.paystack_secret_key, &config.paystack_base_url);
        let payment_callbacks = Arc::new(CallbackRegistry::new());

        let ui = Arc::new(HostedCheckout::new(
            paystack.clone(),
            payment_callbacks.clone(),
            &config.payment_callback_url,
            config.payment_window(),
        ));
        let client_verifier = Arc::new(HttpPaymentVerifier::new(
            &config.payment_verify_url,
            &config.payment_verify_token,
        ));
        let payments = Arc::new(PaymentGatewayAdapter::new(
            ui,
            client_verifier,
            &config.payment_reference_prefix,
        ));

        let stock = Arc::new(StockReservationManager::new(
            ledger.clone(),
            config.stock_settings(),
        ));
        let committer = Arc::new(OrderCommitter::new(stock.clone(), config.stock_hold_mode));
        let checkout = Arc::new(CheckoutOrchestrator::new(
            stock.clone(),
            committer.clone(),
            payments,
            config.shipping_rates.clone(),
            config.verification_fallback,
        ));

        Self {
            config: Arc::new(config.clone()),
            ledger,
            stock,
            committer,
            checkout,
            payment_callbacks,
            verifier: Arc::new(PaystackVerifier::new(paystack)),
            checkouts: Arc::new(CheckoutOutcomes::new()),
        }
    }

    pub fn reconciler(&self) -> OrderReconciler {
        OrderReconciler::new(self.ledger.clone(), self.config.partial_commit_grace())
    }
}
