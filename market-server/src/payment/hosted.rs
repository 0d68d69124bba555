//! Hosted payment page
//!
//! Opening the "payment UI" means initializing a provider transaction,
//! handing its authorization URL to the buyer's browser and waiting for the
//! provider to send the buyer back (redirect callback) or for a webhook.
//! Waiters are parked in a [`CallbackRegistry`] keyed by payment reference.

use super::error::{PaymentError, PaymentResult};
use super::paystack::PaystackClient;
use super::{CallbackStatus, PaymentCallback, PaymentRequest, PaymentUi};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// How long a buyer may keep the payment window open
pub const DEFAULT_PAYMENT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: DashMap<String, oneshot::Sender<PaymentCallback>>,
    authorizations: DashMap<String, oneshot::Sender<String>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a waiter for the provider callback of `reference`
    pub fn register(&self, reference: &str) -> oneshot::Receiver<PaymentCallback> {
        let (tx, rx) = oneshot::channel();
        if self.callbacks.insert(reference.to_string(), tx).is_some() {
            tracing::warn!(reference, "Replaced existing payment waiter");
        }
        rx
    }

    /// Deliver a callback; false if nobody is waiting for this reference
    pub fn complete(&self, callback: PaymentCallback) -> bool {
        match self.callbacks.remove(&callback.reference) {
            Some((reference, tx)) => {
                let delivered = tx.send(callback).is_ok();
                if !delivered {
                    tracing::debug!(reference = %reference, "Payment waiter already gone");
                }
                delivered
            }
            None => false,
        }
    }

    /// Drop the waiter; it observes the attempt as cancelled
    pub fn abandon(&self, reference: &str) -> bool {
        self.callbacks.remove(reference).is_some()
    }

    pub fn is_waiting(&self, reference: &str) -> bool {
        self.callbacks.contains_key(reference)
    }

    /// Subscribe to the authorization URL of `reference` once it exists
    pub fn watch_authorization(&self, reference: &str) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.authorizations.insert(reference.to_string(), tx);
        rx
    }

    pub fn announce_authorization(&self, reference: &str, authorization_url: &str) {
        if let Some((_, tx)) = self.authorizations.remove(reference) {
            let _ = tx.send(authorization_url.to_string());
        }
    }

    /// Drop an authorization watch that will never be announced
    pub fn unwatch_authorization(&self, reference: &str) {
        self.authorizations.remove(reference);
    }
}

/// Paystack hosted checkout as a [`PaymentUi`]
pub struct HostedCheckout {
    paystack: PaystackClient,
    registry: Arc<CallbackRegistry>,
    callback_url: String,
    window: Duration,
}

impl HostedCheckout {
    pub fn new(
        paystack: PaystackClient,
        registry: Arc<CallbackRegistry>,
        callback_url: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            paystack,
            registry,
            callback_url: callback_url.into(),
            window,
        }
    }
}

#[async_trait]
impl PaymentUi for HostedCheckout {
    async fn open(&self, request: &PaymentRequest) -> PaymentResult<PaymentCallback> {
        let reference = request.reference.clone();
        let waiter = self.registry.register(&reference);

        let transaction = match self
            .paystack
            .initialize_transaction(request, &self.callback_url)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.registry.abandon(&reference);
                return Err(e);
            }
        };
        tracing::info!(
            reference = %reference,
            access_code = %transaction.access_code,
            "Payment window opened"
        );
        self.registry
            .announce_authorization(&reference, &transaction.authorization_url);

        match tokio::time::timeout(self.window, waiter).await {
            Ok(Ok(callback)) => Ok(callback),
            // Sender dropped: abandoned through the cancel endpoint
            Ok(Err(_)) => Err(PaymentError::Cancelled { reference }),
            Err(_) => {
                self.registry.abandon(&reference);
                tracing::info!(reference = %reference, "Payment window timed out");
                Ok(PaymentCallback {
                    reference,
                    status: CallbackStatus::Cancelled,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_delivers_to_waiter() {
        let registry = CallbackRegistry::new();
        let rx = registry.register("REF-1");
        assert!(registry.is_waiting("REF-1"));

        assert!(registry.complete(PaymentCallback {
            reference: "REF-1".into(),
            status: CallbackStatus::Success,
        }));
        assert_eq!(rx.await.unwrap().status, CallbackStatus::Success);
        assert!(!registry.is_waiting("REF-1"));
    }

    #[tokio::test]
    async fn test_abandon_drops_sender() {
        let registry = CallbackRegistry::new();
        let rx = registry.register("REF-2");
        assert!(registry.abandon("REF-2"));
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_complete_unknown_reference() {
        let registry = CallbackRegistry::new();
        assert!(!registry.complete(PaymentCallback {
            reference: "nope".into(),
            status: CallbackStatus::Cancelled,
        }));
    }

    #[tokio::test]
    async fn test_authorization_announcement() {
        let registry = CallbackRegistry::new();
        let rx = registry.watch_authorization("REF-3");
        registry.announce_authorization("REF-3", "https://checkout.example/abc");
        assert_eq!(rx.await.unwrap(), "https://checkout.example/abc");
    }
}
