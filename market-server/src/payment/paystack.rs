//! Paystack integration via REST API (no SDK dependency)

use super::error::{PaymentError, PaymentResult};
use super::PaymentRequest;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::Sha512;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of `POST /transaction/initialize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Result of `GET /transaction/verify/:reference`
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTransaction {
    pub reference: String,
    pub status: String,
    /// Amount in minor units (pesewas / kobo)
    pub amount_minor: i64,
    pub currency: Option<String>,
    pub gateway_response: Option<String>,
    pub raw: serde_json::Value,
}

impl ProviderTransaction {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Clone)]
pub struct PaystackClient {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl PaystackClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            secret_key: secret_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Initialize a hosted transaction
    pub async fn initialize_transaction(
        &self,
        request: &PaymentRequest,
        callback_url: &str,
    ) -> PaymentResult<InitializedTransaction> {
        let body = serde_json::json!({
            "email": request.email,
            "amount": to_minor_units(request.amount),
            "reference": request.reference,
            "channels": request.channels,
            "callback_url": callback_url,
            "metadata": request.metadata,
        });

        let resp: serde_json::Value = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?
            .json()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        if resp["status"].as_bool() != Some(true) {
            return Err(PaymentError::Provider(format!(
                "Paystack initialize failed: {}",
                resp["message"].as_str().unwrap_or("unknown error")
            )));
        }

        let data = &resp["data"];
        match (
            data["authorization_url"].as_str(),
            data["access_code"].as_str(),
        ) {
            (Some(url), Some(code)) => Ok(InitializedTransaction {
                authorization_url: url.to_string(),
                access_code: code.to_string(),
                reference: data["reference"]
                    .as_str()
                    .unwrap_or(&request.reference)
                    .to_string(),
            }),
            _ => Err(PaymentError::Provider(format!(
                "Paystack initialize returned no authorization url: {resp}"
            ))),
        }
    }

    /// Look a transaction up by reference
    ///
    /// Transport failures and 5xx answers are `VerifierUnavailable`; an
    /// answer the provider gives about the transaction is returned as-is.
    pub async fn verify_transaction(&self, reference: &str) -> PaymentResult<ProviderTransaction> {
        let resp = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| PaymentError::VerifierUnavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(PaymentError::VerifierUnavailable(format!(
                "Paystack returned {status}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::VerifierUnavailable(e.to_string()))?;

        if body["status"].as_bool() != Some(true) {
            return Err(PaymentError::VerificationFailed {
                reference: reference.to_string(),
                reason: body["message"]
                    .as_str()
                    .unwrap_or("transaction not found")
                    .to_string(),
            });
        }

        parse_transaction(reference, body)
    }
}

fn parse_transaction(reference: &str, body: serde_json::Value) -> PaymentResult<ProviderTransaction> {
    let data = &body["data"];
    let amount_minor = data["amount"].as_i64().ok_or_else(|| {
        PaymentError::Provider(format!("Paystack verify returned no amount for {reference}"))
    })?;
    Ok(ProviderTransaction {
        reference: data["reference"].as_str().unwrap_or(reference).to_string(),
        status: data["status"].as_str().unwrap_or("unknown").to_string(),
        amount_minor,
        currency: data["currency"].as_str().map(String::from),
        gateway_response: data["gateway_response"].as_str().map(String::from),
        raw: body.clone(),
    })
}

/// Major units to provider minor units (×100, half-up)
pub fn to_minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Verify a Paystack webhook signature (`x-paystack-signature`, HMAC-SHA512 hex)
pub fn verify_webhook_signature(
    payload: &[u8],
    signature: &str,
    secret: &str,
) -> Result<(), &'static str> {
    if signature.is_empty() {
        return Err("Missing x-paystack-signature header");
    }
    let mut mac =
        Hmac::<Sha512>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(payload);

    // Constant-time comparison via hmac::verify_slice
    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")?;
    Ok(())
}
