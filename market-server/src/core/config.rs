//! Market server configuration

use crate::checkout::{ShippingRates, VerificationFallback};
use crate::payment::reference::DEFAULT_PREFIX;
use crate::stock::{StockHoldMode, StockSettings};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Market server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; unset runs on the in-memory ledger (development only)
    pub database_url: Option<String>,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    pub log_level: String,
    /// Directory for rotating file logs (console only when unset)
    pub log_dir: Option<String>,
    /// Reservation hold duration (default 15 minutes)
    pub reservation_hold_secs: u64,
    /// Conditional update attempts per reservation
    pub reserve_max_attempts: u32,
    pub sweep_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    /// Age after which a header without lines is considered abandoned
    pub partial_commit_grace_secs: u64,
    pub shipping_rates: ShippingRates,
    /// Where the storefront asks for payment verification
    pub payment_verify_url: String,
    /// Bearer token for the verification endpoint (checked by it, sent by the client)
    pub payment_verify_token: String,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    /// Bearer token for operator routes (manual sweep)
    pub operator_token: String,
    /// Where the provider sends the buyer back after paying
    pub payment_callback_url: String,
    pub payment_reference_prefix: String,
    /// How long the buyer may keep the payment window open
    pub payment_window_secs: u64,
    /// Uncollected checkout outcomes are dropped after this long
    pub checkout_outcome_ttl_secs: u64,
    pub verification_fallback: VerificationFallback,
    pub stock_hold_mode: StockHoldMode,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BoxError> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".into());
        let is_dev = environment == "development";

        let database_url = var("DATABASE_URL");
        if database_url.is_none() && !is_dev {
            return Err(format!("DATABASE_URL must be set in {environment} environment").into());
        }

        let http_port: u16 = parse_or(&var, "HTTP_PORT", 8080)?;
        let default_fee: Decimal = parse_or(&var, "DEFAULT_SHIPPING_FEE", Decimal::new(2000, 2))?;
        let shipping_rates = ShippingRates::parse(
            &var("SHIPPING_RATES").unwrap_or_default(),
            default_fee,
        )?;

        let require_secret = |name: &str| -> Result<String, BoxError> {
            match var(name) {
                Some(v) => Ok(v),
                None if is_dev => Ok(format!("dev-{name}-not-for-production")),
                None => Err(format!("{name} must be set in {environment} environment").into()),
            }
        };

        let config = Self {
            database_url,
            http_port,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_dir: var("LOG_DIR"),
            reservation_hold_secs: parse_or(&var, "RESERVATION_HOLD_SECS", 900)?,
            reserve_max_attempts: parse_or(&var, "RESERVE_MAX_ATTEMPTS", 3)?,
            sweep_interval_secs: parse_or(&var, "SWEEP_INTERVAL_SECS", 60)?,
            reconcile_interval_secs: parse_or(&var, "RECONCILE_INTERVAL_SECS", 300)?,
            partial_commit_grace_secs: parse_or(&var, "PARTIAL_COMMIT_GRACE_SECS", 300)?,
            shipping_rates,
            payment_verify_url: var("PAYMENT_VERIFY_URL")
                .unwrap_or_else(|| format!("http://127.0.0.1:{http_port}/api/payments/verify")),
            payment_verify_token: require_secret("PAYMENT_VERIFY_TOKEN")?,
            paystack_secret_key: require_secret("PAYSTACK_SECRET_KEY")?,
            operator_token: require_secret("OPERATOR_TOKEN")?,
            paystack_base_url: var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|| crate::payment::paystack::DEFAULT_BASE_URL.into()),
            payment_callback_url: var("PAYMENT_CALLBACK_URL")
                .unwrap_or_else(|| format!("http://127.0.0.1:{http_port}/api/payments/callback")),
            payment_reference_prefix: var("PAYMENT_REFERENCE_PREFIX")
                .unwrap_or_else(|| DEFAULT_PREFIX.into()),
            payment_window_secs: parse_or(&var, "PAYMENT_WINDOW_SECS", 900)?,
            checkout_outcome_ttl_secs: parse_or(&var, "CHECKOUT_OUTCOME_TTL_SECS", 3600)?,
            verification_fallback: parse_or(&var, "VERIFICATION_FALLBACK", VerificationFallback::Block)?,
            stock_hold_mode: parse_or(&var, "STOCK_HOLD_MODE", StockHoldMode::Reserve)?,
            environment,
        };

        if config.reserve_max_attempts == 0 {
            return Err("RESERVE_MAX_ATTEMPTS must be at least 1".into());
        }
        if config.reservation_hold_secs == 0 {
            return Err("RESERVATION_HOLD_SECS must be positive".into());
        }
        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn stock_settings(&self) -> StockSettings {
        StockSettings {
            hold_millis: i64::try_from(self.reservation_hold_secs.saturating_mul(1000))
                .unwrap_or(i64::MAX),
            max_attempts: self.reserve_max_attempts,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    pub fn partial_commit_grace(&self) -> Duration {
        Duration::from_secs(self.partial_commit_grace_secs)
    }

    pub fn payment_window(&self) -> Duration {
        Duration::from_secs(self.payment_window_secs.max(1))
    }

    pub fn checkout_outcome_ttl(&self) -> Duration {
        Duration::from_secs(self.checkout_outcome_ttl_secs.max(1))
    }
}

/// Parse a variable if present; a present but malformed value is an error
fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, BoxError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {name} '{raw}': {e}").into()),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, BoxError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_development_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.is_development());
        assert!(config.database_url.is_none());
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.reservation_hold_secs, 900);
        assert_eq!(config.reserve_max_attempts, 3);
        assert_eq!(config.verification_fallback, VerificationFallback::Block);
        assert_eq!(config.stock_hold_mode, StockHoldMode::Reserve);
        assert_eq!(config.stock_settings().hold_millis, 15 * 60 * 1000);
        assert_eq!(config.checkout_outcome_ttl(), Duration::from_secs(3600));
        assert!(config.paystack_secret_key.starts_with("dev-"));
    }

    #[test]
    fn test_production_requires_secrets() {
        let err = load(&[
            ("ENVIRONMENT", "production"),
            ("DATABASE_URL", "postgres://localhost/market"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("PAYMENT_VERIFY_TOKEN"));

        assert!(load(&[("ENVIRONMENT", "production")]).is_err());

        let config = load(&[
            ("ENVIRONMENT", "production"),
            ("DATABASE_URL", "postgres://localhost/market"),
            ("PAYMENT_VERIFY_TOKEN", "token"),
            ("PAYSTACK_SECRET_KEY", "sk_live_x"),
            ("OPERATOR_TOKEN", "ops"),
        ])
        .unwrap();
        assert!(!config.is_development());
    }

    #[test]
    fn test_parses_policies_and_rates() {
        let config = load(&[
            ("VERIFICATION_FALLBACK", "provisional"),
            ("STOCK_HOLD_MODE", "commit"),
            ("SHIPPING_RATES", "Greater Accra=15;Northern=40"),
            ("DEFAULT_SHIPPING_FEE", "25.50"),
        ])
        .unwrap();
        assert_eq!(config.verification_fallback, VerificationFallback::Provisional);
        assert_eq!(config.stock_hold_mode, StockHoldMode::DecrementOnCommit);
        assert_eq!(config.shipping_rates.fee_for("Northern"), Decimal::new(40, 0));
        assert_eq!(config.shipping_rates.fee_for("Volta"), Decimal::new(2550, 2));
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(load(&[("HTTP_PORT", "eighty")]).is_err());
        assert!(load(&[("VERIFICATION_FALLBACK", "maybe")]).is_err());
        assert!(load(&[("RESERVE_MAX_ATTEMPTS", "0")]).is_err());
    }
}
