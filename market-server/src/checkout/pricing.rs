//! Checkout pricing using rust_decimal for precision
//!
//! `vat = (subtotal + shipping) × 17.5%`, rounded to 2 places (half-up).
//! The rule is fixed and does not vary by region; only shipping does.

use crate::orders::PricedLine;
use rust_decimal::{Decimal, RoundingStrategy};
use shared::models::OrderTotals;
use std::collections::HashMap;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// VAT rate (17.5%)
pub const VAT_RATE: Decimal = Decimal::from_parts(175, 0, 0, false, 3);

#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

pub fn calculate_subtotal(lines: &[PricedLine]) -> Decimal {
    round_money(lines.iter().map(PricedLine::subtotal).sum())
}

pub fn calculate_totals(lines: &[PricedLine], shipping_fee: Decimal) -> OrderTotals {
    let subtotal = calculate_subtotal(lines);
    let shipping_fee = round_money(shipping_fee);
    let tax = round_money((subtotal + shipping_fee) * VAT_RATE);
    OrderTotals {
        subtotal,
        shipping_fee,
        tax,
        total_amount: subtotal + shipping_fee + tax,
    }
}

/// Shipping fee per delivery region, with a fallback for unknown regions
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingRates {
    rates: HashMap<String, Decimal>,
    default_fee: Decimal,
}

impl ShippingRates {
    pub fn new(default_fee: Decimal) -> Self {
        Self {
            rates: HashMap::new(),
            default_fee,
        }
    }

    pub fn with_rate(mut self, region: &str, fee: Decimal) -> Self {
        self.rates.insert(normalize(region), fee);
        self
    }

    /// Parse `Region=fee;Region=fee`
    pub fn parse(raw: &str, default_fee: Decimal) -> Result<Self, String> {
        let mut rates = Self::new(default_fee);
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (region, fee) = entry
                .split_once('=')
                .ok_or_else(|| format!("invalid shipping rate entry '{entry}', expected Region=fee"))?;
            let fee: Decimal = fee
                .trim()
                .parse()
                .map_err(|_| format!("invalid shipping fee for region '{}'", region.trim()))?;
            if fee.is_sign_negative() {
                return Err(format!("negative shipping fee for region '{}'", region.trim()));
            }
            rates = rates.with_rate(region, fee);
        }
        Ok(rates)
    }

    pub fn fee_for(&self, region: &str) -> Decimal {
        self.rates
            .get(&normalize(region))
            .copied()
            .unwrap_or(self.default_fee)
    }

    pub fn default_fee(&self) -> Decimal {
        self.default_fee
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

fn normalize(region: &str) -> String {
    region.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal) -> PricedLine {
        PricedLine {
            product_id: 1,
            name: "Item".into(),
            seller_id: 1,
            quantity,
            unit_price,
        }
    }

    #[test]
    fn test_vat_on_subtotal_plus_shipping() {
        let totals = calculate_totals(&[line(2, dec!(50.00))], dec!(20.00));
        assert_eq!(totals.subtotal, dec!(100.00));
        assert_eq!(totals.shipping_fee, dec!(20.00));
        assert_eq!(totals.tax, dec!(21.00));
        assert_eq!(totals.total_amount, dec!(141.00));
    }

    #[test]
    fn test_vat_independent_of_region() {
        let rates = ShippingRates::new(dec!(20))
            .with_rate("Greater Accra", dec!(20))
            .with_rate("Northern", dec!(20));
        for region in ["Greater Accra", "Northern", "Unknown"] {
            let totals = calculate_totals(&[line(1, dec!(100))], rates.fee_for(region));
            assert_eq!(totals.tax, dec!(21.00));
            assert_eq!(totals.total_amount, dec!(141.00));
        }
    }

    #[test]
    fn test_rounding_half_up() {
        // (0.10 + 0) * 0.175 = 0.0175 -> 0.02
        let totals = calculate_totals(&[line(1, dec!(0.10))], Decimal::ZERO);
        assert_eq!(totals.tax, dec!(0.02));
    }

    #[test]
    fn test_many_small_items_no_drift() {
        let lines: Vec<PricedLine> = (0..1000).map(|_| line(1, dec!(0.01))).collect();
        assert_eq!(calculate_subtotal(&lines), dec!(10.00));
    }

    #[test]
    fn test_parse_rates() {
        let rates = ShippingRates::parse("Greater Accra=15.00; Ashanti=25 ;", dec!(30)).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates.fee_for("greater accra"), dec!(15.00));
        assert_eq!(rates.fee_for("Ashanti"), dec!(25));
        assert_eq!(rates.fee_for("Volta"), dec!(30));
    }

    #[test]
    fn test_parse_rates_rejects_garbage() {
        assert!(ShippingRates::parse("Accra", dec!(1)).is_err());
        assert!(ShippingRates::parse("Accra=abc", dec!(1)).is_err());
        assert!(ShippingRates::parse("Accra=-5", dec!(1)).is_err());
        assert!(ShippingRates::parse("", dec!(1)).unwrap().is_empty());
    }
}
