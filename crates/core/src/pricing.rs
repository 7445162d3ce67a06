//! Order totals.
//!
//! The same quote is shown in the cart, frozen onto the checkout session and
//! copied onto the order, so there is exactly one place that decides what
//! shipping and tax cost.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{CurrencyCode, Money, MoneyError};

/// Store-wide pricing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    /// Currency every price is charged in.
    pub currency: CurrencyCode,
    /// Flat shipping fee for orders below the threshold.
    pub flat_shipping: Decimal,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Sales tax rate applied to the subtotal (e.g. `0.0725`).
    pub tax_rate: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::Usd,
            flat_shipping: Decimal::new(795, 2),
            free_shipping_threshold: Decimal::new(7500, 2),
            tax_rate: Decimal::ZERO,
        }
    }
}

/// A unit price and quantity to be priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    /// Price of one unit.
    pub unit_price: Decimal,
    /// Number of units.
    pub quantity: u32,
}

/// The four numbers shown at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    /// Sum of line totals.
    pub subtotal: Money,
    /// Shipping fee.
    pub shipping: Money,
    /// Tax on the subtotal.
    pub tax: Money,
    /// Amount charged.
    pub total: Money,
}

impl OrderTotals {
    /// Totals of an empty cart.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            subtotal: Money::zero(currency),
            shipping: Money::zero(currency),
            tax: Money::zero(currency),
            total: Money::zero(currency),
        }
    }
}

/// Price a set of lines.
///
/// Shipping is free for an empty cart and for subtotals at or above
/// [`PricingRules::free_shipping_threshold`]. Tax is charged on the subtotal
/// only and rounded half-even to cents.
///
/// # Errors
///
/// Returns [`MoneyError::Overflow`] on decimal overflow.
///
/// ```
/// use rust_decimal::Decimal;
/// use nestling_core::{PricedLine, PricingRules, pricing::quote};
///
/// let rules = PricingRules::default();
/// let lines = [PricedLine { unit_price: Decimal::new(2499, 2), quantity: 2 }];
/// let totals = quote(&lines, &rules).unwrap();
/// assert_eq!(totals.subtotal.display(), "$49.98");
/// assert_eq!(totals.shipping.display(), "$7.95");
/// assert_eq!(totals.total.display(), "$57.93");
/// ```
pub fn quote(lines: &[PricedLine], rules: &PricingRules) -> Result<OrderTotals, MoneyError> {
    let currency = rules.currency;
    let mut subtotal = Money::zero(currency);
    for line in lines {
        let line_total = Money::new(line.unit_price, currency).times(line.quantity)?;
        subtotal = subtotal.checked_add(line_total)?;
    }

    if lines.iter().all(|line| line.quantity == 0) {
        return Ok(OrderTotals::zero(currency));
    }

    let shipping = if subtotal.amount >= rules.free_shipping_threshold {
        Money::zero(currency)
    } else {
        Money::new(rules.flat_shipping, currency)
    };

    let tax_amount = subtotal
        .amount
        .checked_mul(rules.tax_rate)
        .ok_or(MoneyError::Overflow)?;
    let tax = Money::new(tax_amount, currency);

    let total = subtotal.checked_add(shipping)?.checked_add(tax)?;

    Ok(OrderTotals {
        subtotal,
        shipping,
        tax,
        total,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(price: &str, quantity: u32) -> PricedLine {
        PricedLine {
            unit_price: dec(price),
            quantity,
        }
    }

    #[test]
    fn test_empty_cart_is_free() {
        let totals = quote(&[], &PricingRules::default()).unwrap();
        assert!(totals.total.is_zero());
        assert!(totals.shipping.is_zero());
    }

    #[test]
    fn test_free_shipping_at_threshold() {
        let rules = PricingRules::default();
        let totals = quote(&[line("25.00", 3)], &rules).unwrap();
        assert_eq!(totals.subtotal.amount, dec("75.00"));
        assert!(totals.shipping.is_zero());

        let totals = quote(&[line("74.99", 1)], &rules).unwrap();
        assert_eq!(totals.shipping.amount, dec("7.95"));
    }

    #[test]
    fn test_tax_rounds_half_even_on_subtotal() {
        let rules = PricingRules {
            tax_rate: dec("0.0725"),
            ..PricingRules::default()
        };
        // 19.99 * 0.0725 = 1.449275 -> 1.45
        let totals = quote(&[line("19.99", 1)], &rules).unwrap();
        assert_eq!(totals.tax.amount, dec("1.45"));
        assert_eq!(totals.total.amount, dec("29.39"));
    }

    #[test]
    fn test_multiple_lines() {
        let totals = quote(&[line("12.00", 2), line("9.50", 1)], &PricingRules::default()).unwrap();
        assert_eq!(totals.subtotal.amount, dec("33.50"));
        assert_eq!(totals.total.amount, dec("41.45"));
    }
}
