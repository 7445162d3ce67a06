//! Decimal money amounts.
//!
//! Amounts are stored in major units (`12.50`), never floats. Stripe and the
//! analytics endpoint want minor units, so [`Money::to_cents`] and
//! [`Money::from_cents`] convert at the integration boundary only.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors from money arithmetic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Two amounts in different currencies were combined.
    #[error("currency mismatch: {0} vs {1}")]
    CurrencyMismatch(CurrencyCode, CurrencyCode),
    /// The amount does not fit in minor units.
    #[error("amount out of range")]
    Overflow,
}

/// An amount of money in a single currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount, rounded to two decimal places.
    #[must_use]
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self {
            amount: round_2dp(amount),
            currency,
        }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Build an amount from minor units (cents).
    #[must_use]
    pub fn from_cents(cents: i64, currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(cents, 2),
            currency,
        }
    }

    /// Amount in minor units, rounded half-even.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the amount does not fit in an `i64`.
    pub fn to_cents(&self) -> Result<i64, MoneyError> {
        let cents = round_2dp(self.amount) * Decimal::ONE_HUNDRED;
        i64::try_from(cents).map_err(|_| MoneyError::Overflow)
    }

    /// Add two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] when the currencies differ.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(self.currency, other.currency));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Multiply a unit price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] on decimal overflow.
    pub fn times(self, quantity: u32) -> Result<Self, MoneyError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Whether the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Format for display, e.g. `$12.50`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency.symbol(), self.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

fn round_2dp(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// ISO 4217 currency codes the store can charge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    #[default]
    Usd,
    Cad,
    Eur,
    Gbp,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Usd | Self::Cad => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
        }
    }

    /// Upper-case ISO code, as stored in the database.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Cad => "CAD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
        }
    }

    /// Lower-case code, as Stripe expects it.
    #[must_use]
    pub const fn stripe_code(self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Cad => "cad",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "CAD" => Ok(Self::Cad),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for CurrencyCode {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CurrencyCode {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        s.trim().parse::<Self>().map_err(Into::into)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for CurrencyCode {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.code(), buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn usd(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap(), CurrencyCode::Usd)
    }

    #[test]
    fn test_cents_conversion() {
        assert_eq!(usd("12.50").to_cents().unwrap(), 1250);
        assert_eq!(Money::from_cents(1999, CurrencyCode::Usd), usd("19.99"));
        // Half-even rounding on the way in
        assert_eq!(usd("0.125").to_cents().unwrap(), 12);
        assert_eq!(usd("0.135").to_cents().unwrap(), 14);
    }

    #[test]
    fn test_checked_add_rejects_mixed_currency() {
        let cad = Money::new(Decimal::ONE, CurrencyCode::Cad);
        assert_eq!(
            usd("1.00").checked_add(cad),
            Err(MoneyError::CurrencyMismatch(CurrencyCode::Usd, CurrencyCode::Cad))
        );
        assert_eq!(usd("1.25").checked_add(usd("2.50")).unwrap(), usd("3.75"));
    }

    #[test]
    fn test_times() {
        assert_eq!(usd("24.99").times(3).unwrap(), usd("74.97"));
        assert!(usd("5.00").times(0).unwrap().is_zero());
    }

    #[test]
    fn test_display() {
        assert_eq!(usd("7.5").display(), "$7.50");
        assert_eq!(
            Money::from_cents(1000, CurrencyCode::Gbp).to_string(),
            "£10.00"
        );
    }

    #[test]
    fn test_currency_serde_and_parse() {
        assert_eq!(serde_json::to_string(&CurrencyCode::Usd).unwrap(), "\"USD\"");
        assert_eq!(CurrencyCode::from_str("cad").unwrap(), CurrencyCode::Cad);
        assert!(CurrencyCode::from_str("JPY").is_err());
    }
}
