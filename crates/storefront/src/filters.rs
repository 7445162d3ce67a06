//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use rust_decimal::{Decimal, RoundingStrategy};

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Content hash of the static assets, appended to asset URLs.
///
/// Usage in templates: `/static/css/main.css?v={{ ""|static_version }}`
#[askama::filter_fn]
pub fn static_version(
    _value: impl Display,
    _env: &dyn askama::Values,
) -> askama::Result<&'static str> {
    Ok(env!("STATIC_VERSION"))
}

/// Formats an amount with two decimal places.
///
/// Non-numeric input is passed through unchanged.
///
/// Usage in templates: `{{ currency.symbol() }}{{ order.total|money }}`
#[askama::filter_fn]
pub fn money(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format_amount(&value.to_string()))
}

fn format_amount(raw: &str) -> String {
    raw.parse::<Decimal>().map_or_else(
        |_| raw.to_string(),
        |amount| {
            let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            format!("{rounded:.2}")
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount("7.95"), "7.95");
        assert_eq!(format_amount("75"), "75.00");
        assert_eq!(format_amount("19.999"), "20.00");
        assert_eq!(format_amount("n/a"), "n/a");
    }
}
