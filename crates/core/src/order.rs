//! Customer-facing order numbers.

use chrono::{DateTime, Utc};

use crate::types::OrderId;

/// Prefix on every order number.
pub const ORDER_NUMBER_PREFIX: &str = "NS";

/// Format the order number printed on receipts and packing slips.
///
/// `NS-<yyyymmdd>-<id, zero padded to 6>`; ids wider than six digits are
/// printed in full.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use nestling_core::{OrderId, order::order_number};
///
/// let placed = Utc.with_ymd_and_hms(2026, 3, 9, 15, 0, 0).unwrap();
/// assert_eq!(order_number(OrderId::new(42), placed), "NS-20260309-000042");
/// ```
#[must_use]
pub fn order_number(id: OrderId, placed_at: DateTime<Utc>) -> String {
    format!(
        "{ORDER_NUMBER_PREFIX}-{}-{:06}",
        placed_at.format("%Y%m%d"),
        id.as_i32()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_wide_ids_are_not_truncated() {
        let placed = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(
            order_number(OrderId::new(1_234_567), placed),
            "NS-20261231-1234567"
        );
    }
}
