//! Stock levels and reservations.
//!
//! A variant's stock is `quantity` units on hand, of which `reserved` are held
//! by open checkout sessions. `available` is always `quantity - reserved`.
//! The storefront mirrors each operation here with a single conditional
//! `UPDATE` in `db::inventory`; this type is the reference for that SQL and
//! is what the tests exercise.
//!
//! ```
//! use nestling_core::InventoryLevel;
//!
//! let mut level = InventoryLevel::new(10, 0).unwrap();
//! level.reserve(3).unwrap();      // checkout session opened
//! assert_eq!(level.available(), 7);
//! level.commit(3).unwrap();       // payment confirmed
//! assert_eq!((level.quantity(), level.reserved(), level.available()), (7, 0, 7));
//! ```

use serde::Serialize;

/// Errors from stock arithmetic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Quantity was zero or negative.
    #[error("quantity must be positive (got {0})")]
    InvalidQuantity(i32),
    /// Not enough unreserved stock.
    #[error("insufficient stock: requested {requested}, available {available}")]
    Insufficient {
        /// Units requested.
        requested: i32,
        /// Units available.
        available: i32,
    },
    /// Releasing or committing more than is reserved.
    #[error("reservation underflow: {requested} requested, {reserved} reserved")]
    ReservationUnderflow {
        /// Units requested.
        requested: i32,
        /// Units currently reserved.
        reserved: i32,
    },
    /// An adjustment would leave on-hand stock below what is reserved.
    #[error("adjustment would leave {quantity} on hand with {reserved} reserved")]
    BelowReserved {
        /// Resulting on-hand quantity.
        quantity: i32,
        /// Units currently reserved.
        reserved: i32,
    },
}

/// On-hand and reserved stock for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InventoryLevel {
    quantity: i32,
    reserved: i32,
}

impl InventoryLevel {
    /// Create a level from stored values.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::BelowReserved`] if the values are negative or
    /// `reserved > quantity`.
    pub const fn new(quantity: i32, reserved: i32) -> Result<Self, InventoryError> {
        if quantity < 0 || reserved < 0 || reserved > quantity {
            return Err(InventoryError::BelowReserved { quantity, reserved });
        }
        Ok(Self { quantity, reserved })
    }

    /// Units on hand.
    #[must_use]
    pub const fn quantity(&self) -> i32 {
        self.quantity
    }

    /// Units held by open checkout sessions.
    #[must_use]
    pub const fn reserved(&self) -> i32 {
        self.reserved
    }

    /// Units that can still be sold.
    #[must_use]
    pub const fn available(&self) -> i32 {
        self.quantity - self.reserved
    }

    /// Hold `n` units for a checkout session.
    ///
    /// # Errors
    ///
    /// Fails if `n` is not positive or exceeds [`Self::available`].
    pub const fn reserve(&mut self, n: i32) -> Result<(), InventoryError> {
        if n <= 0 {
            return Err(InventoryError::InvalidQuantity(n));
        }
        if n > self.available() {
            return Err(InventoryError::Insufficient {
                requested: n,
                available: self.available(),
            });
        }
        self.reserved += n;
        Ok(())
    }

    /// Return `n` reserved units to the sellable pool (session expired).
    ///
    /// # Errors
    ///
    /// Fails if `n` is not positive or more than is reserved.
    pub const fn release(&mut self, n: i32) -> Result<(), InventoryError> {
        if n <= 0 {
            return Err(InventoryError::InvalidQuantity(n));
        }
        if n > self.reserved {
            return Err(InventoryError::ReservationUnderflow {
                requested: n,
                reserved: self.reserved,
            });
        }
        self.reserved -= n;
        Ok(())
    }

    /// Consume `n` reserved units (order paid). `available` is unchanged.
    ///
    /// # Errors
    ///
    /// Fails if `n` is not positive or more than is reserved.
    pub const fn commit(&mut self, n: i32) -> Result<(), InventoryError> {
        if n <= 0 {
            return Err(InventoryError::InvalidQuantity(n));
        }
        if n > self.reserved {
            return Err(InventoryError::ReservationUnderflow {
                requested: n,
                reserved: self.reserved,
            });
        }
        self.reserved -= n;
        self.quantity -= n;
        Ok(())
    }

    /// Restock (`delta > 0`) or write off (`delta < 0`) on-hand units.
    ///
    /// # Errors
    ///
    /// Fails if `delta` is zero or would leave fewer units than are reserved.
    pub const fn adjust(&mut self, delta: i32) -> Result<(), InventoryError> {
        if delta == 0 {
            return Err(InventoryError::InvalidQuantity(0));
        }
        let quantity = self.quantity.saturating_add(delta);
        if quantity < self.reserved {
            return Err(InventoryError::BelowReserved {
                quantity,
                reserved: self.reserved,
            });
        }
        self.quantity = quantity;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inconsistent_levels() {
        assert!(InventoryLevel::new(5, 6).is_err());
        assert!(InventoryLevel::new(-1, 0).is_err());
        assert_eq!(InventoryLevel::new(5, 2).unwrap().available(), 3);
    }

    #[test]
    fn test_reserve_cannot_oversell() {
        let mut level = InventoryLevel::new(4, 0).unwrap();
        level.reserve(3).unwrap();
        assert_eq!(
            level.reserve(2),
            Err(InventoryError::Insufficient {
                requested: 2,
                available: 1
            })
        );
        assert_eq!(level.available(), 1);
    }

    #[test]
    fn test_order_decrements_available_by_ordered_quantity() {
        let mut level = InventoryLevel::new(10, 0).unwrap();
        let before = level.available();
        level.reserve(4).unwrap();
        level.commit(4).unwrap();
        assert_eq!(level.available(), before - 4);
        assert_eq!(level.quantity(), 6);
        assert_eq!(level.reserved(), 0);
    }

    #[test]
    fn test_release_restores_available() {
        let mut level = InventoryLevel::new(10, 0).unwrap();
        level.reserve(4).unwrap();
        level.release(4).unwrap();
        assert_eq!(level.available(), 10);
        assert!(matches!(
            level.release(1),
            Err(InventoryError::ReservationUnderflow { .. })
        ));
    }

    #[test]
    fn test_zero_and_negative_quantities_rejected() {
        let mut level = InventoryLevel::new(10, 0).unwrap();
        assert_eq!(level.reserve(0), Err(InventoryError::InvalidQuantity(0)));
        assert_eq!(level.reserve(-2), Err(InventoryError::InvalidQuantity(-2)));
        assert_eq!(level.adjust(0), Err(InventoryError::InvalidQuantity(0)));
    }

    #[test]
    fn test_adjust_respects_reservations() {
        let mut level = InventoryLevel::new(10, 6).unwrap();
        level.adjust(5).unwrap();
        assert_eq!(level.quantity(), 15);
        assert!(matches!(
            level.adjust(-10),
            Err(InventoryError::BelowReserved { .. })
        ));
        level.adjust(-9).unwrap();
        assert_eq!(level.available(), 0);
    }
}
