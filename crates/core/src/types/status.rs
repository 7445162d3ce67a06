//! Status enums for orders, payments, fulfillment, registries and dropship.
//!
//! Every status has a stable `snake_case` string form shared by serde, the
//! Postgres enum types in schema `shop` and the admin forms. Statuses that
//! admins move by hand also define their allowed transitions so a stale
//! button cannot, say, ship a cancelled order.

use serde::{Deserialize, Serialize};

/// A rejected status change.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot move {entity} from {from} to {to}")]
pub struct TransitionError {
    /// Kind of record being changed.
    pub entity: &'static str,
    /// Current status.
    pub from: &'static str,
    /// Requested status.
    pub to: &'static str,
}

/// Generates `as_str`, `Display` and `FromStr` for a status enum.
macro_rules! status_strings {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable string form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

status_strings!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Whether an order may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use OrderStatus::{Cancelled, Delivered, Paid, Pending, Processing, Refunded, Shipped};
        matches!(
            (self, next),
            (Pending, Paid | Cancelled)
                | (Paid, Processing | Shipped | Cancelled | Refunded)
                | (Processing, Shipped | Cancelled | Refunded)
                | (Shipped, Delivered | Refunded)
                | (Delivered, Refunded)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the move is not allowed.
    pub const fn ensure_transition(self, next: Self) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                entity: "order",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

/// Payment state as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

status_strings!(PaymentStatus {
    Pending => "pending",
    Succeeded => "succeeded",
    Failed => "failed",
    Refunded => "refunded",
});

/// Shipping progress of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.fulfillment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    Unfulfilled,
    Processing,
    Shipped,
    Delivered,
    Returned,
}

status_strings!(FulfillmentStatus {
    Unfulfilled => "unfulfilled",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Returned => "returned",
});

impl FulfillmentStatus {
    /// Whether a shipment may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use FulfillmentStatus::{Delivered, Processing, Returned, Shipped, Unfulfilled};
        matches!(
            (self, next),
            (Unfulfilled, Processing | Shipped)
                | (Processing, Unfulfilled | Shipped)
                | (Shipped, Delivered | Returned)
                | (Delivered, Returned)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the move is not allowed.
    pub const fn ensure_transition(self, next: Self) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                entity: "shipment",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

/// Registry visibility and lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.registry_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    #[default]
    Active,
    Completed,
    Archived,
}

status_strings!(RegistryStatus {
    Active => "active",
    Completed => "completed",
    Archived => "archived",
});

impl RegistryStatus {
    /// Whether guests can still buy from the registry.
    #[must_use]
    pub const fn accepts_purchases(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// The life event a registry is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.registry_event", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RegistryEventType {
    #[default]
    BabyShower,
    Wedding,
    Birthday,
    Other,
}

status_strings!(RegistryEventType {
    BabyShower => "baby_shower",
    Wedding => "wedding",
    Birthday => "birthday",
    Other => "other",
});

impl RegistryEventType {
    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BabyShower => "Baby shower",
            Self::Wedding => "Wedding",
            Self::Birthday => "Birthday",
            Self::Other => "Celebration",
        }
    }
}

/// Progress of an order line forwarded to a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.dropship_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DropshipStatus {
    #[default]
    Pending,
    Submitted,
    Accepted,
    Shipped,
    Delivered,
    Cancelled,
}

status_strings!(DropshipStatus {
    Pending => "pending",
    Submitted => "submitted",
    Accepted => "accepted",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl DropshipStatus {
    /// Whether a dropship order may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use DropshipStatus::{Accepted, Cancelled, Delivered, Pending, Shipped, Submitted};
        matches!(
            (self, next),
            (Pending, Submitted | Cancelled)
                | (Submitted, Accepted | Shipped | Cancelled)
                | (Accepted, Shipped | Cancelled)
                | (Shipped, Delivered)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the move is not allowed.
    pub const fn ensure_transition(self, next: Self) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                entity: "dropship order",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Whether the supplier has the goods out of its hands.
    #[must_use]
    pub const fn is_shipped(self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered)
    }
}

/// Local mirror of a payment provider checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.checkout_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    #[default]
    Open,
    Completed,
    Expired,
}

status_strings!(CheckoutStatus {
    Open => "open",
    Completed => "completed",
    Expired => "expired",
});

/// Storefront user role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Shopper with access to their own account, orders and registries.
    #[default]
    Customer,
    /// Staff with access to the admin dashboard.
    Admin,
}

status_strings!(UserRole {
    Customer => "customer",
    Admin => "admin",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_string_forms_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::from_str(status.as_str()).unwrap(), *status);
        }
        for status in DropshipStatus::ALL {
            assert_eq!(DropshipStatus::from_str(status.as_str()).unwrap(), *status);
        }
        assert_eq!(
            RegistryEventType::from_str("baby_shower").unwrap(),
            RegistryEventType::BabyShower
        );
        assert!(OrderStatus::from_str("lost").is_err());
    }

    #[test]
    fn test_serde_matches_string_form() {
        let json = serde_json::to_string(&FulfillmentStatus::Unfulfilled).unwrap();
        assert_eq!(json, "\"unfulfilled\"");
        let json = serde_json::to_string(&RegistryEventType::BabyShower).unwrap();
        assert_eq!(json, "\"baby_shower\"");
    }

    #[test]
    fn test_order_transitions() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Paid));

        let err = OrderStatus::Delivered
            .ensure_transition(OrderStatus::Processing)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot move order from delivered to processing");
    }

    #[test]
    fn test_dropship_transitions() {
        assert!(DropshipStatus::Pending.can_transition_to(DropshipStatus::Submitted));
        assert!(DropshipStatus::Submitted.can_transition_to(DropshipStatus::Shipped));
        assert!(!DropshipStatus::Pending.can_transition_to(DropshipStatus::Shipped));
        assert!(!DropshipStatus::Delivered.can_transition_to(DropshipStatus::Cancelled));
        assert!(DropshipStatus::Delivered.is_shipped());
        assert!(!DropshipStatus::Accepted.is_shipped());
    }

    #[test]
    fn test_fulfillment_transitions() {
        assert!(FulfillmentStatus::Unfulfilled.can_transition_to(FulfillmentStatus::Shipped));
        assert!(!FulfillmentStatus::Returned.can_transition_to(FulfillmentStatus::Shipped));
        assert!(
            FulfillmentStatus::Delivered
                .ensure_transition(FulfillmentStatus::Unfulfilled)
                .is_err()
        );
    }

    #[test]
    fn test_registry_accepts_purchases() {
        assert!(RegistryStatus::Active.accepts_purchases());
        assert!(!RegistryStatus::Archived.accepts_purchases());
        assert!(!RegistryStatus::Completed.accepts_purchases());
    }
}
