use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "bid" | "long" => Some(Side::Buy),
            "sell" | "ask" | "short" => Some(Side::Sell),
            _ => None,
        }
    }

    /// +1 for buys, -1 for sells: the sign a fill applies to the position.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// NEW -> SUBMITTED -> {OPEN, REJECTED} -> {PARTIALLY_FILLED -> OPEN | FILLED | CANCELLED}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Submitted,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Position in the lifecycle; terminal statuses share the last stage.
    pub fn stage(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Submitted => 1,
            OrderStatus::Open => 2,
            OrderStatus::PartiallyFilled => 3,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected => 4,
        }
    }

    /// Could be resting on the venue book.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Map a venue status string. `pendingsubmit` folds into SUBMITTED.
    pub fn from_venue(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pendingsubmit" | "pending_submit" => Some(OrderStatus::Submitted),
            "submitted" | "open" | "new" | "live" => Some(OrderStatus::Open),
            "partiallyfilled" | "partially_filled" => Some(OrderStatus::PartiallyFilled),
            "filled" => Some(OrderStatus::Filled),
            "cancelled" | "canceled" | "inactive" => Some(OrderStatus::Cancelled),
            "rejected" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

pub type OrderId = String;

// Order as known locally: created optimistically on submit, overwritten by venue updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: Option<String>,
    /// None only for orders surfaced by the venue feed that we cannot attribute.
    pub side: Option<Side>,
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub remaining_size: Decimal,
    pub filled_size: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    /// Highest venue sequence applied; None while the entry is purely local.
    pub last_seq: Option<u64>,
    /// Status was set locally and not yet confirmed by the venue.
    pub optimistic: bool,
    pub updated_at: DateTime<Utc>,
}

// Fill (execution) observed through reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub side: Option<Side>,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Venue-confirmed change to one order, carrying a per-order monotonic sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub client_id: Option<String>,
    pub side: Option<Side>,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub remaining_size: Option<Decimal>,
    /// Cumulative executed size.
    pub executed_size: Option<Decimal>,
    /// Average price over the cumulative executed size.
    pub avg_price: Option<Decimal>,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}

impl OrderUpdate {
    /// Minimal update: status change only.
    pub fn status(order_id: impl Into<OrderId>, status: OrderStatus, seq: u64) -> Self {
        Self {
            order_id: order_id.into(),
            client_id: None,
            side: None,
            price: None,
            status,
            remaining_size: None,
            executed_size: None,
            avg_price: None,
            seq,
            timestamp: Utc::now(),
        }
    }
}

/// One side of the target quote pair, recomputed every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuoteIntent {
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// Order as submitted to the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Submitted.is_active());
        assert!(OrderStatus::PartiallyFilled.is_active());
    }

    #[test]
    fn venue_status_mapping() {
        assert_eq!(OrderStatus::from_venue("pendingsubmit"), Some(OrderStatus::Submitted));
        assert_eq!(OrderStatus::from_venue("submitted"), Some(OrderStatus::Open));
        assert_eq!(OrderStatus::from_venue("partiallyfilled"), Some(OrderStatus::PartiallyFilled));
        assert_eq!(OrderStatus::from_venue("inactive"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::from_venue("FILLED"), Some(OrderStatus::Filled));
        assert_eq!(OrderStatus::from_venue("weird"), None);
    }

    #[test]
    fn side_parse_and_sign() {
        assert_eq!(Side::parse("long"), Some(Side::Buy));
        assert_eq!(Side::parse("SELL"), Some(Side::Sell));
        assert_eq!(Side::Sell.sign(), Decimal::NEGATIVE_ONE);
    }
}
