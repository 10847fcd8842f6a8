use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Latest top of book for one reference instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefPrice {
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl RefPrice {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// Immutable view of the reference prices at one instant.
/// Symbols with no update yet are absent, never zero.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot(Arc<HashMap<String, RefPrice>>);

impl MarketSnapshot {
    pub fn get(&self, symbol: &str) -> Option<&RefPrice> {
        self.0.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RefPrice)> {
        self.0.iter()
    }
}

/// Reference prices shared between the price router (writer) and the quoting loop (reader).
///
/// Copy-on-write: `snapshot` clones an `Arc`, so readers never hold the lock
/// while they work and the writer is never blocked by an outstanding snapshot.
#[derive(Debug, Clone, Default)]
pub struct MarketDataState {
    prices: Arc<RwLock<Arc<HashMap<String, RefPrice>>>>,
}

impl MarketDataState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest bid/ask for `symbol`. Updates older than the stored one are ignored.
    /// Returns whether the update was applied.
    pub fn update(&self, symbol: &str, bid: Decimal, ask: Decimal, timestamp: DateTime<Utc>) -> bool {
        let mut guard = self.prices.write();
        if let Some(existing) = guard.get(symbol) {
            if timestamp < existing.timestamp {
                trace!(symbol, %timestamp, latest = %existing.timestamp, "Ignoring out-of-date reference price");
                return false;
            }
        }
        Arc::make_mut(&mut *guard).insert(symbol.to_string(), RefPrice { bid, ask, timestamp });
        trace!(symbol, %bid, %ask, "Reference price updated");
        true
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let guard = self.prices.read();
        MarketSnapshot(Arc::clone(&*guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn unknown_symbol_is_absent() {
        let state = MarketDataState::new();
        assert!(state.snapshot().get("BTCUSDT").is_none());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn newest_update_wins() {
        let state = MarketDataState::new();
        let t0 = Utc::now();
        assert!(state.update("BTCUSDT", dec!(60000), dec!(60001), t0));
        assert!(state.update("BTCUSDT", dec!(60010), dec!(60011), t0 + Duration::milliseconds(5)));
        assert!(!state.update("BTCUSDT", dec!(1), dec!(2), t0));

        let snap = state.snapshot();
        let px = snap.get("BTCUSDT").unwrap();
        assert_eq!(px.bid, dec!(60010));
        assert_eq!(px.mid(), dec!(60010.5));
    }

    #[test]
    fn snapshot_is_isolated_from_later_updates() {
        let state = MarketDataState::new();
        let t0 = Utc::now();
        state.update("PAXGUSDT", dec!(3000), dec!(3000), t0);
        let before = state.snapshot();
        state.update("PAXGUSDT", dec!(3100), dec!(3100), t0 + Duration::seconds(1));

        assert_eq!(before.get("PAXGUSDT").unwrap().bid, dec!(3000));
        assert_eq!(state.snapshot().get("PAXGUSDT").unwrap().bid, dec!(3100));
    }

    #[test]
    fn same_timestamp_is_idempotent() {
        let state = MarketDataState::new();
        let t0 = Utc::now();
        state.update("BTCUSDT", dec!(1), dec!(2), t0);
        assert!(state.update("BTCUSDT", dec!(1), dec!(2), t0));
        assert_eq!(state.snapshot().len(), 1);
    }
}
