// Shared trait + event for reference price adapters
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::shutdown::Shutdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketEvent {
    // Top of book for one reference instrument
    Ticker {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
        ts: DateTime<Utc>,
    },
}

#[async_trait::async_trait]
pub trait PriceFeedAdapter: Send + Sync {
    // Stream events into the router until shutdown; reconnects are the adapter's job.
    async fn run(&self, tx: mpsc::Sender<MarketEvent>, shutdown: Shutdown);
}

pub mod binance;
pub mod binance_types;
