// Router: applies adapter events to MarketDataState in delivery order
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::market_data::adapters::MarketEvent;
use crate::market_data::state::MarketDataState;

pub async fn run_price_router(mut rx: mpsc::Receiver<MarketEvent>, state: MarketDataState) {
    while let Some(event) = rx.recv().await {
        match event {
            MarketEvent::Ticker { symbol, bid, ask, ts } => {
                if state.update(&symbol, bid, ask, ts) {
                    metrics::counter!("fairmm_price_updates_total", "symbol" => symbol.clone()).increment(1);
                } else {
                    debug!(%symbol, "Out-of-date ticker ignored");
                }
            }
        }
    }
    info!("Price router stopped");
}
