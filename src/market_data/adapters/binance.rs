// Binance bookTicker adapter: reference prices for the fair-price ratio
use chrono::Utc;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::binance_types::{BookTicker, TickerMessage};
use super::{MarketEvent, PriceFeedAdapter};
use crate::config::FeedSettings;
use crate::error::FeedError;
use crate::market_data::normaliser::Normaliser;
use crate::shutdown::Shutdown;

pub struct BinanceAdapter {
    pub ws_url: String,       // "wss://stream.binance.com:9443/ws"
    pub symbols: Vec<String>, // e.g. ["PAXGUSDT", "BTCUSDT"]
    pub reconnect: Duration,
}

impl BinanceAdapter {
    pub fn new(settings: &FeedSettings) -> Self {
        Self {
            ws_url: settings.ws_url.clone(),
            symbols: vec![settings.ref_base.clone(), settings.ref_quote.clone()],
            reconnect: Duration::from_millis(settings.reconnect_interval_ms),
        }
    }

    pub fn stream_url(&self) -> String {
        let streams: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("{}@bookTicker", s.to_ascii_lowercase()))
            .collect();
        format!("{}/{}", self.ws_url.trim_end_matches('/'), streams.join("/"))
    }

    async fn session(&self, tx: &mpsc::Sender<MarketEvent>, shutdown: &mut Shutdown) -> Result<(), FeedError> {
        let url = self.stream_url();
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!(%url, "Price feed connected");
        let (_write, mut read) = ws.split();

        loop {
            let msg = tokio::select! {
                _ = shutdown.wait() => return Ok(()),
                msg = read.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(event) = parse_event(&text) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        return Err(FeedError::ChannelClosed);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Price feed closed by server");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }
}

/// Decode one frame. Anything that is not a well-formed ticker is dropped.
pub fn parse_event(text: &str) -> Option<MarketEvent> {
    match serde_json::from_str::<TickerMessage>(text) {
        Ok(msg) => to_event(&msg.into_ticker()),
        Err(e) => {
            trace!(error = %e, "Ignoring non-ticker frame");
            None
        }
    }
}

fn to_event(t: &BookTicker) -> Option<MarketEvent> {
    let (Some(bid), Some(ask)) = (Normaliser::parse(&t.bid), Normaliser::parse(&t.ask)) else {
        warn!(symbol = %t.symbol, bid = %t.bid, ask = %t.ask, "Unparseable ticker prices");
        return None;
    };
    Some(MarketEvent::Ticker {
        symbol: t.symbol.to_ascii_uppercase(),
        bid,
        ask,
        ts: Utc::now(),
    })
}

#[async_trait::async_trait]
impl PriceFeedAdapter for BinanceAdapter {
    async fn run(&self, tx: mpsc::Sender<MarketEvent>, mut shutdown: Shutdown) {
        while !shutdown.is_triggered() {
            match self.session(&tx, &mut shutdown).await {
                Ok(()) => info!("Price feed session ended"),
                Err(FeedError::ChannelClosed) => {
                    warn!("Price router gone, stopping price feed");
                    return;
                }
                Err(e) => warn!(error = %e, "Price feed session failed"),
            }
            if shutdown.is_triggered() {
                break;
            }
            metrics::counter!("fairmm_feed_reconnects_total", "feed" => "price").increment(1);
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.reconnect) => {}
            }
        }
        info!("Price feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stream_url_joins_lowercase_streams() {
        let adapter = BinanceAdapter {
            ws_url: "wss://stream.binance.com:9443/ws".into(),
            symbols: vec!["PAXGUSDT".into(), "BTCUSDT".into()],
            reconnect: Duration::from_secs(5),
        };
        assert_eq!(
            adapter.stream_url(),
            "wss://stream.binance.com:9443/ws/paxgusdt@bookTicker/btcusdt@bookTicker"
        );
    }

    #[test]
    fn ticker_frame_becomes_event() {
        let event = parse_event(r#"{"u":1,"s":"PAXGUSDT","b":"2999.50","B":"1","a":"3000.50","A":"2"}"#).unwrap();
        let MarketEvent::Ticker { symbol, bid, ask, .. } = event;
        assert_eq!(symbol, "PAXGUSDT");
        assert_eq!(bid, dec!(2999.5));
        assert_eq!(ask, dec!(3000.5));
    }

    #[test]
    fn garbage_prices_are_dropped() {
        assert!(parse_event(r#"{"s":"BTCUSDT","b":"abc","a":"1"}"#).is_none());
        assert!(parse_event(r#"{"result":null,"id":1}"#).is_none());
    }
}
