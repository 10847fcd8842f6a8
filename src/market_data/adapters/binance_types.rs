// Source: wss://stream.binance.com:9443/ws/<symbol>@bookTicker
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BookTicker {
    /// Order book update id
    #[serde(rename = "u", default)]
    pub update_id: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bid: String,
    #[serde(rename = "B", default)]
    pub bid_qty: Option<String>,
    #[serde(rename = "a")]
    pub ask: String,
    #[serde(rename = "A", default)]
    pub ask_qty: Option<String>,
}

// Combined-stream wrapper: {"stream": "...", "data": {...}}
#[derive(Debug, Deserialize)]
pub struct StreamEnvelope {
    pub stream: String,
    pub data: BookTicker,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TickerMessage {
    Wrapped(StreamEnvelope),
    Raw(BookTicker),
}

impl TickerMessage {
    pub fn into_ticker(self) -> BookTicker {
        match self {
            TickerMessage::Wrapped(env) => env.data,
            TickerMessage::Raw(t) => t,
        }
    }
}
