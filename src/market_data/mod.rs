// Market data module entrypoint
pub mod adapters;   // reference price fetchers (Binance bookTicker)
pub mod normaliser; // price strings -> Decimal, tick rounding
pub mod router;     // adapter events -> MarketDataState
pub mod state;      // MarketDataState: latest bid/ask per reference symbol
