// Fair price and target quotes.
//
// The traded instrument has no direct reference market, so its fair price is
// the ratio of two external references quoted in the same currency
// (e.g. PAXG/USDT ÷ BTC/USDT gives GOLD/BTC). Everything here is pure.

use rust_decimal::Decimal;

use crate::engine::types::{QuoteIntent, Side};
use crate::error::PricingError;
use crate::market_data::normaliser::Normaliser;
use crate::market_data::state::{MarketSnapshot, RefPrice};

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Inventory skew, the optional quote adjustment. Disabled when `bps_per_unit` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Skew {
    pub bps_per_unit: Decimal,
    pub max_bps: Decimal,
}

impl Skew {
    pub fn is_enabled(&self) -> bool {
        self.bps_per_unit > Decimal::ZERO
    }

    /// Shift in bps applied to both quotes: long inventory pushes quotes down.
    pub fn shift_bps(&self, position: Decimal) -> Decimal {
        if !self.is_enabled() {
            return Decimal::ZERO;
        }
        let raw = -position * self.bps_per_unit;
        if self.max_bps > Decimal::ZERO {
            raw.clamp(-self.max_bps, self.max_bps)
        } else {
            raw
        }
    }
}

/// Per-cycle quoting inputs. Spread is a parameter so it can become dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteParams {
    pub spread_bps: Decimal,
    pub size: Decimal,
    pub skew: Skew,
    pub position: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotePair {
    pub fair_price: Decimal,
    pub bid: QuoteIntent,
    pub ask: QuoteIntent,
}

#[derive(Debug, Clone)]
pub struct PricingEngine {
    pub ref_base: String,
    pub ref_quote: String,
    normaliser: Normaliser,
}

impl PricingEngine {
    pub fn new(ref_base: impl Into<String>, ref_quote: impl Into<String>, normaliser: Normaliser) -> Self {
        Self {
            ref_base: ref_base.into(),
            ref_quote: ref_quote.into(),
            normaliser,
        }
    }

    /// `ref_a / ref_b`, defined only when both are known and `ref_b` is non-zero.
    pub fn fair_price(ref_a: Option<Decimal>, ref_b: Option<Decimal>) -> Option<Decimal> {
        let (a, b) = (ref_a?, ref_b?);
        if b.is_zero() {
            return None;
        }
        a.checked_div(b)
    }

    /// Fair price from a market snapshot, using the mid of each reference.
    pub fn fair_from_snapshot(&self, snapshot: &MarketSnapshot) -> Result<Decimal, PricingError> {
        let a = self.reference_mid(snapshot, &self.ref_base)?;
        let b = self.reference_mid(snapshot, &self.ref_quote)?;
        if b.is_zero() {
            return Err(PricingError::ZeroReference(self.ref_quote.clone()));
        }
        Self::fair_price(Some(a), Some(b)).ok_or_else(|| PricingError::ZeroReference(self.ref_quote.clone()))
    }

    fn reference_mid(&self, snapshot: &MarketSnapshot, symbol: &str) -> Result<Decimal, PricingError> {
        snapshot
            .get(symbol)
            .map(RefPrice::mid)
            .ok_or_else(|| PricingError::MissingReference(symbol.to_string()))
    }

    /// `fair * (1 ∓ spread_bps / 10000)`, shifted by skew, snapped to the tick grid.
    pub fn quotes(&self, fair_price: Decimal, params: &QuoteParams) -> Result<QuotePair, PricingError> {
        let half = params.spread_bps / BPS;
        let shift = params
            .position
            .map(|p| params.skew.shift_bps(p) / BPS)
            .unwrap_or(Decimal::ZERO);

        let raw_bid = fair_price * (Decimal::ONE - half + shift);
        let raw_ask = fair_price * (Decimal::ONE + half + shift);
        let bid = self.normaliser.round_bid(raw_bid);
        let ask = self.normaliser.round_ask(raw_ask);

        if bid <= Decimal::ZERO {
            return Err(PricingError::NonPositiveQuote(bid));
        }
        if ask <= Decimal::ZERO {
            return Err(PricingError::NonPositiveQuote(ask));
        }

        Ok(QuotePair {
            fair_price,
            bid: QuoteIntent { side: Side::Buy, price: bid, size: params.size },
            ask: QuoteIntent { side: Side::Sell, price: ask, size: params.size },
        })
    }

    /// Snapshot to quote pair in one step; any error means "do not quote this cycle".
    pub fn quote_snapshot(&self, snapshot: &MarketSnapshot, params: &QuoteParams) -> Result<QuotePair, PricingError> {
        let fair = self.fair_from_snapshot(snapshot)?;
        self.quotes(fair, params)
    }
}
