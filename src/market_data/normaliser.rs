// Convert wire strings into Decimals and snap quote prices onto the venue tick grid.
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normaliser {
    pub tick_size: Decimal, // e.g. 0.000001 for GOLD-BTC
}

impl Normaliser {
    pub fn new(tick_size: Decimal) -> Self {
        Self { tick_size }
    }

    /// Parse a wire price/size string. Empty, malformed or negative values are rejected.
    pub fn parse(s: &str) -> Option<Decimal> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()?;
        if value.is_sign_negative() {
            return None;
        }
        Some(value.normalize())
    }

    /// Round a bid down to the tick grid so it never tightens the quote.
    pub fn round_bid(&self, price: Decimal) -> Decimal {
        self.snap(price, RoundingStrategy::ToNegativeInfinity)
    }

    /// Round an ask up to the tick grid.
    pub fn round_ask(&self, price: Decimal) -> Decimal {
        self.snap(price, RoundingStrategy::ToPositiveInfinity)
    }

    fn snap(&self, price: Decimal, strategy: RoundingStrategy) -> Decimal {
        if self.tick_size <= Decimal::ZERO {
            return price;
        }
        let ticks = (price / self.tick_size).round_dp_with_strategy(0, strategy);
        (ticks * self.tick_size).normalize()
    }
}
