// Core quoting engine: domain types, pricing, risk
pub mod pricing; // fair price + target quotes (pure)
pub mod risk;    // RiskGuard: HALT on stuck cancels / order build-up
pub mod types;   // Side, OrderStatus, Order, Fill, OrderUpdate, QuoteIntent
