pub mod account;
pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod monitor;
pub mod shutdown;
pub mod strategy;
pub mod telemetry;
pub mod venue;
