// QuotingLoop: the periodic cycle tying pricing, order management and risk together.
//
// One cycle: risk check, snapshot both states, price, sync quotes, feed the
// outcomes to the RiskGuard, check again. A cycle is never interrupted by
// shutdown halfway through; shutdown is only observed between ticks.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::account::state::AccountDataState;
use crate::engine::pricing::{PricingEngine, QuoteParams, Skew};
use crate::engine::risk::{HaltReason, RiskDecision, RiskGuard};
use crate::engine::types::QuoteIntent;
use crate::error::PricingError;
use crate::market_data::state::MarketDataState;
use crate::shutdown::Shutdown;
use crate::strategy::order_manager::{CycleReport, FlattenReport, OrderManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    #[default]
    Idle,
    Computing,
    Reconciling,
    Halted,
}

/// Read-only view of the loop for the monitor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuoterStatus {
    pub state: LoopState,
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub last_fair_price: Option<Decimal>,
    pub last_bid: Option<QuoteIntent>,
    pub last_ask: Option<QuoteIntent>,
    pub last_skip_reason: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub halt_reason: Option<HaltReason>,
}

pub type SharedQuoterStatus = Arc<RwLock<QuoterStatus>>;

#[derive(Debug, Clone)]
pub struct QuotingConfig {
    pub spread_bps: Decimal,
    pub order_size: Decimal,
    pub interval: Duration,
    pub skew: Skew,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// No usable fair price; nothing was sent to the venue.
    Skipped(PricingError),
    Quoted(CycleReport),
    Halted {
        reason: HaltReason,
        flatten: FlattenReport,
    },
    /// Already halted on an earlier cycle; nothing was done.
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    Halted(HaltReason),
}

/// How a quoting session ended and what the cancel sweeps achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub halt_reason: Option<HaltReason>,
    pub halt_flatten: Option<FlattenReport>,
    /// Sweep run after the termination signal, on every exit path.
    pub final_flatten: FlattenReport,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        self.halt_flatten.as_ref().map_or(true, FlattenReport::is_clean) && self.final_flatten.is_clean()
    }
}

pub struct QuotingLoop {
    market: MarketDataState,
    account: AccountDataState,
    pricing: PricingEngine,
    orders: Arc<OrderManager>,
    risk: Arc<RiskGuard>,
    config: QuotingConfig,
    status: SharedQuoterStatus,
    halt_flatten: Mutex<Option<FlattenReport>>,
}

impl QuotingLoop {
    pub fn new(
        market: MarketDataState,
        pricing: PricingEngine,
        orders: Arc<OrderManager>,
        risk: Arc<RiskGuard>,
        config: QuotingConfig,
    ) -> Self {
        Self {
            market,
            account: orders.account().clone(),
            pricing,
            orders,
            risk,
            config,
            status: Arc::new(RwLock::new(QuoterStatus::default())),
            halt_flatten: Mutex::new(None),
        }
    }

    pub fn status(&self) -> SharedQuoterStatus {
        Arc::clone(&self.status)
    }

    fn set_state(&self, state: LoopState) {
        self.status.write().state = state;
    }

    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self.status.read().state == LoopState::Halted {
            return CycleOutcome::Inactive;
        }
        self.set_state(LoopState::Computing);

        let account = self.account.snapshot();
        if let RiskDecision::Halt(reason) = self.risk.evaluate(account.open_order_count()) {
            return self.halt(reason).await;
        }

        let market = self.market.snapshot();
        let params = QuoteParams {
            spread_bps: self.config.spread_bps,
            size: self.config.order_size,
            skew: self.config.skew,
            position: self.config.skew.is_enabled().then_some(account.position.quantity),
        };
        let quotes = match self.pricing.quote_snapshot(&market, &params) {
            Ok(q) => q,
            Err(e) => {
                debug!(reason = %e, "No fair price, skipping cycle");
                metrics::counter!("fairmm_cycles_skipped_total").increment(1);
                let mut status = self.status.write();
                status.state = LoopState::Idle;
                status.cycles += 1;
                status.skipped_cycles += 1;
                status.last_skip_reason = Some(e.to_string());
                status.last_cycle_at = Some(Utc::now());
                return CycleOutcome::Skipped(e);
            }
        };

        if let Some(fair) = quotes.fair_price.to_f64() {
            metrics::gauge!("fairmm_fair_price").set(fair);
        }
        {
            let mut status = self.status.write();
            status.state = LoopState::Reconciling;
            status.last_fair_price = Some(quotes.fair_price);
            status.last_bid = Some(quotes.bid);
            status.last_ask = Some(quotes.ask);
            status.last_skip_reason = None;
        }
        debug!(fair = %quotes.fair_price, bid = %quotes.bid.price, ask = %quotes.ask.price, "Target quotes");

        let report = self.orders.sync_quotes(&[quotes.bid, quotes.ask], account).await;
        self.risk.record(&report.tally);
        metrics::counter!("fairmm_cycles_total").increment(1);

        {
            let mut status = self.status.write();
            status.cycles += 1;
            status.last_cycle_at = Some(Utc::now());
        }
        if !report.placed.is_empty() || !report.cancelled.is_empty() {
            info!(
                fair = %quotes.fair_price,
                bid = %quotes.bid.price,
                ask = %quotes.ask.price,
                placed = report.placed.len(),
                cancelled = report.cancelled.len(),
                "Quotes updated"
            );
        }

        let open = self.account.snapshot().open_order_count();
        if let RiskDecision::Halt(reason) = self.risk.evaluate(open) {
            return self.halt(reason).await;
        }
        self.set_state(LoopState::Idle);
        CycleOutcome::Quoted(report)
    }

    async fn halt(&self, reason: HaltReason) -> CycleOutcome {
        {
            let mut status = self.status.write();
            status.state = LoopState::Halted;
            status.halt_reason = Some(reason.clone());
        }
        error!(%reason, "HALT: cancelling all orders and stopping quoting");
        let flatten = self.orders.flatten().await;
        if !flatten.is_clean() {
            error!(
                unconfirmed = flatten.unconfirmed.len(),
                unresolved_placements = flatten.unresolved_placements.len(),
                "HALT flatten incomplete, check the venue manually"
            );
        }
        *self.halt_flatten.lock() = Some(flatten.clone());
        CycleOutcome::Halted { reason, flatten }
    }

    /// Run cycles every `interval` until shutdown or HALT.
    pub async fn run(&self, mut shutdown: Shutdown) -> LoopExit {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.config.interval.as_millis() as u64, "Quoting loop started");

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Quoting loop stopping on shutdown");
                    return LoopExit::Shutdown;
                }
                _ = ticker.tick() => {}
            }
            match self.run_cycle().await {
                CycleOutcome::Halted { reason, .. } => return LoopExit::Halted(reason),
                CycleOutcome::Inactive => {
                    warn!("Quoting loop inactive after HALT");
                    let reason = self.status.read().halt_reason.clone();
                    if let Some(reason) = reason {
                        return LoopExit::Halted(reason);
                    }
                }
                CycleOutcome::Skipped(_) | CycleOutcome::Quoted(_) => {}
            }
        }
    }

    /// Quote until the termination signal, then cancel everything for the symbol.
    /// After a HALT the loop stops quoting but keeps waiting for the signal; the
    /// final sweep retries whatever the HALT sweep could not confirm and any
    /// order that surfaced since.
    pub async fn run_until_shutdown(&self, shutdown: Shutdown) -> SessionReport {
        let halt_reason = match self.run(shutdown.clone()).await {
            LoopExit::Shutdown => None,
            LoopExit::Halted(reason) => {
                error!(%reason, "Trading halted; waiting for the termination signal");
                let mut shutdown = shutdown;
                shutdown.wait().await;
                Some(reason)
            }
        };

        let final_flatten = self.orders.flatten().await;
        info!(
            confirmed = final_flatten.confirmed.len(),
            unconfirmed = final_flatten.unconfirmed.len(),
            unresolved_placements = final_flatten.unresolved_placements.len(),
            "Shutdown flatten complete"
        );
        SessionReport {
            halt_reason,
            halt_flatten: self.halt_flatten.lock().clone(),
            final_flatten,
        }
    }
}
