// Shared harness: a scriptable in-memory venue and a wired-up quoting stack.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use fairmm::account::state::AccountDataState;
use fairmm::engine::pricing::{PricingEngine, Skew};
use fairmm::engine::risk::{RiskGuard, RiskLimits};
use fairmm::engine::types::{NewOrder, OrderId, OrderStatus, OrderUpdate, Side};
use fairmm::error::{VenueError, VenueResult};
use fairmm::market_data::normaliser::Normaliser;
use fairmm::market_data::state::MarketDataState;
use fairmm::strategy::order_manager::{OrderManager, OrderManagerConfig};
use fairmm::strategy::quoting::{QuotingConfig, QuotingLoop};
use fairmm::venue::VenueClient;

pub const SYMBOL: &str = "GOLD-BTC";
pub const BASE: &str = "PAXGUSDT";
pub const QUOTE: &str = "BTCUSDT";

/// How the mock answers one call.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed,
    Fail(VenueError),
    /// Never answers; the caller's timeout decides.
    Hang,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    submitted: Vec<(OrderId, NewOrder)>,
    cancels: Vec<OrderId>,
    cancel_alls: Vec<String>,
    place_script: HashMap<Side, VecDeque<Behaviour>>,
    cancel_script: VecDeque<Behaviour>,
    cancel_all_script: VecDeque<Behaviour>,
    open_orders: Vec<OrderUpdate>,
    position: Decimal,
}

/// In-memory venue. Every call is recorded before its scripted behaviour runs,
/// so a hung submit still shows up as received.
#[derive(Default)]
pub struct MockVenue {
    state: Mutex<MockState>,
}

impl MockVenue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_place(&self, side: Side, behaviour: Behaviour) {
        self.state
            .lock()
            .place_script
            .entry(side)
            .or_default()
            .push_back(behaviour);
    }

    pub fn script_cancel(&self, behaviour: Behaviour) {
        self.state.lock().cancel_script.push_back(behaviour);
    }

    pub fn script_cancel_all(&self, behaviour: Behaviour) {
        self.state.lock().cancel_all_script.push_back(behaviour);
    }

    pub fn set_open_orders(&self, orders: Vec<OrderUpdate>) {
        self.state.lock().open_orders = orders;
    }

    pub fn set_position(&self, quantity: Decimal) {
        self.state.lock().position = quantity;
    }

    pub fn submitted(&self) -> Vec<(OrderId, NewOrder)> {
        self.state.lock().submitted.clone()
    }

    pub fn submitted_on(&self, side: Side) -> Vec<(OrderId, NewOrder)> {
        self.submitted().into_iter().filter(|(_, o)| o.side == side).collect()
    }

    pub fn cancels(&self) -> Vec<OrderId> {
        self.state.lock().cancels.clone()
    }

    pub fn cancel_all_calls(&self) -> Vec<String> {
        self.state.lock().cancel_alls.clone()
    }
}

async fn play<T>(behaviour: Behaviour, ok: T) -> VenueResult<T> {
    match behaviour {
        Behaviour::Succeed => Ok(ok),
        Behaviour::Fail(e) => Err(e),
        Behaviour::Hang => {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Err(VenueError::Timeout)
        }
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    async fn submit_order(&self, order: &NewOrder) -> VenueResult<OrderId> {
        let (id, behaviour) = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = format!("v-{}", state.next_id);
            state.submitted.push((id.clone(), order.clone()));
            let behaviour = state
                .place_script
                .get_mut(&order.side)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Behaviour::Succeed);
            (id, behaviour)
        };
        play(behaviour, id).await
    }

    async fn cancel_order(&self, order_id: &str) -> VenueResult<()> {
        let behaviour = {
            let mut state = self.state.lock();
            state.cancels.push(order_id.to_string());
            state.cancel_script.pop_front().unwrap_or(Behaviour::Succeed)
        };
        play(behaviour, ()).await
    }

    async fn cancel_all(&self, symbol: &str) -> VenueResult<()> {
        let behaviour = {
            let mut state = self.state.lock();
            state.cancel_alls.push(symbol.to_string());
            state.cancel_all_script.pop_front().unwrap_or(Behaviour::Succeed)
        };
        play(behaviour, ()).await
    }

    async fn open_orders(&self, _symbol: &str) -> VenueResult<Vec<OrderUpdate>> {
        Ok(self.state.lock().open_orders.clone())
    }

    async fn position(&self, _symbol: &str) -> VenueResult<Decimal> {
        Ok(self.state.lock().position)
    }
}

pub struct Harness {
    pub venue: Arc<MockVenue>,
    pub market: MarketDataState,
    pub account: AccountDataState,
    pub orders: Arc<OrderManager>,
    pub risk: Arc<RiskGuard>,
    pub quoter: QuotingLoop,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limits(RiskLimits::default())
    }

    pub fn with_limits(limits: RiskLimits) -> Self {
        Self::build(limits, Skew::default())
    }

    pub fn build(limits: RiskLimits, skew: Skew) -> Self {
        let venue = MockVenue::new();
        let market = MarketDataState::new();
        let account = AccountDataState::new();
        let orders = Arc::new(OrderManager::new(
            venue.clone(),
            account.clone(),
            OrderManagerConfig {
                symbol: SYMBOL.into(),
                call_timeout: Duration::from_secs(2),
                pending_ttl: Duration::from_secs(10),
            },
        ));
        let risk = Arc::new(RiskGuard::new(limits));
        let quoter = QuotingLoop::new(
            market.clone(),
            PricingEngine::new(BASE, QUOTE, Normaliser::new(dec!(0.000001))),
            Arc::clone(&orders),
            Arc::clone(&risk),
            QuotingConfig {
                spread_bps: dec!(20),
                order_size: dec!(1.00),
                interval: Duration::from_secs(5),
                skew,
            },
        );
        Self { venue, market, account, orders, risk, quoter }
    }

    /// Set both references with zero spread, so the mid is the given price.
    pub fn set_prices(&self, base: Decimal, quote: Decimal) {
        let now = Utc::now();
        self.market.update(BASE, base, base, now);
        self.market.update(QUOTE, quote, quote, now);
    }

    pub fn active_on(&self, side: Side) -> usize {
        self.account.snapshot().active_on_side(side).len()
    }

    /// Venue feed message for an order, attributed by client id.
    pub fn feed(&self, id: &str, client_id: Option<&str>, status: OrderStatus, seq: u64) {
        let mut update = OrderUpdate::status(id, status, seq);
        update.client_id = client_id.map(str::to_string);
        self.orders.reconcile(&update);
    }
}

pub fn open_order(id: &str, side: Side, price: Decimal, seq: u64) -> OrderUpdate {
    OrderUpdate {
        side: Some(side),
        price: Some(price),
        remaining_size: Some(dec!(1)),
        ..OrderUpdate::status(id, OrderStatus::Open, seq)
    }
}
