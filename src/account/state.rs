// Account-side state: orders, fills and position.
//
// Written by the venue feed/poll listeners (through `OrderManager::reconcile`
// and the position poller) and by the OrderManager's optimistic bookkeeping.
// Every mutation happens under one write guard, so a snapshot never shows
// `orders` and `position` from different points of the same reconciliation.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::types::{Fill, Order, OrderId, OrderStatus, OrderUpdate, Side};

const MAX_HISTORY: usize = 1000;
/// Terminal orders kept for lookups and late venue reports; older ones are evicted.
pub const MAX_RETAINED_TERMINAL: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    #[default]
    Unknown,
    Fills,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub quantity: Decimal,
    pub source: PositionSource,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub previous: Option<OrderStatus>,
    pub status: OrderStatus,
    pub executed: Decimal,
    pub remaining: Decimal,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The order already reached a venue-confirmed terminal status.
    TerminalSticky,
    /// The update's sequence is older than the last one applied.
    OutOfOrder,
    /// Same sequence as the last applied update and nothing new in it.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { fill: Option<Fill> },
    Inserted { fill: Option<Fill> },
    Stale(StaleReason),
}

impl ReconcileOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self, ReconcileOutcome::Stale(_))
    }
}

/// Attribution for an order id we have never seen, resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adoption {
    pub client_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountData {
    pub orders: HashMap<OrderId, Order>,
    pub fills: Vec<Fill>,
    pub position: Position,
    pub history: VecDeque<StatusChange>,
    pub stale_updates: u64,
    /// Terminal order ids, oldest first.
    #[serde(skip)]
    retired: VecDeque<OrderId>,
}

impl AccountData {
    pub fn order(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.status.is_active())
    }

    pub fn active_on_side(&self, side: Side) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self
            .active_orders()
            .filter(|o| o.side == Some(side))
            .collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        orders
    }

    /// Active orders we cannot attribute to a side.
    pub fn stray_orders(&self) -> Vec<&Order> {
        self.active_orders().filter(|o| o.side.is_none()).collect()
    }

    pub fn open_order_count(&self) -> usize {
        self.active_orders().count()
    }

    pub fn status_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for order in self.orders.values() {
            *summary.entry(order.status.to_string()).or_insert(0) += 1;
        }
        summary
    }

    fn record_change(&mut self, change: StatusChange) {
        self.history.push_back(change);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    fn retire(&mut self, id: &str) {
        self.retired.push_back(id.to_string());
        while self.retired.len() > MAX_RETAINED_TERMINAL {
            let Some(oldest) = self.retired.pop_front() else {
                break;
            };
            // revived by the venue since it was queued
            if self.orders.get(&oldest).is_some_and(|o| o.status.is_terminal()) {
                self.orders.remove(&oldest);
            }
        }
    }

    fn apply_fill(&mut self, fill: &Fill) {
        if let Some(side) = fill.side {
            self.position.quantity += side.sign() * fill.size;
            self.position.source = PositionSource::Fills;
            self.position.updated_at = Some(fill.timestamp);
        }
        self.fills.push(fill.clone());
    }
}

/// Read-only copy of the account state at one instant.
#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot(Arc<AccountData>);

impl Deref for AccountSnapshot {
    type Target = AccountData;

    fn deref(&self) -> &AccountData {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccountDataState {
    inner: Arc<RwLock<Arc<AccountData>>>,
}

impl AccountDataState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let guard = self.inner.read();
        AccountSnapshot(Arc::clone(&*guard))
    }

    /// Optimistic SUBMITTED entry after the venue accepted a placement.
    /// A venue update that raced ahead of the REST response is left untouched.
    pub fn record_submitted(
        &self,
        id: &str,
        client_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> bool {
        let mut guard = self.inner.write();
        let data = Arc::make_mut(&mut *guard);
        if let Some(existing) = data.orders.get_mut(id) {
            existing.client_id.get_or_insert_with(|| client_id.to_string());
            existing.side.get_or_insert(side);
            existing.price.get_or_insert(price);
            debug!(order_id = %id, status = %existing.status, "Venue already reported order before submit returned");
            return false;
        }

        let now = Utc::now();
        data.orders.insert(
            id.to_string(),
            Order {
                id: id.to_string(),
                client_id: Some(client_id.to_string()),
                side: Some(side),
                price: Some(price),
                size,
                remaining_size: size,
                filled_size: Decimal::ZERO,
                avg_fill_price: None,
                status: OrderStatus::Submitted,
                last_seq: None,
                optimistic: true,
                updated_at: now,
            },
        );
        data.record_change(StatusChange {
            order_id: id.to_string(),
            previous: None,
            status: OrderStatus::Submitted,
            executed: Decimal::ZERO,
            remaining: size,
            at: now,
        });
        true
    }

    /// Optimistic CANCELLED after the venue acknowledged a cancel (or said the
    /// order is already gone). The venue feed may still overwrite it.
    pub fn mark_cancelled_locally(&self, id: &str) -> bool {
        let mut guard = self.inner.write();
        let data = Arc::make_mut(&mut *guard);
        let Some(order) = data.orders.get_mut(id) else {
            return false;
        };
        if order.status.is_terminal() {
            return false;
        }
        let previous = order.status;
        order.status = OrderStatus::Cancelled;
        order.optimistic = true;
        order.updated_at = Utc::now();
        let change = StatusChange {
            order_id: order.id.clone(),
            previous: Some(previous),
            status: OrderStatus::Cancelled,
            executed: order.filled_size,
            remaining: order.remaining_size,
            at: order.updated_at,
        };
        data.record_change(change);
        data.retire(id);
        true
    }

    /// Apply a venue-confirmed update. Venue state always wins over optimistic
    /// local state, but never reverts a venue-confirmed terminal status and
    /// never goes backwards in sequence.
    ///
    /// `adopt` is consulted (under the write guard) only for unknown order ids.
    pub fn apply_update<F>(&self, update: &OrderUpdate, adopt: F) -> ReconcileOutcome
    where
        F: FnOnce(&OrderUpdate) -> Option<Adoption>,
    {
        let mut guard = self.inner.write();
        let data = Arc::make_mut(&mut *guard);

        let outcome = match data.orders.get_mut(&update.order_id) {
            Some(order) => {
                if order.status.is_terminal() && !order.optimistic {
                    data.stale_updates += 1;
                    return ReconcileOutcome::Stale(StaleReason::TerminalSticky);
                }
                if let Some(last) = order.last_seq {
                    let reason = if update.seq < last {
                        Some(StaleReason::OutOfOrder)
                    } else if update.seq == last && !advances(order, update) {
                        Some(StaleReason::Duplicate)
                    } else {
                        None
                    };
                    if let Some(reason) = reason {
                        data.stale_updates += 1;
                        return ReconcileOutcome::Stale(reason);
                    }
                }

                let previous = order.status;
                let fill = merge_update(order, update);
                let change = StatusChange {
                    order_id: order.id.clone(),
                    previous: Some(previous),
                    status: order.status,
                    executed: order.filled_size,
                    remaining: order.remaining_size,
                    at: update.timestamp,
                };
                let retired = order.status.is_terminal() && !previous.is_terminal();
                if previous != order.status {
                    data.record_change(change);
                }
                if let Some(fill) = &fill {
                    data.apply_fill(fill);
                }
                if retired {
                    data.retire(&update.order_id);
                }
                ReconcileOutcome::Applied { fill }
            }
            None => {
                let adoption = adopt(update);
                let mut order = new_from_update(update, adoption.as_ref());
                let fill = merge_update(&mut order, update);
                data.record_change(StatusChange {
                    order_id: order.id.clone(),
                    previous: None,
                    status: order.status,
                    executed: order.filled_size,
                    remaining: order.remaining_size,
                    at: update.timestamp,
                });
                let retired = order.status.is_terminal();
                data.orders.insert(order.id.clone(), order);
                if let Some(fill) = &fill {
                    data.apply_fill(fill);
                }
                if retired {
                    data.retire(&update.order_id);
                }
                ReconcileOutcome::Inserted { fill }
            }
        };

        if let Some(order) = data.orders.get(&update.order_id) {
            log_status(order);
        }
        outcome
    }

    /// Absolute position from a venue poll. Last write wins.
    pub fn set_polled_position(&self, quantity: Decimal) {
        let mut guard = self.inner.write();
        let data = Arc::make_mut(&mut *guard);
        if data.position.quantity != quantity && data.position.source != PositionSource::Unknown {
            debug!(previous = %data.position.quantity, polled = %quantity, "Position corrected by poll");
        }
        data.position = Position {
            quantity,
            source: PositionSource::Poll,
            updated_at: Some(Utc::now()),
        };
    }
}

/// Two venue events can share a sequence (same timestamp); the later one still
/// counts when it carries more execution or a later lifecycle stage.
fn advances(order: &Order, update: &OrderUpdate) -> bool {
    update.executed_size.is_some_and(|executed| executed > order.filled_size)
        || update.status.stage() > order.status.stage()
}

fn new_from_update(update: &OrderUpdate, adoption: Option<&Adoption>) -> Order {
    let executed = update.executed_size.unwrap_or(Decimal::ZERO);
    let size = match (adoption, update.remaining_size) {
        (Some(a), _) => a.size,
        (None, Some(remaining)) => remaining + executed,
        (None, None) => executed,
    };
    Order {
        id: update.order_id.clone(),
        client_id: update
            .client_id
            .clone()
            .or_else(|| adoption.map(|a| a.client_id.clone())),
        side: update.side.or(adoption.map(|a| a.side)),
        price: update.price.or(adoption.map(|a| a.price)),
        size,
        remaining_size: size,
        filled_size: Decimal::ZERO,
        avg_fill_price: None,
        status: OrderStatus::New,
        last_seq: None,
        optimistic: false,
        updated_at: update.timestamp,
    }
}

/// Overwrite `order` with the venue's view; returns the fill implied by any
/// increase in cumulative executed size.
fn merge_update(order: &mut Order, update: &OrderUpdate) -> Option<Fill> {
    let executed = update.executed_size.unwrap_or(order.filled_size);
    let fill = if executed > order.filled_size {
        let delta = executed - order.filled_size;
        let price = incremental_price(order, update, executed, delta);
        Some(Fill {
            order_id: order.id.clone(),
            side: order.side.or(update.side),
            price,
            size: delta,
            timestamp: update.timestamp,
        })
    } else {
        None
    };

    if order.side.is_none() {
        order.side = update.side;
    }
    if order.price.is_none() {
        order.price = update.price;
    }
    if order.client_id.is_none() {
        order.client_id = update.client_id.clone();
    }
    order.status = update.status;
    order.remaining_size = match update.remaining_size {
        Some(remaining) => remaining,
        None if update.status == OrderStatus::Filled => Decimal::ZERO,
        None => (order.size - executed).max(Decimal::ZERO),
    };
    order.filled_size = executed;
    if update.avg_price.is_some() {
        order.avg_fill_price = update.avg_price;
    }
    order.last_seq = Some(update.seq);
    order.optimistic = false;
    order.updated_at = update.timestamp;
    fill
}

fn incremental_price(order: &Order, update: &OrderUpdate, executed: Decimal, delta: Decimal) -> Decimal {
    let fallback = update.price.or(order.price).unwrap_or_default();
    let Some(avg) = update.avg_price.filter(|p| !p.is_zero()) else {
        return fallback;
    };
    match order.avg_fill_price {
        Some(prev_avg) if !order.filled_size.is_zero() => {
            let notional = avg * executed - prev_avg * order.filled_size;
            notional.checked_div(delta).unwrap_or(avg)
        }
        _ => avg,
    }
}

fn log_status(order: &Order) {
    let avg = order.avg_fill_price.unwrap_or_default();
    match order.status {
        OrderStatus::Filled => {
            info!(order_id = %order.id, executed = %order.filled_size, avg_price = %avg, "Order filled");
        }
        OrderStatus::PartiallyFilled => {
            info!(
                order_id = %order.id,
                executed = %order.filled_size,
                avg_price = %avg,
                remaining = %order.remaining_size,
                "Order partially filled"
            );
        }
        OrderStatus::Cancelled if !order.filled_size.is_zero() => {
            info!(
                order_id = %order.id,
                executed = %order.filled_size,
                remaining = %order.remaining_size,
                "Order cancelled with partial fill"
            );
        }
        OrderStatus::Rejected => {
            warn!(order_id = %order.id, "Order rejected by venue");
        }
        status => debug!(order_id = %order.id, %status, "Order status"),
    }
}
