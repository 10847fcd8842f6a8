// OrderManager: turns target quotes into cancel/place commands and keeps the
// local order view consistent with what the venue reports.
//
// Submit and cancel calls are bounded by `call_timeout`. A call that times out
// (or fails in transport) has an unknown outcome: the order may or may not
// exist. Such calls are remembered as in-flight until the venue feed resolves
// them or `pending_ttl` elapses, and the affected side is left alone meanwhile,
// so a slow venue never produces duplicate resting orders.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::account::state::{AccountDataState, AccountSnapshot, Adoption, ReconcileOutcome};
use crate::engine::risk::ActionTally;
use crate::engine::types::{NewOrder, OrderId, OrderUpdate, QuoteIntent, Side};
use crate::error::{VenueError, VenueResult};
use crate::venue::VenueClient;

#[derive(Debug, Clone)]
pub struct OrderManagerConfig {
    pub symbol: String,
    pub call_timeout: Duration,
    pub pending_ttl: Duration,
}

#[derive(Debug, Clone)]
struct PendingPlacement {
    client_id: String,
    side: Side,
    price: Decimal,
    size: Decimal,
    since: Instant,
}

#[derive(Debug, Default)]
struct InFlight {
    placements: Vec<PendingPlacement>,
    cancels: HashMap<OrderId, Instant>,
}

impl InFlight {
    fn expire(&mut self, ttl: Duration) {
        let now = Instant::now();
        self.placements.retain(|p| {
            let live = now.duration_since(p.since) < ttl;
            if !live {
                warn!(client_id = %p.client_id, side = %p.side, "Unresolved placement expired");
            }
            live
        });
        self.cancels.retain(|id, since| {
            let live = now.duration_since(*since) < ttl;
            if !live {
                warn!(order_id = %id, "Unresolved cancel expired");
            }
            live
        });
    }

    fn placement_pending(&self, side: Side) -> bool {
        self.placements.iter().any(|p| p.side == side)
    }

    /// Attribute an unknown venue order to an unresolved placement: by client
    /// id, then by side, then (side unknown) the only one outstanding.
    fn adopt(&mut self, update: &OrderUpdate) -> Option<Adoption> {
        let idx = update
            .client_id
            .as_deref()
            .and_then(|cid| self.placements.iter().position(|p| p.client_id == cid))
            .or_else(|| match update.side {
                Some(side) => self.placements.iter().position(|p| p.side == side),
                None => (self.placements.len() == 1).then_some(0),
            })?;
        let p = self.placements.remove(idx);
        info!(order_id = %update.order_id, client_id = %p.client_id, side = %p.side, "Adopted order from unresolved placement");
        Some(Adoption {
            client_id: p.client_id,
            side: p.side,
            price: p.price,
            size: p.size,
        })
    }
}

/// A resting order as the diff sees it.
#[derive(Debug, Clone)]
struct Resting {
    id: OrderId,
    price: Option<Decimal>,
}

impl Resting {
    fn on_side(snapshot: &AccountSnapshot, side: Side) -> Vec<Resting> {
        snapshot
            .active_on_side(side)
            .into_iter()
            .map(|o| Resting { id: o.id.clone(), price: o.price })
            .collect()
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub placed: Vec<OrderId>,
    pub cancelled: Vec<OrderId>,
    pub kept: Vec<OrderId>,
    /// Sides left alone because an earlier call is still unresolved.
    pub waiting: Vec<Side>,
    /// Sides whose replacement was withheld after a failed cancel.
    pub blocked: Vec<Side>,
    #[serde(skip)]
    pub tally: ActionTally,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.placed.extend(other.placed);
        self.cancelled.extend(other.cancelled);
        self.kept.extend(other.kept);
        self.waiting.extend(other.waiting);
        self.blocked.extend(other.blocked);
        self.tally.cancels_acked += other.tally.cancels_acked;
        self.tally.cancel_failures += other.tally.cancel_failures;
        self.tally.placed += other.tally.placed;
        self.tally.rejected += other.tally.rejected;
    }
}

/// Result of cancelling everything on shutdown or HALT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlattenReport {
    pub confirmed: Vec<OrderId>,
    pub unconfirmed: Vec<OrderId>,
    /// Client ids of placements whose outcome was never learned.
    pub unresolved_placements: Vec<String>,
}

impl FlattenReport {
    pub fn is_clean(&self) -> bool {
        self.unconfirmed.is_empty() && self.unresolved_placements.is_empty()
    }
}

pub struct OrderManager {
    venue: Arc<dyn VenueClient>,
    account: AccountDataState,
    config: OrderManagerConfig,
    inflight: Mutex<InFlight>,
    session: i64,
    next_client_seq: AtomicU64,
}

impl OrderManager {
    pub fn new(venue: Arc<dyn VenueClient>, account: AccountDataState, config: OrderManagerConfig) -> Self {
        Self {
            venue,
            account,
            config,
            inflight: Mutex::new(InFlight::default()),
            session: Utc::now().timestamp_millis(),
            next_client_seq: AtomicU64::new(1),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn account(&self) -> &AccountDataState {
        &self.account
    }

    fn next_client_id(&self) -> String {
        let n = self.next_client_seq.fetch_add(1, Ordering::Relaxed);
        format!("fmm-{}-{}", self.session, n)
    }

    async fn bounded<T>(&self, call: impl Future<Output = VenueResult<T>>) -> VenueResult<T> {
        match timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        }
    }

    pub fn pending_placements(&self) -> usize {
        self.inflight.lock().placements.len()
    }

    pub fn pending_cancels(&self) -> usize {
        self.inflight.lock().cancels.len()
    }

    /// Submit one order. On success the order is recorded as SUBMITTED.
    /// A timeout or transport failure leaves the placement unresolved until
    /// the venue feed shows the order or the pending TTL runs out.
    pub async fn place(&self, side: Side, price: Decimal, size: Decimal) -> VenueResult<OrderId> {
        let order = NewOrder {
            client_id: self.next_client_id(),
            symbol: self.config.symbol.clone(),
            side,
            price,
            size,
        };

        match self.bounded(self.venue.submit_order(&order)).await {
            Ok(id) => {
                self.account
                    .record_submitted(&id, &order.client_id, side, price, size);
                metrics::counter!("fairmm_orders_placed_total", "side" => side.as_str()).increment(1);
                info!(order_id = %id, %side, %price, %size, "Order placed");
                Ok(id)
            }
            Err(VenueError::Rejected(reason)) => {
                metrics::counter!("fairmm_orders_rejected_total", "side" => side.as_str()).increment(1);
                warn!(%side, %price, %reason, "Order rejected");
                Err(VenueError::Rejected(reason))
            }
            Err(e) => {
                warn!(%side, %price, client_id = %order.client_id, error = %e, "Placement outcome unknown, waiting for venue feed");
                self.inflight.lock().placements.push(PendingPlacement {
                    client_id: order.client_id,
                    side,
                    price,
                    size,
                    since: Instant::now(),
                });
                Err(e)
            }
        }
    }

    /// Request cancellation of one order. Ok means the venue acknowledged it;
    /// NotFound / AlreadyTerminal mean it is no longer resting.
    pub async fn cancel(&self, order_id: &str) -> VenueResult<()> {
        if let Some(order) = self.account.snapshot().order(order_id) {
            if order.status.is_terminal() && !order.optimistic {
                return Err(VenueError::AlreadyTerminal);
            }
        }

        self.inflight
            .lock()
            .cancels
            .insert(order_id.to_string(), Instant::now());

        let result = self.bounded(self.venue.cancel_order(order_id)).await;
        match &result {
            Ok(()) => {
                self.inflight.lock().cancels.remove(order_id);
                self.account.mark_cancelled_locally(order_id);
                debug!(%order_id, "Cancel acknowledged");
            }
            Err(e) if e.means_gone() => {
                self.inflight.lock().cancels.remove(order_id);
                self.account.mark_cancelled_locally(order_id);
                debug!(%order_id, error = %e, "Cancel target already gone");
            }
            Err(VenueError::Rejected(reason)) => {
                self.inflight.lock().cancels.remove(order_id);
                warn!(%order_id, %reason, "Cancel rejected");
            }
            Err(e) => {
                warn!(%order_id, error = %e, "Cancel outcome unknown, waiting for venue feed");
            }
        }
        if result.as_ref().is_err_and(|e| !e.means_gone()) {
            metrics::counter!("fairmm_cancel_failures_total").increment(1);
        }
        result
    }

    /// Apply one venue update. Unknown ids are matched against unresolved placements.
    pub fn reconcile(&self, update: &OrderUpdate) -> ReconcileOutcome {
        let outcome = self
            .account
            .apply_update(update, |u| self.inflight.lock().adopt(u));

        if outcome.is_stale() {
            metrics::counter!("fairmm_stale_updates_total").increment(1);
            debug!(order_id = %update.order_id, status = %update.status, seq = update.seq, ?outcome, "Stale order update dropped");
        } else if update.status.is_terminal() {
            self.inflight.lock().cancels.remove(&update.order_id);
        }
        outcome
    }

    /// Load resting orders at startup so existing orders are managed, not duplicated.
    pub async fn hydrate(&self) -> VenueResult<usize> {
        let updates = self.bounded(self.venue.open_orders(&self.config.symbol)).await?;
        let count = updates.len();
        for update in &updates {
            self.reconcile(update);
        }
        info!(count, symbol = %self.config.symbol, "Hydrated open orders");
        Ok(count)
    }

    /// Converge resting orders toward `intents` (one per side).
    pub async fn sync_quotes(&self, intents: &[QuoteIntent], snapshot: AccountSnapshot) -> CycleReport {
        self.inflight.lock().expire(self.config.pending_ttl);

        // the snapshot is released before the first venue call
        let strays: Vec<OrderId> = snapshot.stray_orders().iter().map(|o| o.id.clone()).collect();
        let plans: Vec<(QuoteIntent, Vec<Resting>)> = intents
            .iter()
            .map(|intent| (*intent, Resting::on_side(&snapshot, intent.side)))
            .collect();
        drop(snapshot);

        let mut report = self.cancel_strays(strays).await;
        let sides = join_all(plans.into_iter().map(|(intent, resting)| self.sync_side(intent, resting))).await;
        for side in sides {
            report.merge(side);
        }
        report
    }

    async fn cancel_strays(&self, mut strays: Vec<OrderId>) -> CycleReport {
        let mut report = CycleReport::default();
        {
            let inflight = self.inflight.lock();
            strays.retain(|id| !inflight.cancels.contains_key(id));
        }
        if strays.is_empty() {
            return report;
        }
        warn!(count = strays.len(), "Cancelling orders that cannot be attributed to a side");
        self.cancel_batch(&strays, &mut report).await;
        report
    }

    /// Returns true when every cancel is confirmed.
    async fn cancel_batch(&self, ids: &[OrderId], report: &mut CycleReport) -> bool {
        let results = join_all(ids.iter().map(|id| self.cancel(id))).await;
        let mut all_confirmed = true;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(()) => {
                    report.tally.cancels_acked += 1;
                    report.cancelled.push(id.clone());
                }
                Err(e) if e.means_gone() => report.cancelled.push(id.clone()),
                Err(_) => {
                    report.tally.cancel_failures += 1;
                    all_confirmed = false;
                }
            }
        }
        all_confirmed
    }

    async fn sync_side(&self, intent: QuoteIntent, resting: Vec<Resting>) -> CycleReport {
        let mut report = CycleReport::default();
        let side = intent.side;

        let waiting = {
            let inflight = self.inflight.lock();
            inflight.placement_pending(side) || resting.iter().any(|o| inflight.cancels.contains_key(&o.id))
        };
        if waiting {
            debug!(%side, "Side has unresolved venue calls, leaving it untouched");
            report.waiting.push(side);
            return report;
        }

        if let [order] = resting.as_slice() {
            if order.price == Some(intent.price) {
                report.kept.push(order.id.clone());
                return report;
            }
        }

        let stale: Vec<OrderId> = resting.iter().map(|o| o.id.clone()).collect();
        if !stale.is_empty() && !self.cancel_batch(&stale, &mut report).await {
            warn!(%side, "Cancel not confirmed, withholding replacement");
            report.blocked.push(side);
            return report;
        }

        match self.place(side, intent.price, intent.size).await {
            Ok(id) => {
                report.tally.placed += 1;
                report.placed.push(id);
            }
            Err(VenueError::Rejected(_)) => report.tally.rejected += 1,
            Err(_) => report.waiting.push(side),
        }
        report
    }

    /// Cancel every order for the symbol, falling back to one-by-one cancels
    /// when the bulk call fails. Anything not confirmed is reported.
    pub async fn flatten(&self) -> FlattenReport {
        let active: Vec<OrderId> = self
            .account
            .snapshot()
            .active_orders()
            .map(|o| o.id.clone())
            .collect();
        let mut report = FlattenReport::default();

        match self.bounded(self.venue.cancel_all(&self.config.symbol)).await {
            Ok(()) => {
                for id in &active {
                    self.account.mark_cancelled_locally(id);
                }
                let mut inflight = self.inflight.lock();
                inflight.cancels.clear();
                inflight.placements.clear();
                report.confirmed = active;
                info!(count = report.confirmed.len(), symbol = %self.config.symbol, "Cancel-all acknowledged");
            }
            Err(e) => {
                warn!(error = %e, "Cancel-all failed, cancelling orders individually");
                let results = join_all(active.iter().map(|id| self.cancel(id))).await;
                for (id, result) in active.into_iter().zip(results) {
                    match result {
                        Ok(()) => report.confirmed.push(id),
                        Err(e) if e.means_gone() => report.confirmed.push(id),
                        Err(_) => report.unconfirmed.push(id),
                    }
                }
                report.unresolved_placements = self
                    .inflight
                    .lock()
                    .placements
                    .iter()
                    .map(|p| p.client_id.clone())
                    .collect();
            }
        }

        for id in &report.unconfirmed {
            error!(order_id = %id, "Could not confirm cancellation, order may still be resting");
        }
        for client_id in &report.unresolved_placements {
            error!(%client_id, "Placement outcome never confirmed, order may be resting");
        }
        report
    }
}
