// Venue integration: command client seam + Roxom implementations
pub mod poller;      // periodic absolute position poll
pub mod roxom;       // REST command client
pub mod roxom_types; // wire types for REST and the private WebSocket
pub mod user_feed;   // private order-status feed -> OrderManager::reconcile

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::engine::types::{NewOrder, OrderId, OrderUpdate};
use crate::error::VenueResult;

/// Commands the core issues against the venue. Every call may fail with
/// Rejected, Timeout or Transport; callers bound each call with their own timeout.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn submit_order(&self, order: &NewOrder) -> VenueResult<OrderId>;

    async fn cancel_order(&self, order_id: &str) -> VenueResult<()>;

    async fn cancel_all(&self, symbol: &str) -> VenueResult<()>;

    /// Currently open orders, as venue updates, for startup hydration.
    async fn open_orders(&self, symbol: &str) -> VenueResult<Vec<OrderUpdate>>;

    /// Signed position: long positive, short negative.
    async fn position(&self, symbol: &str) -> VenueResult<Decimal>;
}
