// Roxom private WebSocket: order status updates -> OrderManager::reconcile
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::roxom::API_KEY_HEADER;
use super::roxom_types::{parse_user_message, UserMessage};
use crate::config::VenueSettings;
use crate::error::FeedError;
use crate::shutdown::Shutdown;
use crate::strategy::order_manager::OrderManager;

const TIMESTAMP_HEADER: &str = "X-API-TIMESTAMP";
const AUTH_FAILED_CODE: &str = "600010";

pub struct RoxomUserFeed {
    ws_url: String,
    api_key: String,
    reconnect: Duration,
}

impl RoxomUserFeed {
    pub fn new(settings: &VenueSettings) -> Self {
        Self {
            ws_url: settings.ws_url.clone(),
            api_key: settings.api_key.clone(),
            reconnect: Duration::from_millis(settings.reconnect_interval_ms),
        }
    }

    /// Listen until shutdown, reconnecting after every dropped session.
    pub async fn run(&self, orders: Arc<OrderManager>, mut shutdown: Shutdown) {
        while !shutdown.is_triggered() {
            match self.session(&orders, &mut shutdown).await {
                Ok(()) => info!(url = %self.ws_url, "Order feed session ended"),
                Err(FeedError::Auth(msg)) => {
                    error!(%msg, "Order feed authentication failed, check the API key");
                }
                Err(e) => warn!(error = %e, "Order feed session failed"),
            }
            if shutdown.is_triggered() {
                break;
            }
            metrics::counter!("fairmm_feed_reconnects_total", "feed" => "venue").increment(1);
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.reconnect) => {}
            }
        }
        info!("Order feed stopped");
    }

    async fn session(&self, orders: &OrderManager, shutdown: &mut Shutdown) -> Result<(), FeedError> {
        let mut request = self.ws_url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&self.api_key).map_err(|e| FeedError::Header(e.to_string()))?,
        );
        headers.insert(
            TIMESTAMP_HEADER,
            HeaderValue::from_str(&Utc::now().timestamp_millis().to_string())
                .map_err(|e| FeedError::Header(e.to_string()))?,
        );

        let (ws, _) = tokio_tungstenite::connect_async(request).await?;
        info!(url = %self.ws_url, "Order feed connected");
        let (_write, mut read) = ws.split();

        loop {
            let msg = tokio::select! {
                _ = shutdown.wait() => return Ok(()),
                msg = read.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => dispatch(&text, orders)?,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Order feed closed by server");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }
}

/// Handle one text frame. Only an authentication failure ends the session.
pub fn dispatch(text: &str, orders: &OrderManager) -> Result<(), FeedError> {
    let message = match parse_user_message(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Undecodable order feed message");
            return Ok(());
        }
    };

    match message {
        UserMessage::Event { event, code, msg, conn_id } => match event.as_str() {
            "error" if code.as_deref() == Some(AUTH_FAILED_CODE) => {
                return Err(FeedError::Auth(msg.unwrap_or_default()));
            }
            "error" => warn!(?code, ?msg, "Order feed error event"),
            _ => info!(%event, ?code, ?conn_id, "Order feed event"),
        },
        UserMessage::Order(order) => match order.into_update(Utc::now()) {
            Some(update) => {
                orders.reconcile(&update);
            }
            None => warn!("Order message without id or with unknown status"),
        },
        UserMessage::Balance(data) => debug!(%data, "Balance update"),
        UserMessage::Unknown(value) => debug!(%value, "Unhandled order feed message"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::state::AccountDataState;
    use crate::engine::types::{NewOrder, OrderId, OrderStatus, OrderUpdate};
    use crate::error::{VenueError, VenueResult};
    use crate::strategy::order_manager::OrderManagerConfig;
    use crate::venue::VenueClient;
    use rust_decimal::Decimal;

    struct Offline;

    #[async_trait::async_trait]
    impl VenueClient for Offline {
        async fn submit_order(&self, _: &NewOrder) -> VenueResult<OrderId> {
            Err(VenueError::Transport("offline".into()))
        }
        async fn cancel_order(&self, _: &str) -> VenueResult<()> {
            Err(VenueError::Transport("offline".into()))
        }
        async fn cancel_all(&self, _: &str) -> VenueResult<()> {
            Err(VenueError::Transport("offline".into()))
        }
        async fn open_orders(&self, _: &str) -> VenueResult<Vec<OrderUpdate>> {
            Ok(Vec::new())
        }
        async fn position(&self, _: &str) -> VenueResult<Decimal> {
            Ok(Decimal::ZERO)
        }
    }

    fn manager() -> OrderManager {
        OrderManager::new(
            Arc::new(Offline),
            AccountDataState::new(),
            OrderManagerConfig {
                symbol: "GOLD-BTC".into(),
                call_timeout: Duration::from_secs(1),
                pending_ttl: Duration::from_secs(10),
            },
        )
    }

    #[test]
    fn order_messages_reach_the_account() {
        let orders = manager();
        let text = r#"{"type":"order","data":{"orderId":"o1","symbol":"GOLD-BTC","status":"open","seq":7}}"#;
        dispatch(text, &orders).unwrap();
        let snap = orders.account().snapshot();
        assert_eq!(snap.order("o1").unwrap().status, OrderStatus::Open);
        assert_eq!(snap.order("o1").unwrap().last_seq, Some(7));
    }

    fn order_msg(status: &str, executed: &str, remaining: &str, ts: &str) -> String {
        format!(
            r#"{{"type":"order","data":{{"orderId":"o1","symbol":"GOLD-BTC","side":"buy","px":"0.0499",
            "status":"{status}","executedQty":"{executed}","remainingQty":"{remaining}","avgPx":"0.0499",
            "timestamp":"{ts}"}}}}"#
        )
    }

    #[test]
    fn fill_in_the_same_millisecond_is_not_dropped() {
        let orders = manager();
        dispatch(&order_msg("partiallyfilled", "0.60", "0.40", "2025-01-15T10:30:00.123100Z"), &orders).unwrap();
        dispatch(&order_msg("filled", "1.00", "0", "2025-01-15T10:30:00.123900Z"), &orders).unwrap();

        let snap = orders.account().snapshot();
        let order = snap.order("o1").unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_size, Decimal::ONE);
        assert_eq!(snap.fills.len(), 2);
        assert_eq!(snap.position.quantity, Decimal::ONE);
        assert_eq!(snap.stale_updates, 0);
        assert_eq!(snap.open_order_count(), 0);
    }

    #[test]
    fn identical_timestamps_still_apply_progress() {
        let orders = manager();
        let ts = "2025-01-15T10:30:00.123100Z";
        dispatch(&order_msg("partiallyfilled", "0.60", "0.40", ts), &orders).unwrap();
        dispatch(&order_msg("partiallyfilled", "0.60", "0.40", ts), &orders).unwrap();
        dispatch(&order_msg("filled", "1.00", "0", ts), &orders).unwrap();

        let snap = orders.account().snapshot();
        assert_eq!(snap.order("o1").unwrap().status, OrderStatus::Filled);
        assert_eq!(snap.fills.len(), 2);
        // only the exact repeat was dropped
        assert_eq!(snap.stale_updates, 1);
    }

    #[test]
    fn auth_error_ends_the_session() {
        let orders = manager();
        let text = r#"{"event":"error","code":"600010","msg":"invalid api key"}"#;
        assert!(matches!(dispatch(text, &orders), Err(FeedError::Auth(m)) if m == "invalid api key"));
    }

    #[test]
    fn noise_is_ignored() {
        let orders = manager();
        dispatch("not json", &orders).unwrap();
        dispatch(r#"{"event":"error","code":"1","msg":"throttled"}"#, &orders).unwrap();
        dispatch(r#"{"type":"balance","data":{"asset":"BTC"}}"#, &orders).unwrap();
        assert!(orders.account().snapshot().orders.is_empty());
    }
}
