// Roxom REST command client
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::roxom_types::{
    net_position, ApiResponse, CancelAllRequest, OrdersData, PlaceOrderData, PlaceOrderRequest,
    PositionsData,
};
use super::VenueClient;
use crate::config::VenueSettings;
use crate::engine::types::{NewOrder, OrderId, OrderUpdate};
use crate::error::{VenueError, VenueResult};

pub const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Debug, Clone)]
pub struct RoxomClient {
    http: reqwest::Client,
    base_url: String,
    inst_type: String,
    order_type: String,
    time_in_force: String,
}

impl RoxomClient {
    pub fn new(settings: &VenueSettings) -> VenueResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&settings.api_key)
            .map_err(|e| VenueError::Transport(format!("invalid api key header: {e}")))?;
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            inst_type: settings.inst_type.clone(),
            order_type: settings.order_type.clone(),
            time_in_force: settings.time_in_force.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> VenueResult<ApiResponse<T>> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;
        decode(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> VenueResult<ApiResponse<T>> {
        let resp = self.http.get(self.url(path)).query(query).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> VenueResult<ApiResponse<T>> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(classify(status, &text));
    }
    let parsed: ApiResponse<T> =
        serde_json::from_str(&text).map_err(|e| VenueError::Decode(e.to_string()))?;
    if parsed.success == Some(false) {
        let msg = parsed.msg.unwrap_or_else(|| text.clone());
        return Err(classify(StatusCode::BAD_REQUEST, &msg));
    }
    Ok(parsed)
}

/// Map a non-success HTTP response onto the venue error taxonomy.
pub fn classify(status: StatusCode, body: &str) -> VenueError {
    let lowered = body.to_ascii_lowercase();
    match status {
        StatusCode::NOT_FOUND => VenueError::NotFound,
        StatusCode::CONFLICT | StatusCode::GONE => VenueError::AlreadyTerminal,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => VenueError::Timeout,
        s if s.is_client_error() && lowered.contains("already") => VenueError::AlreadyTerminal,
        s if s.is_client_error() && lowered.contains("not found") => VenueError::NotFound,
        s if s.is_client_error() => VenueError::Rejected(format!("{status}: {body}")),
        _ => VenueError::Transport(format!("{status}: {body}")),
    }
}

#[async_trait]
impl VenueClient for RoxomClient {
    async fn submit_order(&self, order: &NewOrder) -> VenueResult<OrderId> {
        let body = PlaceOrderRequest {
            symbol: &order.symbol,
            inst_type: &self.inst_type,
            order_type: &self.order_type,
            side: order.side.as_str(),
            qty: order.size.to_string(),
            px: order.price.to_string(),
            time_in_force: &self.time_in_force,
            client_order_id: &order.client_id,
        };
        debug!(client_id = %order.client_id, side = %order.side, px = %order.price, qty = %order.size, "Submitting order");
        let resp: ApiResponse<PlaceOrderData> = self.post("/api/v1/orders", Some(&body)).await?;
        resp.data
            .map(|d| d.order_id)
            .ok_or_else(|| VenueError::Decode("order placement response carried no orderId".into()))
    }

    async fn cancel_order(&self, order_id: &str) -> VenueResult<()> {
        let path = format!("/api/v1/orders/{order_id}/cancel");
        let _: ApiResponse<serde_json::Value> = self.post::<(), _>(&path, None).await?;
        Ok(())
    }

    async fn cancel_all(&self, symbol: &str) -> VenueResult<()> {
        let body = CancelAllRequest {
            symbol,
            inst_type: &self.inst_type,
        };
        let _: ApiResponse<serde_json::Value> = self.post("/api/v1/orders/cancel-all", Some(&body)).await?;
        Ok(())
    }

    async fn open_orders(&self, symbol: &str) -> VenueResult<Vec<OrderUpdate>> {
        let resp: ApiResponse<OrdersData> =
            self.get("/api/v1/orders", &[("instType", self.inst_type.as_str())]).await?;
        let orders = resp.data.map(|d| d.orders).unwrap_or_default();
        let updates = orders
            .into_iter()
            .filter(|o| o.symbol.as_deref().map_or(true, |s| s == symbol))
            .filter_map(|o| {
                let id = o.id.clone();
                let update = o.into_update(0);
                if update.is_none() {
                    warn!(order_id = %id, "Skipping open order with unrecognised status");
                }
                update
            })
            .filter(|u| u.status.is_active())
            .collect();
        Ok(updates)
    }

    async fn position(&self, symbol: &str) -> VenueResult<Decimal> {
        let resp: ApiResponse<PositionsData> = self
            .get(
                "/api/v1/positions",
                &[("instType", self.inst_type.as_str()), ("symbol", symbol)],
            )
            .await?;
        Ok(resp.data.map(|d| net_position(&d.positions)).unwrap_or_default())
    }
}
