// Wire types for the Roxom REST API and private WebSocket.
// Quantities and prices arrive as strings, e.g. "1.00", "0.04990000".
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::types::{OrderStatus, OrderUpdate, Side};
use crate::market_data::normaliser::Normaliser;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest<'a> {
    pub symbol: &'a str,
    pub inst_type: &'a str,
    pub order_type: &'a str,
    pub side: &'a str,
    pub qty: String,
    pub px: String,
    pub time_in_force: &'a str,
    pub client_order_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllRequest<'a> {
    pub symbol: &'a str,
    pub inst_type: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderData {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrdersData {
    #[serde(default)]
    pub orders: Vec<RestOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestOrder {
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub px: Option<String>,
    #[serde(default)]
    pub executed_qty: Option<String>,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<Value>,
}

impl RestOrder {
    /// Hydration view of a REST order. Orders with an unknown status are skipped.
    pub fn into_update(self, seq: u64) -> Option<OrderUpdate> {
        let status = OrderStatus::from_venue(self.status.as_deref()?)?;
        let executed = self.executed_qty.as_deref().and_then(Normaliser::parse);
        let qty = self.qty.as_deref().and_then(Normaliser::parse);
        Some(OrderUpdate {
            order_id: self.id,
            client_id: self.client_order_id,
            side: self.side.as_deref().and_then(Side::parse),
            price: self.px.as_deref().and_then(Normaliser::parse),
            status,
            remaining_size: qty.map(|q| (q - executed.unwrap_or_default()).max(Decimal::ZERO)),
            executed_size: executed,
            avg_price: None,
            seq,
            timestamp: self.created_at.as_ref().and_then(parse_timestamp).unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PositionsData {
    #[serde(default)]
    pub positions: Vec<RestPosition>,
}

#[derive(Debug, Deserialize)]
pub struct RestPosition {
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

/// Signed sum over position legs: long adds, short subtracts.
pub fn net_position(positions: &[RestPosition]) -> Decimal {
    positions
        .iter()
        .filter_map(|p| {
            let size = p.size.as_deref().and_then(Normaliser::parse)?;
            let side = p.side.as_deref().and_then(Side::parse)?;
            Some(side.sign() * size)
        })
        .sum()
}

// Private feed payload for `{"type": "order", "data": {...}}`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WsOrder {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub px: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub remaining_qty: Option<String>,
    #[serde(default)]
    pub executed_qty: Option<String>,
    #[serde(default)]
    pub avg_px: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub seq: Option<u64>,
}

impl WsOrder {
    /// Without a `seq` the sequence is the event time in microseconds (or
    /// `received_at` when the message has no timestamp either).
    pub fn into_update(self, received_at: DateTime<Utc>) -> Option<OrderUpdate> {
        let order_id = self.order_id?;
        let status = OrderStatus::from_venue(self.status.as_deref()?)?;
        let timestamp = self.timestamp.as_ref().and_then(parse_timestamp);
        let seq = self
            .seq
            .unwrap_or_else(|| micros(timestamp.unwrap_or(received_at)));
        Some(OrderUpdate {
            order_id,
            client_id: self.client_order_id,
            side: self.side.as_deref().and_then(Side::parse),
            price: self.px.as_deref().and_then(Normaliser::parse),
            status,
            remaining_size: self.remaining_qty.as_deref().and_then(Normaliser::parse),
            executed_size: self.executed_qty.as_deref().and_then(Normaliser::parse),
            avg_price: self.avg_px.as_deref().and_then(Normaliser::parse),
            seq,
            timestamp: timestamp.unwrap_or(received_at),
        })
    }
}

#[derive(Debug, Clone)]
pub enum UserMessage {
    Event {
        event: String,
        code: Option<String>,
        msg: Option<String>,
        conn_id: Option<String>,
    },
    Order(WsOrder),
    Balance(Value),
    Unknown(Value),
}

pub fn parse_user_message(text: &str) -> Result<UserMessage, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    if let Some(event) = value.get("event").and_then(Value::as_str) {
        let field = |name: &str| value.get(name).map(value_to_string);
        return Ok(UserMessage::Event {
            event: event.to_string(),
            code: field("code"),
            msg: field("msg"),
            conn_id: field("connId"),
        });
    }
    match value.get("type").and_then(Value::as_str) {
        Some("order") => {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            Ok(UserMessage::Order(serde_json::from_value(data)?))
        }
        Some("balance") => Ok(UserMessage::Balance(value.get("data").cloned().unwrap_or(Value::Null))),
        _ => Ok(UserMessage::Unknown(value)),
    }
}

fn micros(t: DateTime<Utc>) -> u64 {
    t.timestamp_micros().max(0) as u64
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accepts RFC 3339, naive ISO 8601 (assumed UTC), or epoch seconds/milliseconds.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => epoch_to_utc(n.as_i64()?),
        Value::String(s) => {
            if let Ok(n) = s.parse::<i64>() {
                return epoch_to_utc(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

fn epoch_to_utc(n: i64) -> Option<DateTime<Utc>> {
    // above 10^12 it's milliseconds
    if n > 1_000_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}
