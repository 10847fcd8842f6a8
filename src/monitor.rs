// Read-only HTTP monitoring surface
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::account::state::AccountDataState;
use crate::engine::risk::RiskGuard;
use crate::market_data::state::MarketDataState;
use crate::shutdown::Shutdown;
use crate::strategy::quoting::SharedQuoterStatus;

const RECENT_HISTORY: usize = 50;

pub struct MonitorState {
    pub symbol: String,
    pub market: MarketDataState,
    pub account: AccountDataState,
    pub risk: Arc<RiskGuard>,
    pub quoter: SharedQuoterStatus,
    pub started: Instant,
}

pub fn router(state: Arc<MonitorState>) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/quotes", get(api_quotes))
        .route("/api/market", get(api_market))
        .route("/api/orders", get(api_orders))
        .route("/api/position", get(api_position))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<MonitorState>, mut shutdown: Shutdown) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Monitor listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}

async fn api_status(State(state): State<Arc<MonitorState>>) -> Json<Value> {
    let quoter = state.quoter.read().clone();
    let risk = state.risk.status();
    Json(json!({
        "symbol": state.symbol,
        "state": quoter.state,
        "uptime_secs": state.started.elapsed().as_secs(),
        "cycles": quoter.cycles,
        "skipped_cycles": quoter.skipped_cycles,
        "last_cycle_at": quoter.last_cycle_at,
        "last_skip_reason": quoter.last_skip_reason,
        "halt_reason": quoter.halt_reason,
        "risk": risk,
        "risk_limits": state.risk.limits(),
    }))
}

async fn api_quotes(State(state): State<Arc<MonitorState>>) -> Json<Value> {
    let quoter = state.quoter.read().clone();
    Json(json!({
        "fair_price": quoter.last_fair_price,
        "bid": quoter.last_bid,
        "ask": quoter.last_ask,
    }))
}

async fn api_market(State(state): State<Arc<MonitorState>>) -> Json<Value> {
    let snapshot = state.market.snapshot();
    let prices: serde_json::Map<String, Value> = snapshot
        .iter()
        .map(|(symbol, px)| {
            (
                symbol.clone(),
                json!({ "bid": px.bid, "ask": px.ask, "mid": px.mid(), "timestamp": px.timestamp }),
            )
        })
        .collect();
    Json(Value::Object(prices))
}

async fn api_orders(State(state): State<Arc<MonitorState>>) -> Json<Value> {
    let account = state.account.snapshot();
    let mut active: Vec<_> = account.active_orders().collect();
    active.sort_by(|a, b| a.id.cmp(&b.id));
    let recent: Vec<_> = account.history.iter().rev().take(RECENT_HISTORY).collect();
    Json(json!({
        "active": active,
        "total": account.orders.len(),
        "summary": account.status_summary(),
        "recent": recent,
        "stale_updates": account.stale_updates,
    }))
}

async fn api_position(State(state): State<Arc<MonitorState>>) -> Json<Value> {
    let account = state.account.snapshot();
    Json(json!({
        "symbol": state.symbol,
        "position": account.position,
        "fills": account.fills.len(),
        "last_fill": account.fills.last(),
    }))
}
