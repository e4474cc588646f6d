use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub mod common;
mod logs;
mod proxy;

pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Proxy
        .route("/api/proxy/status", get(proxy::get_proxy_status))
        // Logs
        .route("/api/proxy/logs", get(logs::get_proxy_logs))
        .route("/api/proxy/logs/clear", post(logs::clear_proxy_logs))
        // Health
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}
