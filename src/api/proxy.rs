use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use super::common::ApiResponse;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProxyStatus {
    pub models: Vec<String>,
    pub logged_requests: usize,
    pub debug: bool,
}

pub async fn get_proxy_status(State(state): State<Arc<AppState>>) -> Response {
    let models = state
        .registry
        .client_ids()
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    ApiResponse::ok(ProxyStatus {
        models,
        logged_requests: state.log_store.len(),
        debug: state.debug,
    })
    .into_response()
}
