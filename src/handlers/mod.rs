pub mod checkout;
pub mod guest;
pub mod orders;
pub mod payment_methods;
pub mod realtime;

use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::AppState;

/// All API routes. The tenant header is resolved per handler through the
/// `Tenant` extractor; `/health` and the websocket upgrade are the only
/// tenant-free endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/checkout/process", post(checkout::process))
        .route(
            "/api/checkout/process-saved-card",
            post(checkout::process_saved_card),
        )
        .route("/api/checkout/refund", post(checkout::refund))
        .route("/api/guest/checkout", post(guest::checkout))
        .route(
            "/api/checkout/add-payment-method",
            post(payment_methods::add),
        )
        .route(
            "/api/checkout/payment-method/:id",
            delete(payment_methods::remove),
        )
        .route(
            "/api/checkout/payment-methods",
            get(payment_methods::list),
        )
        .route(
            "/api/checkout/validate-payment-methods",
            post(payment_methods::validate),
        )
        .route(
            "/api/checkout/sync-payment-methods",
            post(payment_methods::sync),
        )
        .route("/api/orders", get(orders::list_own))
        .route("/api/orders/:id", get(orders::get_one))
        .route("/api/orders/:id/status", put(orders::update_status))
        .route("/api/orders/stats", get(orders::stats))
        .route("/api/realtime/ws", get(realtime::ws_upgrade))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is healthy"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
