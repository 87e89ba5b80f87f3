use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::Tenant,
    errors::{ErrorResponse, ServiceError},
    services::{
        order_status::parse_status,
        orders::{OrderStats, OrderWithItems},
    },
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub order_type: String,
    pub customer_type: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub tip: Decimal,
    pub bag_fee: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub payment_transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Decimal>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderWithItems> for OrderResponse {
    fn from(value: OrderWithItems) -> Self {
        let OrderWithItems { order, items } = value;
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            order_type: order.order_type,
            customer_type: order.customer_type,
            subtotal: order.subtotal,
            tax: order.tax,
            tip: order.tip,
            bag_fee: order.bag_fee,
            delivery_fee: order.delivery_fee,
            total: order.total,
            payment_method: order.payment_method,
            payment_transaction_id: order.payment_transaction_id,
            refund_amount: order.refund_amount,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    name: item.name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                    image_url: item.image_url,
                })
                .collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: String,
    pub refund_transaction_id: String,
    pub refund_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// The caller's own orders, newest first.
#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "orders",
    responses((status = 200, description = "Orders for the authenticated customer")),
    security(("bearer_auth" = []))
)]
pub async fn list_own(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let services = state.services(&tenant);
    let orders = services.orders.list_for_customer(user.id).await?;
    Ok(Json(ApiResponse::ok(
        orders.into_iter().map(OrderResponse::from).collect(),
    )))
}

/// Fetch one order. Guest orders are trackable without authentication by
/// their opaque id; customer orders require the owner or an operator.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order"),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<AppState>,
    tenant: Tenant,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let services = state.services(&tenant);
    let order = services.orders.get(id).await?;

    if let Some(owner) = order.order.customer_id {
        let user = user
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;
        if user.id != owner && !user.is_operator() {
            return Err(ServiceError::Forbidden(
                "order belongs to another customer".to_string(),
            ));
        }
    }

    Ok(Json(ApiResponse::ok(order.into())))
}

/// Drive an order through the lifecycle state machine. Operator only.
#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Transition not allowed", body = ErrorResponse),
        (status = 409, description = "Concurrent modification", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    user.require_operator()?;
    let target = parse_status(&req.status)?;
    let services = state.services(&tenant);
    services.state_machine.transition(id, target).await?;
    let order = services.orders.get(id).await?;
    Ok(Json(ApiResponse::ok(order.into())))
}

/// Dashboard counters. Operator only.
#[utoipa::path(
    get,
    path = "/api/orders/stats",
    tag = "orders",
    responses((status = 200, description = "Store-wide order counters")),
    security(("bearer_auth" = []))
)]
pub async fn stats(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
) -> Result<Json<ApiResponse<OrderStats>>, ServiceError> {
    user.require_operator()?;
    let services = state.services(&tenant);
    Ok(Json(ApiResponse::ok(services.orders.stats().await?)))
}
