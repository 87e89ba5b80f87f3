use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    db::Tenant,
    errors::{ErrorResponse, ServiceError},
    gateway::{Address, PaymentToken},
    handlers::orders::{OrderResponse, RefundResponse},
    services::{
        checkout::{CheckoutInput, Funding, OrderType},
        pricing::{CartItemInput, Fees},
    },
    ApiResponse, AppState,
};

/// Cart fields shared by every checkout request.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartPayload {
    #[validate(length(min = 1))]
    pub items: Vec<CartItemInput>,
    /// Client-declared grand total; the server recomputes and compares.
    pub amount: Decimal,
    #[serde(default)]
    pub tip: Decimal,
    #[serde(default)]
    pub bag_fee: Decimal,
    #[serde(default)]
    pub delivery_fee: Decimal,
    #[serde(default)]
    pub order_type: OrderType,
    #[validate]
    pub billing_address: Address,
    #[validate]
    pub shipping_address: Option<Address>,
}

impl CartPayload {
    pub fn into_input(self) -> CheckoutInput {
        CheckoutInput {
            items: self.items,
            fees: Fees {
                tip: self.tip,
                bag_fee: self.bag_fee,
                delivery_fee: self.delivery_fee,
            },
            declared_amount: self.amount,
            order_type: self.order_type,
            bill_to: self.billing_address,
            ship_to: self.shipping_address,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(flatten)]
    #[validate]
    pub cart: CartPayload,
    pub payment_token: PaymentToken,
    #[serde(default)]
    pub save_card: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSavedCardRequest {
    #[serde(flatten)]
    #[validate]
    pub cart: CartPayload,
    pub payment_method_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub transaction_id: String,
    /// Refund amount; the full order total when omitted.
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

/// New-card checkout for an authenticated customer.
#[utoipa::path(
    post,
    path = "/api/checkout/process",
    tag = "checkout",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Order placed"),
        (status = 400, description = "Validation, pricing or duplicate rejection", body = ErrorResponse),
        (status = 502, description = "Gateway declined the charge", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn process(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    req.validate()?;
    let services = state.services(&tenant);
    let email = user.email.clone().unwrap_or_default();
    let order = services
        .checkout
        .process_customer(
            user.id,
            email,
            req.cart.into_input(),
            Funding::Token {
                token: req.payment_token,
                save_card: req.save_card,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(order.into())))
}

/// Checkout paying with an already vaulted card.
#[utoipa::path(
    post,
    path = "/api/checkout/process-saved-card",
    tag = "checkout",
    request_body = ProcessSavedCardRequest,
    responses(
        (status = 200, description = "Order placed"),
        (status = 404, description = "Saved card not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn process_saved_card(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
    Json(req): Json<ProcessSavedCardRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    req.validate()?;
    let services = state.services(&tenant);
    let email = user.email.clone().unwrap_or_default();
    let order = services
        .checkout
        .process_customer(
            user.id,
            email,
            req.cart.into_input(),
            Funding::SavedInstrument {
                instrument_id: req.payment_method_id,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(order.into())))
}

/// Refund a captured charge by its gateway transaction id. Operator only.
#[utoipa::path(
    post,
    path = "/api/checkout/refund",
    tag = "checkout",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund issued"),
        (status = 404, description = "No order for that transaction", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn refund(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
    Json(req): Json<RefundRequest>,
) -> Result<Json<ApiResponse<RefundResponse>>, ServiceError> {
    user.require_operator()?;
    let services = state.services(&tenant);
    let order = services
        .orders
        .find_by_transaction(&req.transaction_id)
        .await?
        .ok_or_else(|| ServiceError::OrderNotFound(req.transaction_id.clone()))?;
    let outcome = services
        .checkout
        .refund(order.id, req.amount, req.reason)
        .await?;
    Ok(Json(ApiResponse::ok(RefundResponse {
        order_id: outcome.order.id,
        order_number: outcome.order.order_number,
        status: outcome.order.status,
        refund_transaction_id: outcome.refund_transaction_id,
        refund_amount: outcome.order.refund_amount,
    })))
}
