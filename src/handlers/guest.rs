use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::Tenant,
    errors::{ErrorResponse, ServiceError},
    gateway::PaymentToken,
    handlers::{checkout::CartPayload, orders::OrderResponse},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfo {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7))]
    pub phone: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestCheckoutRequest {
    #[serde(flatten)]
    #[validate]
    pub cart: CartPayload,
    #[validate]
    pub guest_info: GuestInfo,
    pub payment_token: PaymentToken,
}

/// Guest checkout: no account, contact info required, card never saved.
#[utoipa::path(
    post,
    path = "/api/guest/checkout",
    tag = "checkout",
    request_body = GuestCheckoutRequest,
    responses(
        (status = 200, description = "Order placed"),
        (status = 400, description = "Missing contact info or pricing rejection", body = ErrorResponse)
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(req): Json<GuestCheckoutRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    req.cart.validate()?;
    req.guest_info
        .validate()
        .map_err(|_| ServiceError::MissingGuestContact)?;
    let services = state.services(&tenant);
    let order = services
        .checkout
        .process_guest(
            &req.guest_info.email,
            &req.guest_info.phone,
            req.cart.into_input(),
            req.payment_token,
        )
        .await?;
    Ok(Json(ApiResponse::ok(order.into())))
}
