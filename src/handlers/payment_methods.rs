use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    db::Tenant,
    entities::payment_instrument::Model as InstrumentModel,
    errors::{ErrorResponse, ServiceError},
    gateway::{Address, PaymentToken},
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodResponse {
    pub id: Uuid,
    pub card_type: String,
    pub last_four: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cardholder_name: String,
    pub is_default: bool,
}

impl From<InstrumentModel> for PaymentMethodResponse {
    fn from(model: InstrumentModel) -> Self {
        Self {
            id: model.id,
            card_type: model.card_type,
            last_four: model.last_four,
            expiry_month: model.expiry_month,
            expiry_year: model.expiry_year,
            cardholder_name: model.cardholder_name,
            is_default: model.is_default,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddPaymentMethodRequest {
    pub payment_token: PaymentToken,
    #[validate]
    pub billing_address: Address,
    #[serde(default)]
    pub make_default: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: Vec<PaymentMethodResponse>,
    pub removed_count: usize,
}

/// Vault a new card for the authenticated customer.
#[utoipa::path(
    post,
    path = "/api/checkout/add-payment-method",
    tag = "payment-methods",
    request_body = AddPaymentMethodRequest,
    responses(
        (status = 200, description = "Card vaulted"),
        (status = 409, description = "Vault full or card already saved", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
    Json(req): Json<AddPaymentMethodRequest>,
) -> Result<Json<ApiResponse<PaymentMethodResponse>>, ServiceError> {
    req.validate()?;
    let services = state.services(&tenant);
    let instrument = services
        .vault
        .add_instrument(user.id, &req.payment_token, &req.billing_address, req.make_default)
        .await?;
    Ok(Json(ApiResponse::ok(instrument.into())))
}

/// Remove a saved card. The gateway-side delete is best-effort.
#[utoipa::path(
    delete,
    path = "/api/checkout/payment-method/{id}",
    tag = "payment-methods",
    params(("id" = Uuid, Path, description = "Saved card id")),
    responses(
        (status = 200, description = "Card removed"),
        (status = 404, description = "Card not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PaymentMethodResponse>>>, ServiceError> {
    let services = state.services(&tenant);
    services.vault.remove_instrument(user.id, id).await?;
    let remaining = services.vault.list(user.id).await?;
    Ok(Json(ApiResponse::ok(
        remaining.into_iter().map(Into::into).collect(),
    )))
}

/// List the customer's saved cards.
#[utoipa::path(
    get,
    path = "/api/checkout/payment-methods",
    tag = "payment-methods",
    responses((status = 200, description = "Saved cards")),
    security(("bearer_auth" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<PaymentMethodResponse>>>, ServiceError> {
    let services = state.services(&tenant);
    let instruments = services.vault.list(user.id).await?;
    Ok(Json(ApiResponse::ok(
        instruments.into_iter().map(Into::into).collect(),
    )))
}

/// Drop saved cards whose gateway-side instrument no longer exists.
#[utoipa::path(
    post,
    path = "/api/checkout/validate-payment-methods",
    tag = "payment-methods",
    responses((status = 200, description = "Remaining valid cards and removal count")),
    security(("bearer_auth" = []))
)]
pub async fn validate(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
) -> Result<Json<ApiResponse<ValidateResponse>>, ServiceError> {
    let services = state.services(&tenant);
    let outcome = services.vault.reconcile(user.id).await?;
    Ok(Json(ApiResponse::ok(ValidateResponse {
        valid: outcome.valid.into_iter().map(Into::into).collect(),
        removed_count: outcome.removed.len(),
    })))
}

/// Refresh cached card display details from the gateway vault.
#[utoipa::path(
    post,
    path = "/api/checkout/sync-payment-methods",
    tag = "payment-methods",
    responses((status = 200, description = "Refreshed cards")),
    security(("bearer_auth" = []))
)]
pub async fn sync(
    State(state): State<AppState>,
    tenant: Tenant,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<PaymentMethodResponse>>>, ServiceError> {
    let services = state.services(&tenant);
    let refreshed = services.vault.sync_details(user.id).await?;
    Ok(Json(ApiResponse::ok(
        refreshed.into_iter().map(Into::into).collect(),
    )))
}
