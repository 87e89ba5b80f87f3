use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::gateway::GatewayError;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    // Validation: caller error, nothing happened yet.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cart is empty or invalid: {0}")]
    InvalidCartItems(String),

    #[error("Email and phone number are required for guest checkout")]
    MissingGuestContact,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Amount mismatch: declared {declared}, computed {computed}")]
    AmountMismatch { declared: Decimal, computed: Decimal },

    #[error("Store database header is required")]
    MissingTenant,

    #[error("Unknown store database: {0}")]
    UnknownTenant(String),

    // Conflict: well-formed request the current state rejects.
    #[error("Duplicate transaction detected. Please wait before trying again.")]
    DuplicateTransaction,

    #[error("Cannot transition order from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Payment method limit reached (maximum 3 saved cards)")]
    VaultFull,

    #[error("This card is already saved to your account")]
    InstrumentAlreadySaved,

    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(Uuid),

    // External payment gateway.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway timed out")]
    GatewayTimeout,

    #[error("Payment gateway configuration error")]
    GatewayConfigMissing,

    // Not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Payment method not found: {0}")]
    InstrumentNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    // Auth.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ConfigMissing => ServiceError::GatewayConfigMissing,
            GatewayError::Timeout => ServiceError::GatewayTimeout,
            GatewayError::DuplicateInstrument => ServiceError::InstrumentAlreadySaved,
            GatewayError::Declined { code, text } => {
                ServiceError::Gateway(format!("{}: {}", code, text))
            }
            GatewayError::Transport(msg) | GatewayError::Protocol(msg) => {
                ServiceError::Gateway(msg)
            }
        }
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError(_)
            | Self::InvalidCartItems(_)
            | Self::MissingGuestContact
            | Self::ProductNotFound(_)
            | Self::AmountMismatch { .. }
            | Self::MissingTenant
            | Self::UnknownTenant(_)
            | Self::DuplicateTransaction
            | Self::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            Self::VaultFull | Self::InstrumentAlreadySaved | Self::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::GatewayConfigMissing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::OrderNotFound(_) | Self::InstrumentNotFound(_) | Self::UserNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// text to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::GatewayConfigMissing => "Payment gateway configuration error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
