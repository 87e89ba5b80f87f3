use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

pub mod authnet;

pub use authnet::HttpPaymentGateway;

/// Opaque single-use token produced by the provider's client-side
/// tokenizer. Card data never reaches this service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentToken {
    pub descriptor: String,
    pub value: String,
}

/// Billing/shipping address in the shape the gateway expects.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(length(min = 1))]
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    pub fn cardholder_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A line item forwarded to the gateway for reporting.
#[derive(Debug, Clone)]
pub struct ChargeLineItem {
    pub item_ref: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub auth_code: String,
    pub response_code: String,
}

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_transaction_id: String,
}

/// Card display details as reported by the gateway's vault. These are the
/// only source for locally stored card metadata.
#[derive(Debug, Clone)]
pub struct InstrumentDetails {
    pub card_type: String,
    pub last_four: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cardholder_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    ConfigMissing,

    /// The call exceeded its deadline. Charge success is ambiguous; the
    /// caller must not retry blindly.
    #[error("payment gateway call timed out")]
    Timeout,

    #[error("gateway declined: {code}: {text}")]
    Declined { code: String, text: String },

    /// The provider reported the instrument already exists in the vault.
    #[error("duplicate vaulted instrument")]
    DuplicateInstrument,

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("malformed gateway response: {0}")]
    Protocol(String),
}

/// Boundary to the remote payment provider. Every operation is a single
/// network attempt; retry policy is a caller decision.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture a charge against a client-side token.
    async fn tokenize_and_charge(
        &self,
        token: &PaymentToken,
        amount: Decimal,
        bill_to: &Address,
        ship_to: Option<&Address>,
        line_items: &[ChargeLineItem],
        order_ref: &str,
    ) -> Result<ChargeReceipt, GatewayError>;

    /// Authorize and capture a charge against a vaulted instrument.
    async fn charge_vaulted_instrument(
        &self,
        vault_profile_id: &str,
        vault_instrument_id: &str,
        amount: Decimal,
        bill_to: &Address,
        ship_to: Option<&Address>,
        order_ref: &str,
    ) -> Result<ChargeReceipt, GatewayError>;

    async fn refund(
        &self,
        original_transaction_id: &str,
        amount: Decimal,
    ) -> Result<RefundReceipt, GatewayError>;

    /// Create a hosted vault profile for a customer, returning its id.
    async fn create_vault_profile(
        &self,
        customer_ref: &str,
        email: &str,
        description: &str,
    ) -> Result<String, GatewayError>;

    /// Add a tokenized instrument to a vault profile, returning the
    /// instrument id.
    async fn add_vaulted_instrument(
        &self,
        vault_profile_id: &str,
        token: &PaymentToken,
        bill_to: &Address,
    ) -> Result<String, GatewayError>;

    async fn instrument_details(
        &self,
        vault_profile_id: &str,
        vault_instrument_id: &str,
    ) -> Result<InstrumentDetails, GatewayError>;

    async fn delete_vaulted_instrument(
        &self,
        vault_profile_id: &str,
        vault_instrument_id: &str,
    ) -> Result<(), GatewayError>;
}
