//! HTTP payment gateway implementation speaking the provider's JSON API.
//!
//! All provider request/response shapes stay behind this module; callers
//! only ever see the typed DTOs from [`crate::gateway`]. Responses are
//! parsed once into typed payloads with explicit absence instead of
//! defensively probed dynamic shapes.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::GatewayConfig;

use super::{
    Address, ChargeLineItem, ChargeReceipt, GatewayError, InstrumentDetails, PaymentGateway,
    PaymentToken, RefundReceipt,
};

/// Provider code for "a duplicate customer payment profile already exists".
const CODE_DUPLICATE_PAYMENT_PROFILE: &str = "E00039";

const AUTH_CAPTURE: &str = "authCaptureTransaction";
const REFUND: &str = "refundTransaction";

/// Provider field limits.
const MAX_ITEM_ID_LEN: usize = 31;
const MAX_ITEM_NAME_LEN: usize = 31;

pub struct HttpPaymentGateway {
    http: reqwest::Client,
    config: Option<GatewayConfig>,
}

impl HttpPaymentGateway {
    /// A gateway with no config serves every call a `ConfigMissing` error,
    /// which keeps the failure at the start of the checkout path.
    pub fn new(config: Option<GatewayConfig>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn config(&self) -> Result<&GatewayConfig, GatewayError> {
        self.config.as_ref().ok_or(GatewayError::ConfigMissing)
    }

    fn auth(&self) -> Result<MerchantAuthentication, GatewayError> {
        let cfg = self.config()?;
        Ok(MerchantAuthentication {
            name: cfg.api_login_id.clone(),
            transaction_key: cfg.transaction_key.clone(),
        })
    }

    async fn post<Req, Resp>(&self, body: &Req) -> Result<Resp, GatewayError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let cfg = self.config()?;
        let timeout = Duration::from_secs(cfg.timeout_secs);

        let send = self.http.post(&cfg.endpoint).json(body).send();
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| GatewayError::Timeout)?
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let text = tokio::time::timeout(timeout, response.text())
            .await
            .map_err(|_| GatewayError::Timeout)?
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        // The provider prefixes responses with a UTF-8 BOM.
        let text = text.trim_start_matches('\u{feff}');
        serde_json::from_str(text).map_err(|e| GatewayError::Protocol(e.to_string()))
    }
}

fn check_messages(messages: &Messages) -> Result<(), GatewayError> {
    if messages.result_code.eq_ignore_ascii_case("ok") {
        return Ok(());
    }
    let first = messages.message.first();
    let code = first.map(|m| m.code.clone()).unwrap_or_default();
    let text = first.map(|m| m.text.clone()).unwrap_or_default();
    if code == CODE_DUPLICATE_PAYMENT_PROFILE {
        return Err(GatewayError::DuplicateInstrument);
    }
    Err(GatewayError::Declined { code, text })
}

fn charge_receipt(payload: Option<TransactionResponsePayload>) -> Result<ChargeReceipt, GatewayError> {
    let payload = payload.ok_or_else(|| {
        GatewayError::Protocol("missing transaction response".to_string())
    })?;
    if let Some(errors) = payload.errors.as_ref().filter(|e| !e.is_empty()) {
        return Err(GatewayError::Declined {
            code: errors[0].error_code.clone(),
            text: errors[0].error_text.clone(),
        });
    }
    let transaction_id = payload
        .trans_id
        .filter(|id| !id.is_empty() && id != "0")
        .ok_or_else(|| GatewayError::Protocol("missing transaction id".to_string()))?;
    Ok(ChargeReceipt {
        transaction_id,
        auth_code: payload.auth_code.unwrap_or_default(),
        response_code: payload.response_code.unwrap_or_default(),
    })
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn item_ref(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let start = chars.len().saturating_sub(MAX_ITEM_ID_LEN);
    chars[start..].iter().collect()
}

fn line_items(items: &[ChargeLineItem]) -> Option<NetLineItems> {
    if items.is_empty() {
        return None;
    }
    Some(NetLineItems {
        line_item: items
            .iter()
            .map(|item| NetLineItem {
                item_id: item_ref(&item.item_ref),
                name: truncate(&item.name, MAX_ITEM_NAME_LEN),
                quantity: item.quantity.to_string(),
                unit_price: format!("{:.2}", item.unit_price),
            })
            .collect(),
    })
}

/// Split a provider expiration date ("YYYY-MM", possibly masked) into
/// (month, year). Masked or absent parts come back as empty strings.
fn split_expiration(raw: &str) -> (String, String) {
    match raw.split_once('-') {
        Some((year, month)) => (month.to_string(), year.to_string()),
        None => (String::new(), String::new()),
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, token, bill_to, ship_to, items), fields(order_ref = %order_ref, amount = %amount))]
    async fn tokenize_and_charge(
        &self,
        token: &PaymentToken,
        amount: Decimal,
        bill_to: &Address,
        ship_to: Option<&Address>,
        items: &[ChargeLineItem],
        order_ref: &str,
    ) -> Result<ChargeReceipt, GatewayError> {
        let request = CreateTransactionRequest {
            create_transaction_request: CreateTransactionBody {
                merchant_authentication: self.auth()?,
                transaction_request: TransactionRequest {
                    transaction_type: AUTH_CAPTURE.to_string(),
                    amount: Some(format!("{:.2}", amount)),
                    payment: Some(NetPayment {
                        opaque_data: NetOpaqueData {
                            data_descriptor: token.descriptor.clone(),
                            data_value: token.value.clone(),
                        },
                    }),
                    profile: None,
                    order: Some(NetOrderRef {
                        invoice_number: truncate(order_ref, 20),
                    }),
                    line_items: line_items(items),
                    bill_to: Some(bill_to.into()),
                    ship_to: ship_to.map(Into::into),
                    ref_trans_id: None,
                },
            },
        };

        let response: CreateTransactionResponse = self.post(&request).await?;
        check_messages(&response.messages)?;
        charge_receipt(response.transaction_response)
    }

    #[instrument(skip(self, bill_to, ship_to), fields(order_ref = %order_ref, amount = %amount))]
    async fn charge_vaulted_instrument(
        &self,
        vault_profile_id: &str,
        vault_instrument_id: &str,
        amount: Decimal,
        bill_to: &Address,
        ship_to: Option<&Address>,
        order_ref: &str,
    ) -> Result<ChargeReceipt, GatewayError> {
        let request = CreateTransactionRequest {
            create_transaction_request: CreateTransactionBody {
                merchant_authentication: self.auth()?,
                transaction_request: TransactionRequest {
                    transaction_type: AUTH_CAPTURE.to_string(),
                    amount: Some(format!("{:.2}", amount)),
                    payment: None,
                    profile: Some(NetProfilePayment {
                        customer_profile_id: vault_profile_id.to_string(),
                        payment_profile: NetPaymentProfileRef {
                            payment_profile_id: vault_instrument_id.to_string(),
                        },
                    }),
                    order: Some(NetOrderRef {
                        invoice_number: truncate(order_ref, 20),
                    }),
                    line_items: None,
                    bill_to: Some(bill_to.into()),
                    ship_to: ship_to.map(Into::into),
                    ref_trans_id: None,
                },
            },
        };

        let response: CreateTransactionResponse = self.post(&request).await?;
        check_messages(&response.messages)?;
        charge_receipt(response.transaction_response)
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn refund(
        &self,
        original_transaction_id: &str,
        amount: Decimal,
    ) -> Result<RefundReceipt, GatewayError> {
        let request = CreateTransactionRequest {
            create_transaction_request: CreateTransactionBody {
                merchant_authentication: self.auth()?,
                transaction_request: TransactionRequest {
                    transaction_type: REFUND.to_string(),
                    amount: Some(format!("{:.2}", amount)),
                    payment: None,
                    profile: None,
                    order: None,
                    line_items: None,
                    bill_to: None,
                    ship_to: None,
                    ref_trans_id: Some(original_transaction_id.to_string()),
                },
            },
        };

        let response: CreateTransactionResponse = self.post(&request).await?;
        check_messages(&response.messages)?;
        let receipt = charge_receipt(response.transaction_response)?;
        Ok(RefundReceipt {
            refund_transaction_id: receipt.transaction_id,
        })
    }

    #[instrument(skip(self, email, description))]
    async fn create_vault_profile(
        &self,
        customer_ref: &str,
        email: &str,
        description: &str,
    ) -> Result<String, GatewayError> {
        let request = CreateCustomerProfileRequest {
            create_customer_profile_request: CreateCustomerProfileBody {
                merchant_authentication: self.auth()?,
                profile: NetCustomerProfile {
                    merchant_customer_id: item_ref(customer_ref),
                    email: email.to_string(),
                    description: description.to_string(),
                },
            },
        };

        let response: CreateCustomerProfileResponse = self.post(&request).await?;
        check_messages(&response.messages)?;
        response
            .customer_profile_id
            .ok_or_else(|| GatewayError::Protocol("missing customer profile id".to_string()))
    }

    #[instrument(skip(self, token, bill_to))]
    async fn add_vaulted_instrument(
        &self,
        vault_profile_id: &str,
        token: &PaymentToken,
        bill_to: &Address,
    ) -> Result<String, GatewayError> {
        let cfg = self.config()?;
        let validation_mode = if cfg.endpoint.contains("apitest") {
            "testMode"
        } else {
            "liveMode"
        };
        let request = CreatePaymentProfileRequest {
            create_customer_payment_profile_request: CreatePaymentProfileBody {
                merchant_authentication: self.auth()?,
                customer_profile_id: vault_profile_id.to_string(),
                payment_profile: NetNewPaymentProfile {
                    customer_type: "individual".to_string(),
                    bill_to: bill_to.into(),
                    payment: NetPayment {
                        opaque_data: NetOpaqueData {
                            data_descriptor: token.descriptor.clone(),
                            data_value: token.value.clone(),
                        },
                    },
                },
                validation_mode: validation_mode.to_string(),
            },
        };

        let response: CreatePaymentProfileResponse = self.post(&request).await?;
        check_messages(&response.messages)?;
        response
            .customer_payment_profile_id
            .ok_or_else(|| GatewayError::Protocol("missing payment profile id".to_string()))
    }

    #[instrument(skip(self))]
    async fn instrument_details(
        &self,
        vault_profile_id: &str,
        vault_instrument_id: &str,
    ) -> Result<InstrumentDetails, GatewayError> {
        let request = GetPaymentProfileRequest {
            get_customer_payment_profile_request: ProfileLookupBody {
                merchant_authentication: self.auth()?,
                customer_profile_id: vault_profile_id.to_string(),
                customer_payment_profile_id: vault_instrument_id.to_string(),
            },
        };

        let response: GetPaymentProfileResponse = self.post(&request).await?;
        check_messages(&response.messages)?;
        let profile = response
            .payment_profile
            .ok_or_else(|| GatewayError::Protocol("missing payment profile".to_string()))?;
        let card = profile
            .payment
            .and_then(|p| p.credit_card)
            .ok_or_else(|| GatewayError::Protocol("missing credit card details".to_string()))?;

        let last_four = {
            let digits = card.card_number.unwrap_or_default();
            let chars: Vec<char> = digits.chars().collect();
            let start = chars.len().saturating_sub(4);
            chars[start..].iter().collect()
        };
        let (expiry_month, expiry_year) =
            split_expiration(card.expiration_date.as_deref().unwrap_or(""));
        let cardholder_name = profile
            .bill_to
            .map(|b| format!("{} {}", b.first_name.unwrap_or_default(), b.last_name.unwrap_or_default()))
            .map(|name| name.trim().to_string())
            .unwrap_or_default();

        Ok(InstrumentDetails {
            card_type: card.card_type.unwrap_or_else(|| "Unknown".to_string()),
            last_four,
            expiry_month,
            expiry_year,
            cardholder_name,
        })
    }

    #[instrument(skip(self))]
    async fn delete_vaulted_instrument(
        &self,
        vault_profile_id: &str,
        vault_instrument_id: &str,
    ) -> Result<(), GatewayError> {
        let request = DeletePaymentProfileRequest {
            delete_customer_payment_profile_request: ProfileLookupBody {
                merchant_authentication: self.auth()?,
                customer_profile_id: vault_profile_id.to_string(),
                customer_payment_profile_id: vault_instrument_id.to_string(),
            },
        };

        let response: DeletePaymentProfileResponse = self.post(&request).await?;
        if let Err(err) = check_messages(&response.messages) {
            warn!(error = %err, "remote vault deletion failed");
            return Err(err);
        }
        Ok(())
    }
}

// ---- provider wire types (requests) ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantAuthentication {
    name: String,
    transaction_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetOpaqueData {
    data_descriptor: String,
    data_value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetPayment {
    opaque_data: NetOpaqueData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetAddress {
    first_name: String,
    last_name: String,
    address: String,
    city: String,
    state: String,
    zip: String,
    country: String,
}

impl From<&Address> for NetAddress {
    fn from(addr: &Address) -> Self {
        Self {
            first_name: addr.first_name.clone(),
            last_name: addr.last_name.clone(),
            address: addr.address.clone(),
            city: addr.city.clone(),
            state: addr.state.clone(),
            zip: addr.zip.clone(),
            country: addr.country.clone().unwrap_or_else(|| "US".to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetLineItem {
    item_id: String,
    name: String,
    quantity: String,
    unit_price: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetLineItems {
    line_item: Vec<NetLineItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetOrderRef {
    invoice_number: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetPaymentProfileRef {
    payment_profile_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetProfilePayment {
    customer_profile_id: String,
    payment_profile: NetPaymentProfileRef,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest {
    transaction_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment: Option<NetPayment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<NetProfilePayment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<NetOrderRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line_items: Option<NetLineItems>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bill_to: Option<NetAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ship_to: Option<NetAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_trans_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionBody {
    merchant_authentication: MerchantAuthentication,
    transaction_request: TransactionRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionRequest {
    create_transaction_request: CreateTransactionBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetCustomerProfile {
    merchant_customer_id: String,
    email: String,
    description: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerProfileBody {
    merchant_authentication: MerchantAuthentication,
    profile: NetCustomerProfile,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerProfileRequest {
    create_customer_profile_request: CreateCustomerProfileBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetNewPaymentProfile {
    customer_type: String,
    bill_to: NetAddress,
    payment: NetPayment,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentProfileBody {
    merchant_authentication: MerchantAuthentication,
    customer_profile_id: String,
    payment_profile: NetNewPaymentProfile,
    validation_mode: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentProfileRequest {
    create_customer_payment_profile_request: CreatePaymentProfileBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileLookupBody {
    merchant_authentication: MerchantAuthentication,
    customer_profile_id: String,
    customer_payment_profile_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetPaymentProfileRequest {
    get_customer_payment_profile_request: ProfileLookupBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletePaymentProfileRequest {
    delete_customer_payment_profile_request: ProfileLookupBody,
}

// ---- provider wire types (responses) ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Messages {
    result_code: String,
    #[serde(default)]
    message: Vec<MessageEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageEntry {
    code: String,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionError {
    error_code: String,
    error_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResponsePayload {
    trans_id: Option<String>,
    auth_code: Option<String>,
    response_code: Option<String>,
    errors: Option<Vec<TransactionError>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionResponse {
    messages: Messages,
    transaction_response: Option<TransactionResponsePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerProfileResponse {
    messages: Messages,
    customer_profile_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentProfileResponse {
    messages: Messages,
    customer_payment_profile_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreditCardPayload {
    card_number: Option<String>,
    expiration_date: Option<String>,
    card_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentPayload {
    credit_card: Option<CreditCardPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillToPayload {
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentProfilePayload {
    payment: Option<PaymentPayload>,
    bill_to: Option<BillToPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPaymentProfileResponse {
    messages: Messages,
    payment_profile: Option<PaymentProfilePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletePaymentProfileResponse {
    messages: Messages,
}
