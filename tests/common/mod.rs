#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    app_router,
    auth::{issue_token, Claims, ROLE_CUSTOMER},
    config::AppConfig,
    db::{run_migrations, TenantRegistry},
    entities::{customer, product},
    events::ChangeFeed,
    gateway::{
        Address, ChargeLineItem, ChargeReceipt, GatewayError, InstrumentDetails, PaymentGateway,
        PaymentToken, RefundReceipt,
    },
    notifier::hub::RealtimeHub,
    services::vault::CustomerLocks,
    AppState,
};

pub const TEST_TENANT: &str = "teststore";
pub const TEST_SECRET: &str = "test_secret_key_that_is_long_enough_for_hs256";

/// In-memory payment gateway double. Every call is counted so tests can
/// assert that rejected checkouts never reach the provider.
#[derive(Default)]
pub struct FakeGateway {
    pub charge_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
    pub vault_add_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    counter: AtomicUsize,
    /// Instrument ids the fake treats as missing from the remote vault.
    pub missing_instruments: Mutex<Vec<String>>,
    /// When set, every charge is declined with this text.
    pub decline_charges: Mutex<Option<String>>,
    /// When true, remote deletes fail with a transport error.
    pub fail_deletes: Mutex<bool>,
    /// When true, instrument detail lookups fail with a transport error.
    pub fail_details: Mutex<bool>,
    details: Mutex<HashMap<String, InstrumentDetails>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{}", prefix, n)
    }

    pub fn charge_count(&self) -> usize {
        self.charge_calls.load(Ordering::SeqCst)
    }

    pub fn mark_missing(&self, instrument_id: &str) {
        self.missing_instruments
            .lock()
            .unwrap()
            .push(instrument_id.to_string());
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn tokenize_and_charge(
        &self,
        _token: &PaymentToken,
        _amount: Decimal,
        _bill_to: &Address,
        _ship_to: Option<&Address>,
        _line_items: &[ChargeLineItem],
        _order_ref: &str,
    ) -> Result<ChargeReceipt, GatewayError> {
        self.charge_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(text) = self.decline_charges.lock().unwrap().clone() {
            return Err(GatewayError::Declined {
                code: "E00027".to_string(),
                text,
            });
        }
        Ok(ChargeReceipt {
            transaction_id: self.next_id("txn-"),
            auth_code: "TEST".to_string(),
            response_code: "1".to_string(),
        })
    }

    async fn charge_vaulted_instrument(
        &self,
        _vault_profile_id: &str,
        _vault_instrument_id: &str,
        _amount: Decimal,
        _bill_to: &Address,
        _ship_to: Option<&Address>,
        _order_ref: &str,
    ) -> Result<ChargeReceipt, GatewayError> {
        self.charge_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(text) = self.decline_charges.lock().unwrap().clone() {
            return Err(GatewayError::Declined {
                code: "E00027".to_string(),
                text,
            });
        }
        Ok(ChargeReceipt {
            transaction_id: self.next_id("txn-"),
            auth_code: "TEST".to_string(),
            response_code: "1".to_string(),
        })
    }

    async fn refund(
        &self,
        _original_transaction_id: &str,
        _amount: Decimal,
    ) -> Result<RefundReceipt, GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RefundReceipt {
            refund_transaction_id: self.next_id("refund-"),
        })
    }

    async fn create_vault_profile(
        &self,
        _customer_ref: &str,
        _email: &str,
        _description: &str,
    ) -> Result<String, GatewayError> {
        Ok(self.next_id("profile-"))
    }

    async fn add_vaulted_instrument(
        &self,
        _vault_profile_id: &str,
        token: &PaymentToken,
        bill_to: &Address,
    ) -> Result<String, GatewayError> {
        self.vault_add_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id("instrument-");
        self.details.lock().unwrap().insert(
            id.clone(),
            InstrumentDetails {
                card_type: "Visa".to_string(),
                last_four: {
                    let tail = token.value.chars().count().saturating_sub(4);
                    token.value.chars().skip(tail).collect()
                },
                expiry_month: "04".to_string(),
                expiry_year: "2030".to_string(),
                cardholder_name: bill_to.cardholder_name(),
            },
        );
        Ok(id)
    }

    async fn instrument_details(
        &self,
        _vault_profile_id: &str,
        vault_instrument_id: &str,
    ) -> Result<InstrumentDetails, GatewayError> {
        if *self.fail_details.lock().unwrap() {
            return Err(GatewayError::Transport("connection reset".to_string()));
        }
        if self
            .missing_instruments
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == vault_instrument_id)
        {
            return Err(GatewayError::Declined {
                code: "E00040".to_string(),
                text: "The record cannot be found.".to_string(),
            });
        }
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(vault_instrument_id)
            .cloned()
            .unwrap_or(InstrumentDetails {
                card_type: "Visa".to_string(),
                last_four: "4242".to_string(),
                expiry_month: "04".to_string(),
                expiry_year: "2030".to_string(),
                cardholder_name: "Test Holder".to_string(),
            }))
    }

    async fn delete_vaulted_instrument(
        &self,
        _vault_profile_id: &str,
        _vault_instrument_id: &str,
    ) -> Result<(), GatewayError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_deletes.lock().unwrap() {
            return Err(GatewayError::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}

/// In-process application wired against an in-memory database and the
/// fake gateway.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // A single connection: every pooled connection to sqlite::memory:
        // would otherwise get its own empty database.
        let mut opts = sea_orm::ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let db = sea_orm::Database::connect(opts)
            .await
            .expect("in-memory database");
        run_migrations(&db).await.expect("schema");
        let db = Arc::new(db);

        let tenants = Arc::new(TenantRegistry::new(HashMap::new(), false));
        tenants.insert(TEST_TENANT, db.clone());

        let mut config = AppConfig::new(
            "127.0.0.1".to_string(),
            0,
            TEST_SECRET.to_string(),
            "test".to_string(),
        );
        config.tax_rate = "0.08".parse().unwrap();

        let gateway = Arc::new(FakeGateway::new());
        let state = AppState {
            config: Arc::new(config),
            tenants,
            gateway: gateway.clone(),
            feed: ChangeFeed::default(),
            hub: Arc::new(RealtimeHub::new()),
            locks: CustomerLocks::default(),
        };

        Self {
            router: app_router(state.clone()),
            state,
            db,
            gateway,
        }
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, sale: Option<Decimal>) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            price: Set(price),
            sale_price: Set(sale),
            image_url: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed product");
        id
    }

    pub async fn seed_customer(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        customer::ActiveModel {
            id: Set(id),
            email: Set(email.to_string()),
            name: Set("Test Customer".to_string()),
            phone: Set(None),
            vault_profile_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed customer");
        id
    }

    pub fn token_for(&self, user_id: Uuid, role: &str) -> String {
        let claims = Claims {
            sub: user_id,
            role: role.to_string(),
            email: Some("customer@example.com".to_string()),
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        issue_token(TEST_SECRET, &claims).expect("sign token")
    }

    pub fn customer_token(&self, user_id: Uuid) -> String {
        self.token_for(user_id, ROLE_CUSTOMER)
    }

    /// Send a request and return (status, parsed JSON body).
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("x-store-db", TEST_TENANT);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Same as `request` but without the tenant header.
    pub async fn request_without_tenant(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

/// A well-formed billing address payload.
pub fn billing_address() -> Value {
    serde_json::json!({
        "firstName": "Jane",
        "lastName": "Doe",
        "address": "1 Main St",
        "city": "Springfield",
        "state": "IL",
        "zip": "62704"
    })
}

/// A fresh single-use payment token payload.
pub fn payment_token() -> Value {
    serde_json::json!({
        "descriptor": "COMMON.ACCEPT.INAPP.PAYMENT",
        "value": format!("token-{}", Uuid::new_v4())
    })
}
