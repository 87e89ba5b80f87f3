mod common;

use axum::http::StatusCode;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;

use common::{billing_address, payment_token, TestApp};
use storefront_api::entities::order;

fn decimal_field(body: &serde_json::Value, path: &str) -> rust_decimal::Decimal {
    body["data"][path]
        .as_str()
        .unwrap_or_else(|| panic!("missing field {}", path))
        .parse()
        .unwrap()
}

fn guest_payload(product_id: uuid::Uuid, amount: &str) -> serde_json::Value {
    json!({
        "items": [{"product": product_id, "quantity": 2}],
        "amount": amount,
        "orderType": "pickup",
        "billingAddress": billing_address(),
        "guestInfo": {"email": "guest@example.com", "phone": "5551234567"},
        "paymentToken": payment_token()
    })
}

#[tokio::test]
async fn guest_checkout_succeeds_at_the_server_price() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let (status, body) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "21.60")))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(decimal_field(&body, "subtotal"), dec!(20.00));
    assert_eq!(decimal_field(&body, "tax"), dec!(1.60));
    assert_eq!(decimal_field(&body, "total"), dec!(21.60));
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["orderNumber"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
    assert_eq!(app.gateway.charge_count(), 1);
}

#[tokio::test]
async fn declared_amount_mismatch_never_reaches_the_gateway() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let (status, body) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "21.50")))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("21.60"));
    assert_eq!(app.gateway.charge_count(), 0);
}

#[tokio::test]
async fn repeat_submission_within_the_window_charges_once() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let (first, _) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "21.60")))
        .await;
    let (second, body) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "21.60")))
        .await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Duplicate"));
    assert_eq!(app.gateway.charge_count(), 1);
}

#[tokio::test]
async fn missing_tenant_header_is_rejected_outright() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let (status, _) = app
        .request_without_tenant("POST", "/api/guest/checkout", Some(guest_payload(product, "21.60")))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.gateway.charge_count(), 0);
}

#[tokio::test]
async fn guest_checkout_requires_contact_info() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let mut payload = guest_payload(product, "21.60");
    payload["guestInfo"] = json!({"email": "guest@example.com", "phone": ""});
    let (status, body) = app
        .request("POST", "/api/guest/checkout", None, Some(payload))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("phone"));
    assert_eq!(app.gateway.charge_count(), 0);
}

#[tokio::test]
async fn unknown_order_types_are_rejected_before_any_charge() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let mut payload = guest_payload(product, "21.60");
    payload["orderType"] = json!("teleport");
    let (status, _) = app
        .request("POST", "/api/guest/checkout", None, Some(payload))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.gateway.charge_count(), 0);
}

#[tokio::test]
async fn order_type_defaults_to_delivery() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let mut payload = guest_payload(product, "21.60");
    payload.as_object_mut().unwrap().remove("orderType");
    let (status, body) = app
        .request("POST", "/api/guest/checkout", None, Some(payload))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["orderType"], "delivery");
}

#[tokio::test]
async fn pickup_orders_never_persist_a_shipping_address() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let mut payload = guest_payload(product, "21.60");
    payload["shippingAddress"] = billing_address();
    let (status, body) = app
        .request("POST", "/api/guest/checkout", None, Some(payload))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["orderType"], "pickup");

    let order_id: uuid::Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();
    let row = order::Entity::find_by_id(order_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert!(row.shipping_address.is_none());
    assert!(row.billing_address.is_some());
}

#[tokio::test]
async fn gateway_decline_persists_nothing() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;
    *app.gateway.decline_charges.lock().unwrap() =
        Some("This transaction has been declined.".to_string());

    let (status, _) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "21.60")))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // Nothing was persisted, so an immediate retry is not a duplicate.
    *app.gateway.decline_charges.lock().unwrap() = None;
    let (retry, _) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "21.60")))
        .await;
    assert_eq!(retry, StatusCode::OK);
}

#[tokio::test]
async fn sale_price_wins_over_regular_price() {
    let app = TestApp::spawn().await;
    let product = app
        .seed_product("Coffee beans", dec!(10.00), Some(dec!(8.00)))
        .await;

    // 2 * 8.00 = 16.00, tax 1.28, total 17.28
    let (status, body) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "17.28")))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn customer_checkout_with_save_card_vaults_the_instrument() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;
    let customer = app.seed_customer("buyer@example.com").await;
    let token = app.customer_token(customer);

    let payload = json!({
        "items": [{"product": product, "quantity": 2}],
        "amount": "21.60",
        "orderType": "pickup",
        "billingAddress": billing_address(),
        "paymentToken": payment_token(),
        "saveCard": true
    });
    let (status, _) = app
        .request("POST", "/api/checkout/process", Some(&token), Some(payload))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request("GET", "/api/checkout/payment-methods", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let cards = body["data"].as_array().unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0]["isDefault"], json!(true));
}

#[tokio::test]
async fn saved_card_checkout_charges_the_vaulted_instrument() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;
    let customer = app.seed_customer("buyer@example.com").await;
    let token = app.customer_token(customer);

    let (status, body) = app
        .request(
            "POST",
            "/api/checkout/add-payment-method",
            Some(&token),
            Some(json!({
                "paymentToken": payment_token(),
                "billingAddress": billing_address()
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let card_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            "POST",
            "/api/checkout/process-saved-card",
            Some(&token),
            Some(json!({
                "items": [{"product": product, "quantity": 2}],
                "amount": "21.60",
                "orderType": "pickup",
                "billingAddress": billing_address(),
                "paymentMethodId": card_id
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["paymentMethod"], "saved_card");
    assert_eq!(app.gateway.charge_count(), 1);
}

#[tokio::test]
async fn operator_can_refund_by_transaction_id() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("Coffee beans", dec!(10.00), None).await;

    let (status, body) = app
        .request("POST", "/api/guest/checkout", None, Some(guest_payload(product, "21.60")))
        .await;
    assert_eq!(status, StatusCode::OK);
    let txn = body["data"]["paymentTransactionId"]
        .as_str()
        .unwrap()
        .to_string();

    let operator = app.token_for(uuid::Uuid::new_v4(), "storeOwner");
    let (status, body) = app
        .request(
            "POST",
            "/api/checkout/refund",
            Some(&operator),
            Some(json!({"transactionId": txn, "reason": "damaged goods"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "cancelled");
    assert!(body["data"]["refundTransactionId"]
        .as_str()
        .unwrap()
        .starts_with("refund-"));
}
