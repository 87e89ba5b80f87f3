mod common;

use axum::http::StatusCode;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use common::{billing_address, payment_token, TestApp};
use storefront_api::entities::payment_instrument;

async fn add_card(app: &TestApp, token: &str) -> (StatusCode, serde_json::Value) {
    app.request(
        "POST",
        "/api/checkout/add-payment-method",
        Some(token),
        Some(json!({
            "paymentToken": payment_token(),
            "billingAddress": billing_address()
        })),
    )
    .await
}

#[tokio::test]
async fn the_fourth_card_is_rejected() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("cards@example.com").await;
    let token = app.customer_token(customer);

    for _ in 0..3 {
        let (status, body) = add_card(&app, &token).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    let (status, body) = add_card(&app, &token).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("maximum 3"));
}

#[tokio::test]
async fn exactly_one_default_at_all_times() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("cards@example.com").await;
    let token = app.customer_token(customer);

    let (_, first) = add_card(&app, &token).await;
    assert_eq!(first["data"]["isDefault"], json!(true));

    let (_, body) = app
        .request(
            "POST",
            "/api/checkout/add-payment-method",
            Some(&token),
            Some(json!({
                "paymentToken": payment_token(),
                "billingAddress": billing_address(),
                "makeDefault": true
            })),
        )
        .await;
    assert_eq!(body["data"]["isDefault"], json!(true));

    let (_, list) = app
        .request("GET", "/api/checkout/payment-methods", Some(&token), None)
        .await;
    let defaults: Vec<_> = list["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["isDefault"] == json!(true))
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["id"], body["data"]["id"]);
}

#[tokio::test]
async fn deleting_the_default_promotes_the_oldest_remaining() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("cards@example.com").await;
    let token = app.customer_token(customer);

    let (_, first) = add_card(&app, &token).await;
    let (_, second) = add_card(&app, &token).await;
    let first_id = first["data"]["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "DELETE",
            &format!("/api/checkout/payment-method/{}", first_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let remaining = body["data"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], second["data"]["id"]);
    assert_eq!(remaining[0]["isDefault"], json!(true));
}

#[tokio::test]
async fn local_delete_survives_a_gateway_failure() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("cards@example.com").await;
    let token = app.customer_token(customer);

    let (_, card) = add_card(&app, &token).await;
    *app.gateway.fail_deletes.lock().unwrap() = true;

    let (status, body) = app
        .request(
            "DELETE",
            &format!(
                "/api/checkout/payment-method/{}",
                card["data"]["id"].as_str().unwrap()
            ),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn validation_drops_cards_missing_from_the_gateway_vault() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("cards@example.com").await;
    let token = app.customer_token(customer);

    let (_, kept) = add_card(&app, &token).await;
    let (_, dropped) = add_card(&app, &token).await;

    // Mark the second card's remote instrument as gone.
    let dropped_id: uuid::Uuid = dropped["data"]["id"].as_str().unwrap().parse().unwrap();
    let row = payment_instrument::Entity::find()
        .filter(payment_instrument::Column::Id.eq(dropped_id))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    app.gateway.mark_missing(&row.vault_instrument_id);

    let (status, body) = app
        .request(
            "POST",
            "/api/checkout/validate-payment-methods",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removedCount"], json!(1));
    let valid = body["data"]["valid"].as_array().unwrap();
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0]["id"], kept["data"]["id"]);
}

#[tokio::test]
async fn validation_treats_failed_lookups_as_invalid() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("cards@example.com").await;
    let token = app.customer_token(customer);

    add_card(&app, &token).await;
    *app.gateway.fail_details.lock().unwrap() = true;

    let (status, body) = app
        .request(
            "POST",
            "/api/checkout/validate-payment-methods",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["removedCount"], json!(1));
    assert!(body["data"]["valid"].as_array().unwrap().is_empty());

    *app.gateway.fail_details.lock().unwrap() = false;
    let (_, list) = app
        .request("GET", "/api/checkout/payment-methods", Some(&token), None)
        .await;
    assert!(list["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn card_display_fields_come_from_the_gateway_lookup() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer("cards@example.com").await;
    let token = app.customer_token(customer);

    let (status, body) = app
        .request(
            "POST",
            "/api/checkout/add-payment-method",
            Some(&token),
            Some(json!({
                "paymentToken": {
                    "descriptor": "COMMON.ACCEPT.INAPP.PAYMENT",
                    "value": "token-4242424242421881"
                },
                "billingAddress": billing_address()
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["lastFour"], json!("1881"));
    assert_eq!(body["data"]["cardholderName"], json!("Jane Doe"));
}

#[tokio::test]
async fn unauthenticated_vault_access_is_rejected() {
    let app = TestApp::spawn().await;
    let (status, _) = app
        .request("GET", "/api/checkout/payment-methods", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
