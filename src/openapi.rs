use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    errors::ErrorResponse,
    gateway::{Address, PaymentToken},
    handlers,
    services::{checkout::OrderType, orders::OrderStats, pricing::CartItemInput},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::checkout::process,
        handlers::checkout::process_saved_card,
        handlers::checkout::refund,
        handlers::guest::checkout,
        handlers::payment_methods::add,
        handlers::payment_methods::remove,
        handlers::payment_methods::list,
        handlers::payment_methods::validate,
        handlers::payment_methods::sync,
        handlers::orders::list_own,
        handlers::orders::get_one,
        handlers::orders::update_status,
        handlers::orders::stats,
        handlers::realtime::ws_upgrade,
    ),
    components(schemas(
        ErrorResponse,
        Address,
        PaymentToken,
        CartItemInput,
        OrderType,
        OrderStats,
        handlers::checkout::CartPayload,
        handlers::checkout::ProcessRequest,
        handlers::checkout::ProcessSavedCardRequest,
        handlers::checkout::RefundRequest,
        handlers::guest::GuestInfo,
        handlers::guest::GuestCheckoutRequest,
        handlers::payment_methods::AddPaymentMethodRequest,
        handlers::payment_methods::PaymentMethodResponse,
        handlers::payment_methods::ValidateResponse,
        handlers::orders::OrderItemResponse,
        handlers::orders::OrderResponse,
        handlers::orders::RefundResponse,
        handlers::orders::UpdateStatusRequest,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "checkout", description = "Checkout and refunds"),
        (name = "payment-methods", description = "Saved card management"),
        (name = "orders", description = "Order queries and lifecycle"),
        (name = "realtime", description = "Order change notifications"),
        (name = "health", description = "Service health"),
    ),
    info(
        title = "Storefront API",
        description = "Multi-tenant storefront order and payment backend"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
