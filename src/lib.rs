pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod money;
pub mod notifier;
pub mod openapi;
pub mod services;

use std::sync::Arc;

use axum::{http::HeaderValue, Router};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::AppConfig,
    db::{Tenant, TenantRegistry},
    events::ChangeFeed,
    gateway::PaymentGateway,
    notifier::hub::RealtimeHub,
    services::{vault::CustomerLocks, TenantServices},
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tenants: Arc<TenantRegistry>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub feed: ChangeFeed,
    pub hub: Arc<RealtimeHub>,
    pub locks: CustomerLocks,
}

impl AppState {
    /// Assemble the service graph for a resolved tenant.
    pub fn services(&self, tenant: &Tenant) -> TenantServices {
        TenantServices::build(
            tenant.key.clone(),
            tenant.db.clone(),
            self.gateway.clone(),
            self.feed.clone(),
            self.locks.clone(),
            &self.config,
        )
    }
}

/// Uniform success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Build the full application router: API routes, swagger UI, tracing and
/// CORS layers.
pub fn app_router(state: AppState) -> Router {
    let cors = match state.config.cors_allowed_origins.as_deref() {
        Some(origins) => {
            let parsed = origins
                .split(',')
                .filter_map(|o| o.trim().parse::<HeaderValue>().ok())
                .collect::<Vec<_>>();
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        // No configured origins: anything goes in development, nothing
        // cross-origin otherwise.
        None if state.config.is_development() => CorsLayer::permissive(),
        None => CorsLayer::new(),
    };

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .merge(handlers::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
