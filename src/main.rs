use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use storefront_api::{
    app_router,
    config::{self, NotifierMode},
    db::TenantRegistry,
    events::ChangeFeed,
    gateway::HttpPaymentGateway,
    notifier::{hub::RealtimeHub, poll, push},
    services::vault::CustomerLocks,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&config.log_level, config.log_json);

    let config = Arc::new(config);
    let tenants = Arc::new(TenantRegistry::from_config(&config));
    let gateway = Arc::new(HttpPaymentGateway::new(config.gateway.clone()));
    let feed = ChangeFeed::default();
    let hub = Arc::new(RealtimeHub::new());

    match config.notifier.mode {
        NotifierMode::Push => {
            tokio::spawn(push::run(
                feed.clone(),
                hub.clone(),
                tenants.clone(),
                config.notifier.feed_backoff_secs,
            ));
        }
        NotifierMode::Poll => {
            tokio::spawn(poll::run(
                hub.clone(),
                tenants.clone(),
                config.notifier.poll_interval_secs,
            ));
        }
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        config,
        tenants,
        gateway,
        feed,
        hub,
        locks: CustomerLocks::default(),
    };

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "storefront api listening");

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
