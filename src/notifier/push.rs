use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    db::TenantRegistry,
    events::ChangeFeed,
    notifier::{broadcast_stats, fan_out, hub::RealtimeHub},
    services::orders::OrderService,
};

/// Push-mode notifier: subscribe to the in-process change feed and fan
/// changes out to websocket rooms as they happen. A broken subscription
/// is re-established after a fixed backoff; a lagged one skips the missed
/// changes and keeps going.
pub async fn run(
    feed: ChangeFeed,
    hub: Arc<RealtimeHub>,
    tenants: Arc<TenantRegistry>,
    backoff_secs: u64,
) {
    info!("change feed notifier started");
    loop {
        let mut rx = feed.subscribe();
        loop {
            match rx.recv().await {
                Ok(change) => {
                    debug!(order_number = %change.order_number, "order change received");
                    fan_out(&hub, &change);
                    refresh_stats(&hub, &tenants, &change.tenant).await;
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "change feed lagged, continuing from current position");
                }
                Err(RecvError::Closed) => break,
            }
        }
        warn!(
            backoff_secs,
            "change feed closed, resubscribing after backoff"
        );
        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
    }
}

async fn refresh_stats(hub: &RealtimeHub, tenants: &TenantRegistry, tenant: &str) {
    match tenants.resolve(tenant).await {
        Ok(db) => match OrderService::new(db).stats().await {
            Ok(stats) => broadcast_stats(hub, tenant, &stats),
            Err(err) => warn!(tenant, error = %err, "stats refresh failed"),
        },
        Err(err) => warn!(tenant, error = %err, "stats refresh could not resolve tenant"),
    }
}
