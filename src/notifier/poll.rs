use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    db::TenantRegistry,
    entities::order::Model as OrderModel,
    events::{ChangeOperation, OrderChange},
    notifier::{broadcast_stats, fan_out, hub::RealtimeHub},
    services::{order_status::parse_status, orders::OrderService},
};

/// Poll-mode notifier for databases without a usable change feed. Every
/// tick it scans each connected tenant for orders whose `updated_at`
/// passed the tenant's checkpoint and replays them as change events.
/// Delivery is at-least-once: a crash between fanout and the next tick
/// re-emits the same orders.
pub async fn run(hub: Arc<RealtimeHub>, tenants: Arc<TenantRegistry>, interval_secs: u64) {
    info!(interval_secs, "polling notifier started");
    let interval = chrono::Duration::seconds(interval_secs as i64);
    let mut checkpoints: HashMap<String, DateTime<Utc>> = HashMap::new();
    let started = Utc::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        for (tenant, db) in tenants.snapshot() {
            let checkpoint = *checkpoints.entry(tenant.clone()).or_insert(started);
            let orders = OrderService::new(db.clone());
            let changed = match orders.updated_since(checkpoint).await {
                Ok(changed) => changed,
                Err(err) => {
                    warn!(tenant, error = %err, "poll scan failed, keeping checkpoint");
                    continue;
                }
            };
            if changed.is_empty() {
                continue;
            }

            debug!(tenant, count = changed.len(), "orders changed since checkpoint");
            let now = Utc::now();
            let mut advanced = checkpoint;
            for order in &changed {
                if order.updated_at > advanced {
                    advanced = order.updated_at;
                }
                match to_change(order, &tenant, now, interval) {
                    Ok(change) => fan_out(&hub, &change),
                    Err(err) => warn!(tenant, order_id = %order.id, error = %err, "skipping unreadable order"),
                }
            }
            checkpoints.insert(tenant.clone(), advanced);

            match orders.stats().await {
                Ok(stats) => broadcast_stats(&hub, &tenant, &stats),
                Err(err) => warn!(tenant, error = %err, "stats refresh failed"),
            }
        }
    }
}

/// An order created within the last two polling intervals counts as new;
/// anything older that changed is a status update.
fn to_change(
    order: &OrderModel,
    tenant: &str,
    now: DateTime<Utc>,
    interval: chrono::Duration,
) -> Result<OrderChange, crate::errors::ServiceError> {
    let operation = if now - order.created_at <= interval * 2 {
        ChangeOperation::Created
    } else {
        ChangeOperation::Updated
    };
    Ok(OrderChange {
        order_id: order.id,
        order_number: order.order_number.clone(),
        status: parse_status(&order.status)?,
        operation,
        customer_id: order.customer_id,
        tenant: tenant.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order(created_secs_ago: i64) -> OrderModel {
        let now = Utc::now();
        OrderModel {
            id: Uuid::new_v4(),
            order_number: "ORD-1700000000000-007".to_string(),
            customer_type: "guest".to_string(),
            customer_id: None,
            guest_id: Some(Uuid::new_v4()),
            guest_email: Some("guest@example.com".to_string()),
            guest_phone: Some("5551234".to_string()),
            status: "pending".to_string(),
            order_type: "pickup".to_string(),
            subtotal: dec!(20.00),
            tax: dec!(1.60),
            tip: dec!(0.00),
            bag_fee: dec!(0.00),
            delivery_fee: dec!(0.00),
            total: dec!(21.60),
            shipping_address: None,
            billing_address: None,
            payment_transaction_id: "123".to_string(),
            payment_method: "card".to_string(),
            payment_amount: dec!(21.60),
            refund_transaction_id: None,
            refund_amount: None,
            refund_date: None,
            refund_reason: None,
            created_at: now - chrono::Duration::seconds(created_secs_ago),
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn recent_orders_classify_as_created() {
        let interval = chrono::Duration::seconds(10);
        let change = to_change(&order(5), "teststore", Utc::now(), interval).unwrap();
        assert_eq!(change.operation, ChangeOperation::Created);
    }

    #[test]
    fn orders_older_than_two_intervals_classify_as_updated() {
        let interval = chrono::Duration::seconds(10);
        let change = to_change(&order(45), "teststore", Utc::now(), interval).unwrap();
        assert_eq!(change.operation, ChangeOperation::Updated);
    }
}
