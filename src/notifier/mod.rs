pub mod hub;
pub mod poll;
pub mod push;

use serde_json::json;

use crate::{
    events::{ChangeOperation, OrderChange},
    services::orders::OrderStats,
};

use self::hub::{customer_room, RealtimeHub, OPERATORS_ROOM};

pub const EVENT_NEW_ORDER: &str = "new_order";
pub const EVENT_STATUS_UPDATE: &str = "order_status_update";
pub const EVENT_DELIVERY_UPDATE: &str = "delivery_update";
pub const EVENT_STATS_UPDATE: &str = "order_stats_update";

/// Route one order change to the rooms that care about it. Operators see
/// everything; the owning customer (when registered) gets a message with
/// friendlier wording, and delivery-tracking statuses additionally emit a
/// delivery event.
pub fn fan_out(hub: &RealtimeHub, change: &OrderChange) {
    let base = json!({
        "orderId": change.order_id,
        "orderNumber": change.order_number,
        "status": change.status,
        "store": change.tenant,
    });

    match change.operation {
        ChangeOperation::Created => {
            hub.publish(OPERATORS_ROOM, EVENT_NEW_ORDER, base.clone());
        }
        ChangeOperation::Updated => {
            hub.publish(OPERATORS_ROOM, EVENT_STATUS_UPDATE, base.clone());
            if change.status.is_delivery_tracking() {
                hub.publish(OPERATORS_ROOM, EVENT_DELIVERY_UPDATE, base.clone());
            }
        }
    }

    if let Some(customer_id) = change.customer_id {
        let mut payload = base;
        payload["message"] =
            json!(change.status.customer_message(&change.order_number));
        let event = match change.operation {
            ChangeOperation::Created => EVENT_NEW_ORDER,
            ChangeOperation::Updated => EVENT_STATUS_UPDATE,
        };
        hub.publish(&customer_room(customer_id), event, payload);
    }
}

/// Push refreshed dashboard counters to operator sessions.
pub fn broadcast_stats(hub: &RealtimeHub, tenant: &str, stats: &OrderStats) {
    hub.publish(
        OPERATORS_ROOM,
        EVENT_STATS_UPDATE,
        json!({ "store": tenant, "stats": stats }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::order_status::OrderStatus;
    use uuid::Uuid;

    fn change(
        operation: ChangeOperation,
        status: OrderStatus,
        customer_id: Option<Uuid>,
    ) -> OrderChange {
        OrderChange {
            order_id: Uuid::new_v4(),
            order_number: "ORD-1700000000000-042".to_string(),
            status,
            operation,
            customer_id,
            tenant: "teststore".to_string(),
        }
    }

    #[tokio::test]
    async fn created_orders_reach_operators_as_new_order() {
        let hub = RealtimeHub::new();
        let mut operators = hub.subscribe(OPERATORS_ROOM);

        fan_out(
            &hub,
            &change(ChangeOperation::Created, OrderStatus::Pending, None),
        );

        let got = operators.try_recv().unwrap();
        assert_eq!(got.event, EVENT_NEW_ORDER);
        assert_eq!(got.payload["store"], "teststore");
    }

    #[tokio::test]
    async fn delivery_statuses_emit_an_extra_delivery_event() {
        let hub = RealtimeHub::new();
        let mut operators = hub.subscribe(OPERATORS_ROOM);

        fan_out(
            &hub,
            &change(ChangeOperation::Updated, OrderStatus::InTransit, None),
        );

        assert_eq!(operators.try_recv().unwrap().event, EVENT_STATUS_UPDATE);
        assert_eq!(operators.try_recv().unwrap().event, EVENT_DELIVERY_UPDATE);
    }

    #[tokio::test]
    async fn owning_customer_gets_a_personal_message() {
        let hub = RealtimeHub::new();
        let customer_id = Uuid::new_v4();
        let mut session = hub.subscribe(&customer_room(customer_id));

        fan_out(
            &hub,
            &change(
                ChangeOperation::Updated,
                OrderStatus::Delivered,
                Some(customer_id),
            ),
        );

        let got = session.try_recv().unwrap();
        assert_eq!(got.event, EVENT_STATUS_UPDATE);
        assert!(got.payload["message"]
            .as_str()
            .unwrap()
            .contains("delivered"));
    }
}
