use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

const ROOM_CAPACITY: usize = 256;

/// Room every operator session joins.
pub const OPERATORS_ROOM: &str = "operators";

pub fn customer_room(customer_id: Uuid) -> String {
    format!("customer:{}", customer_id)
}

/// An event delivered to every subscriber of a room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomMessage {
    pub event: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// In-process room fanout for websocket sessions. Rooms are created on
/// first touch and live for the process lifetime; an empty room simply
/// drops messages.
#[derive(Default)]
pub struct RealtimeHub {
    rooms: DashMap<String, broadcast::Sender<RoomMessage>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<RoomMessage> {
        self.room_sender(room).subscribe()
    }

    pub fn publish(&self, room: &str, event: &str, payload: Value) {
        let message = RoomMessage {
            event: event.to_string(),
            payload,
            timestamp: Utc::now(),
        };
        if self.room_sender(room).send(message).is_err() {
            trace!(room, event, "no sessions in room");
        }
    }

    fn room_sender(&self, room: &str) -> broadcast::Sender<RoomMessage> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn messages_reach_only_the_target_room() {
        let hub = RealtimeHub::new();
        let mut operators = hub.subscribe(OPERATORS_ROOM);
        let mut customer = hub.subscribe(&customer_room(Uuid::new_v4()));

        hub.publish(OPERATORS_ROOM, "new_order", json!({"orderNumber": "ORD-1-001"}));

        let got = operators.try_recv().unwrap();
        assert_eq!(got.event, "new_order");
        assert!(customer.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_to_an_empty_room_is_harmless() {
        let hub = RealtimeHub::new();
        hub.publish("customer:nobody", "order_status_update", json!({}));
    }
}
