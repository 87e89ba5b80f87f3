use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::services::order_status::OrderStatus;

/// Whether a change represents a newly created order or a mutation of an
/// existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Created,
    Updated,
}

/// A single order mutation as seen by observers. This is the event shape
/// both notifier backends consume; consumers must tolerate duplicates
/// (delivery is at-least-once).
#[derive(Debug, Clone, Serialize)]
pub struct OrderChange {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub operation: ChangeOperation,
    /// Owning registered customer, when the order is not a guest order.
    pub customer_id: Option<Uuid>,
    /// Tenant the order belongs to; used for per-store statistics.
    pub tenant: String,
}

/// In-process change feed over the order store. Order-writing services
/// publish here; the push-mode notifier subscribes. Publishing never
/// blocks or fails the primary operation.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<OrderChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, change: OrderChange) {
        // A send error only means nobody is listening right now.
        if self.tx.send(change).is_err() {
            trace!("order change published with no active subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
