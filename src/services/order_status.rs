use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    errors::ServiceError,
    events::{ChangeFeed, ChangeOperation, OrderChange},
};

/// Order lifecycle status. `Delivered` and `Cancelled` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    ReadyForPickup,
    ReadyForDelivery,
    DriverAssigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The fixed transition table. Reassignment (`driver_assigned ->
    /// ready_for_delivery`) and failed-delivery retry (`in_transit ->
    /// ready_for_delivery`) are deliberate back-edges.
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Processing, Cancelled],
            Processing => &[ReadyForPickup, ReadyForDelivery, Cancelled],
            ReadyForPickup => &[Delivered, Cancelled],
            ReadyForDelivery => &[DriverAssigned, Cancelled],
            DriverAssigned => &[PickedUp, ReadyForDelivery, Cancelled],
            PickedUp => &[InTransit, Cancelled],
            InTransit => &[Delivered, ReadyForDelivery, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    /// Same-status transitions are a no-op, not an error.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self == target || self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Statuses that also produce a delivery tracking event.
    pub fn is_delivery_tracking(self) -> bool {
        matches!(
            self,
            OrderStatus::DriverAssigned | OrderStatus::ReadyForDelivery | OrderStatus::InTransit
        )
    }

    /// Customer-facing status message.
    pub fn customer_message(self, order_number: &str) -> String {
        match self {
            OrderStatus::Pending => format!(
                "Your order #{} has been placed and is awaiting confirmation",
                order_number
            ),
            OrderStatus::Processing => format!(
                "Great news! Your order #{} is being prepared by the store",
                order_number
            ),
            OrderStatus::ReadyForPickup => {
                format!("Your order #{} is ready for pickup at the store", order_number)
            }
            OrderStatus::ReadyForDelivery => format!(
                "Your order #{} is ready and waiting for driver assignment",
                order_number
            ),
            OrderStatus::DriverAssigned => format!(
                "A driver has been assigned to deliver your order #{}",
                order_number
            ),
            OrderStatus::PickedUp => format!(
                "Your order #{} has been picked up and is on its way!",
                order_number
            ),
            OrderStatus::InTransit => {
                format!("Your order #{} is on its way to you!", order_number)
            }
            OrderStatus::Delivered => format!(
                "Your order #{} has been successfully delivered. Thank you!",
                order_number
            ),
            OrderStatus::Cancelled => format!("Your order #{} has been cancelled", order_number),
        }
    }
}

pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::ValidationError(format!("Unknown order status: {}", raw)))
}

/// Single writer of `orders.status`. Every transition is validated against
/// the table above and applied with a compare-and-swap on the expected
/// current status, so two concurrent transitions on one order cannot both
/// succeed.
#[derive(Clone)]
pub struct OrderStateMachine {
    db: Arc<DatabaseConnection>,
    feed: ChangeFeed,
    tenant: String,
}

impl OrderStateMachine {
    pub fn new(db: Arc<DatabaseConnection>, feed: ChangeFeed, tenant: String) -> Self {
        Self { db, feed, tenant }
    }

    #[instrument(skip(self), fields(order_id = %order_id, target = %target))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        let current = parse_status(&order.status)?;
        if current == target {
            return Ok(order);
        }
        if !current.can_transition_to(target) {
            return Err(ServiceError::InvalidTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        // CAS on (id, expected status): a concurrent transition that got
        // there first leaves zero rows affected.
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(target.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.to_string()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        info!(
            order_number = %updated.order_number,
            from = %current,
            to = %target,
            "order status updated"
        );

        self.feed.publish(OrderChange {
            order_id,
            order_number: updated.order_number.clone(),
            status: target,
            operation: ChangeOperation::Updated,
            customer_id: updated.customer_id,
            tenant: self.tenant.clone(),
        });

        Ok(updated)
    }
}
