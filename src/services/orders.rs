use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    },
    errors::ServiceError,
    services::order_status::OrderStatus,
};

/// An order together with its line items, in cart order.
#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Store-wide order counts shown on the operator dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total: u64,
    pub new: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub today: u64,
}

/// Read-side queries over the order store.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;
        self.with_items(order).await
    }

    pub async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::PaymentTransactionId.eq(transaction_id))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            out.push(self.with_items(order).await?);
        }
        Ok(out)
    }

    /// Orders touched since `checkpoint`, oldest first. Poll-mode change
    /// detection keys on `updated_at`.
    pub async fn updated_since(
        &self,
        checkpoint: DateTime<Utc>,
    ) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::UpdatedAt.gt(checkpoint))
            .order_by_asc(order::Column::UpdatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Dashboard counters. "New" means created within the last ten
    /// minutes, "today" since local midnight in UTC.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<OrderStats, ServiceError> {
        let now = Utc::now();
        let total = OrderEntity::find().count(&*self.db).await?;
        let new = OrderEntity::find()
            .filter(order::Column::CreatedAt.gte(now - Duration::minutes(10)))
            .count(&*self.db)
            .await?;
        let in_progress = OrderEntity::find()
            .filter(
                order::Column::Status.is_not_in([
                    OrderStatus::Delivered.to_string(),
                    OrderStatus::Cancelled.to_string(),
                ]),
            )
            .count(&*self.db)
            .await?;
        let completed = OrderEntity::find()
            .filter(order::Column::Status.eq(OrderStatus::Delivered.to_string()))
            .count(&*self.db)
            .await?;
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let today = OrderEntity::find()
            .filter(order::Column::CreatedAt.gte(midnight))
            .count(&*self.db)
            .await?;

        Ok(OrderStats {
            total,
            new,
            in_progress,
            completed,
            today,
        })
    }

    async fn with_items(&self, order: OrderModel) -> Result<OrderWithItems, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?;
        Ok(OrderWithItems { order, items })
    }
}
