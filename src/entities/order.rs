use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A placed order. Line items live in `order_items`; monetary columns are a
/// snapshot taken at creation and never re-derived from the live catalog.
/// `status` is written only by the order state machine, and `updated_at` is
/// bumped on every mutation (the poll-mode notifier keys on it). Orders are
/// never deleted; cancellation is a terminal status.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub order_number: String,

    /// "user" or "guest"; exactly one of `customer_id` / `guest_id` is set.
    pub customer_type: String,
    pub customer_id: Option<Uuid>,
    pub guest_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,

    pub status: String,
    pub order_type: String,

    pub subtotal: Decimal,
    pub tax: Decimal,
    pub tip: Decimal,
    pub bag_fee: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,

    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,

    // Payment info: set once at capture, immutable afterwards.
    pub payment_transaction_id: String,
    /// "card" or "saved_card"
    pub payment_method: String,
    pub payment_amount: Decimal,

    // Refund info: set only on refund.
    pub refund_transaction_id: Option<String>,
    pub refund_amount: Option<Decimal>,
    pub refund_date: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
