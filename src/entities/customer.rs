use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered customer. `vault_profile_id` is the gateway's hosted profile
/// handle, created lazily on first card save and never regenerated while
/// valid. No card data is stored here.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub vault_profile_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment_instrument::Entity")]
    PaymentInstrument,
}

impl Related<super::payment_instrument::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentInstrument.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
