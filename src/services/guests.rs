use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::guest::{self, Entity as GuestEntity, Model as GuestModel},
    errors::ServiceError,
};

/// Upserts guest contact records keyed by email. Guest checkouts reuse the
/// existing record rather than minting a new identity per order.
#[derive(Clone)]
pub struct GuestService {
    db: Arc<DatabaseConnection>,
}

impl GuestService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn upsert(&self, email: &str, phone: &str) -> Result<GuestModel, ServiceError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || phone.trim().is_empty() {
            return Err(ServiceError::MissingGuestContact);
        }

        let existing = GuestEntity::find()
            .filter(guest::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;

        let now = Utc::now();
        match existing {
            Some(found) => {
                if found.phone == phone {
                    return Ok(found);
                }
                let mut active: guest::ActiveModel = found.into();
                active.phone = Set(phone.to_string());
                active.updated_at = Set(now);
                Ok(active.update(&*self.db).await?)
            }
            None => {
                let active = guest::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    email: Set(email),
                    phone: Set(phone.to_string()),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                Ok(active.insert(&*self.db).await?)
            }
        }
    }
}
