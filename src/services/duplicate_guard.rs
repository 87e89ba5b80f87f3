use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity},
    errors::ServiceError,
};

/// Identity of the paying party for duplicate detection. Registered
/// customers are keyed by id, guests by normalized email.
#[derive(Debug, Clone)]
pub enum Payer {
    Customer(Uuid),
    Guest(String),
}

impl Payer {
    pub fn guest(email: &str) -> Self {
        Payer::Guest(email.trim().to_lowercase())
    }
}

/// Rejects a checkout when the same payer already placed an order for the
/// same total inside the recent window. Runs after pricing and before the
/// gateway charge, so a duplicate costs nothing.
#[derive(Clone)]
pub struct DuplicateChargeGuard {
    db: Arc<DatabaseConnection>,
    window: Duration,
}

impl DuplicateChargeGuard {
    pub fn new(db: Arc<DatabaseConnection>, window_secs: i64) -> Self {
        Self {
            db,
            window: Duration::seconds(window_secs),
        }
    }

    #[instrument(skip(self), fields(total = %total))]
    pub async fn check(&self, payer: &Payer, total: Decimal) -> Result<(), ServiceError> {
        let since = Utc::now() - self.window;
        let mut query = OrderEntity::find()
            .filter(order::Column::Total.eq(total))
            .filter(order::Column::CreatedAt.gte(since));

        query = match payer {
            Payer::Customer(id) => query.filter(order::Column::CustomerId.eq(*id)),
            Payer::Guest(email) => query.filter(order::Column::GuestEmail.eq(email.clone())),
        };

        let hits = query.count(&*self.db).await?;
        if hits > 0 {
            warn!(hits, "rejected probable duplicate submission");
            return Err(ServiceError::DuplicateTransaction);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_payer_normalizes_email() {
        match Payer::guest("  Jane.Doe@Example.COM ") {
            Payer::Guest(email) => assert_eq!(email, "jane.doe@example.com"),
            _ => panic!("expected guest payer"),
        }
    }
}
