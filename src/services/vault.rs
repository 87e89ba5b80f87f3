use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        customer::{self, Entity as CustomerEntity, Model as CustomerModel},
        payment_instrument::{self, Entity as InstrumentEntity, Model as InstrumentModel},
    },
    errors::ServiceError,
    gateway::{Address, GatewayError, PaymentGateway, PaymentToken},
};

pub const MAX_INSTRUMENTS: u64 = 3;

/// Per-customer write locks. Vault mutations for one customer are
/// serialized so the instrument-count and single-default invariants hold
/// under concurrent requests.
#[derive(Clone, Default)]
pub struct CustomerLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CustomerLocks {
    pub fn for_customer(&self, customer_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(customer_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Outcome of reconciling local instrument rows against the gateway vault.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub valid: Vec<InstrumentModel>,
    pub removed: Vec<InstrumentModel>,
}

/// Manages saved payment instruments. The gateway vault is the source of
/// truth for card details; local rows only carry display metadata and the
/// default flag.
#[derive(Clone)]
pub struct PaymentVault {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    locks: CustomerLocks,
}

impl PaymentVault {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        locks: CustomerLocks,
    ) -> Self {
        Self { db, gateway, locks }
    }

    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<InstrumentModel>, ServiceError> {
        Ok(InstrumentEntity::find()
            .filter(payment_instrument::Column::CustomerId.eq(customer_id))
            .order_by_asc(payment_instrument::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(
        &self,
        customer_id: Uuid,
        instrument_id: Uuid,
    ) -> Result<InstrumentModel, ServiceError> {
        InstrumentEntity::find_by_id(instrument_id)
            .filter(payment_instrument::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InstrumentNotFound(instrument_id.to_string()))
    }

    pub async fn default_instrument(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<InstrumentModel>, ServiceError> {
        Ok(InstrumentEntity::find()
            .filter(payment_instrument::Column::CustomerId.eq(customer_id))
            .filter(payment_instrument::Column::IsDefault.eq(true))
            .one(&*self.db)
            .await?)
    }

    /// Vault a tokenized card for a customer. Creates the hosted profile on
    /// first use, enforces the instrument cap, and pulls display details
    /// back from the gateway rather than trusting the client.
    #[instrument(skip(self, token, bill_to), fields(customer_id = %customer_id))]
    pub async fn add_instrument(
        &self,
        customer_id: Uuid,
        token: &PaymentToken,
        bill_to: &Address,
        make_default: bool,
    ) -> Result<InstrumentModel, ServiceError> {
        let lock = self.locks.for_customer(customer_id);
        let _guard = lock.lock().await;

        let customer = self.find_customer(customer_id).await?;

        let count = InstrumentEntity::find()
            .filter(payment_instrument::Column::CustomerId.eq(customer_id))
            .count(&*self.db)
            .await?;
        if count >= MAX_INSTRUMENTS {
            return Err(ServiceError::VaultFull);
        }

        let profile_id = self.ensure_profile(&customer).await?;
        let instrument_id = self
            .gateway
            .add_vaulted_instrument(&profile_id, token, bill_to)
            .await?;
        let details = self
            .gateway
            .instrument_details(&profile_id, &instrument_id)
            .await?;

        // First instrument is always the default.
        let is_default = make_default || count == 0;
        if is_default {
            self.clear_default(customer_id).await?;
        }

        let model = payment_instrument::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            vault_profile_id: Set(profile_id),
            vault_instrument_id: Set(instrument_id),
            card_type: Set(details.card_type),
            last_four: Set(details.last_four),
            expiry_month: Set(details.expiry_month),
            expiry_year: Set(details.expiry_year),
            cardholder_name: Set(details.cardholder_name),
            is_default: Set(is_default),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(instrument = %model.id, "payment instrument vaulted");
        Ok(model)
    }

    /// Remove an instrument. The remote delete is best-effort: a gateway
    /// failure is logged and the local row is removed anyway, leaving the
    /// drift to the next reconcile. Deleting the default promotes the
    /// oldest remaining instrument.
    #[instrument(skip(self), fields(customer_id = %customer_id, instrument_id = %instrument_id))]
    pub async fn remove_instrument(
        &self,
        customer_id: Uuid,
        instrument_id: Uuid,
    ) -> Result<(), ServiceError> {
        let lock = self.locks.for_customer(customer_id);
        let _guard = lock.lock().await;

        let instrument = self.get(customer_id, instrument_id).await?;

        if let Err(err) = self
            .gateway
            .delete_vaulted_instrument(&instrument.vault_profile_id, &instrument.vault_instrument_id)
            .await
        {
            warn!(error = %err, "remote instrument delete failed, removing local row anyway");
        }

        let was_default = instrument.is_default;
        InstrumentEntity::delete_by_id(instrument_id)
            .exec(&*self.db)
            .await?;

        if was_default {
            let oldest = InstrumentEntity::find()
                .filter(payment_instrument::Column::CustomerId.eq(customer_id))
                .order_by_asc(payment_instrument::Column::CreatedAt)
                .one(&*self.db)
                .await?;
            if let Some(next) = oldest {
                let mut active: payment_instrument::ActiveModel = next.into();
                active.is_default = Set(true);
                active.update(&*self.db).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn set_default(
        &self,
        customer_id: Uuid,
        instrument_id: Uuid,
    ) -> Result<InstrumentModel, ServiceError> {
        let lock = self.locks.for_customer(customer_id);
        let _guard = lock.lock().await;

        let instrument = self.get(customer_id, instrument_id).await?;
        self.clear_default(customer_id).await?;
        let mut active: payment_instrument::ActiveModel = instrument.into();
        active.is_default = Set(true);
        Ok(active.update(&*self.db).await?)
    }

    /// Drift repair: look up each local row in the gateway vault and drop
    /// the rows whose lookup fails. A missing gateway configuration aborts
    /// instead, since that would classify every card as invalid.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn reconcile(&self, customer_id: Uuid) -> Result<ReconcileOutcome, ServiceError> {
        let lock = self.locks.for_customer(customer_id);
        let _guard = lock.lock().await;

        let instruments = InstrumentEntity::find()
            .filter(payment_instrument::Column::CustomerId.eq(customer_id))
            .order_by_asc(payment_instrument::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut valid = Vec::new();
        let mut removed = Vec::new();
        for instrument in instruments {
            match self
                .gateway
                .instrument_details(&instrument.vault_profile_id, &instrument.vault_instrument_id)
                .await
            {
                Ok(_) => valid.push(instrument),
                Err(GatewayError::ConfigMissing) => {
                    return Err(GatewayError::ConfigMissing.into());
                }
                Err(err) => {
                    warn!(
                        instrument = %instrument.id,
                        error = %err,
                        "dropping instrument that failed the gateway vault lookup"
                    );
                    InstrumentEntity::delete_by_id(instrument.id)
                        .exec(&*self.db)
                        .await?;
                    removed.push(instrument);
                }
            }
        }

        // Repair the default flag if the default was among the removals.
        if !removed.is_empty() && !valid.is_empty() && !valid.iter().any(|i| i.is_default) {
            let mut active: payment_instrument::ActiveModel = valid[0].clone().into();
            active.is_default = Set(true);
            valid[0] = active.update(&*self.db).await?;
        }

        Ok(ReconcileOutcome { valid, removed })
    }

    /// Refresh locally cached display fields from the gateway vault.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn sync_details(&self, customer_id: Uuid) -> Result<Vec<InstrumentModel>, ServiceError> {
        let lock = self.locks.for_customer(customer_id);
        let _guard = lock.lock().await;

        let instruments = InstrumentEntity::find()
            .filter(payment_instrument::Column::CustomerId.eq(customer_id))
            .order_by_asc(payment_instrument::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut refreshed = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            match self
                .gateway
                .instrument_details(&instrument.vault_profile_id, &instrument.vault_instrument_id)
                .await
            {
                Ok(details) => {
                    let mut active: payment_instrument::ActiveModel = instrument.into();
                    active.card_type = Set(details.card_type);
                    active.last_four = Set(details.last_four);
                    active.expiry_month = Set(details.expiry_month);
                    active.expiry_year = Set(details.expiry_year);
                    active.cardholder_name = Set(details.cardholder_name);
                    refreshed.push(active.update(&*self.db).await?);
                }
                Err(err) => {
                    warn!(instrument_err = %err, "skipping instrument during detail sync");
                    continue;
                }
            }
        }
        Ok(refreshed)
    }

    /// Return the customer's hosted profile id, creating it on first use.
    /// The id is persisted before any instrument is attached so a later
    /// failure cannot orphan the remote profile.
    async fn ensure_profile(&self, customer: &CustomerModel) -> Result<String, ServiceError> {
        if let Some(ref profile_id) = customer.vault_profile_id {
            return Ok(profile_id.clone());
        }

        let profile_id = self
            .gateway
            .create_vault_profile(
                &customer.id.to_string(),
                &customer.email,
                &format!("Storefront customer {}", customer.email),
            )
            .await?;

        let mut active: customer::ActiveModel = customer.clone().into();
        active.vault_profile_id = Set(Some(profile_id.clone()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        info!(customer_id = %customer.id, "vault profile created");
        Ok(profile_id)
    }

    async fn clear_default(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        use sea_orm::sea_query::Expr;
        InstrumentEntity::update_many()
            .col_expr(payment_instrument::Column::IsDefault, Expr::value(false))
            .filter(payment_instrument::Column::CustomerId.eq(customer_id))
            .filter(payment_instrument::Column::IsDefault.eq(true))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    async fn find_customer(&self, customer_id: Uuid) -> Result<CustomerModel, ServiceError> {
        CustomerEntity::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::UserNotFound(customer_id.to_string()))
    }
}
