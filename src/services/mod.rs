pub mod checkout;
pub mod duplicate_guard;
pub mod guests;
pub mod order_status;
pub mod orders;
pub mod pricing;
pub mod vault;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, events::ChangeFeed, gateway::PaymentGateway};

use self::{
    checkout::CheckoutOrchestrator, duplicate_guard::DuplicateChargeGuard, guests::GuestService,
    order_status::OrderStateMachine, orders::OrderService, pricing::PricingReconciler,
    vault::{CustomerLocks, PaymentVault},
};

/// Per-tenant service graph, assembled per request from the resolved
/// tenant connection. Construction is cheap; services are thin handles
/// over the shared connection and gateway.
pub struct TenantServices {
    pub checkout: CheckoutOrchestrator,
    pub orders: OrderService,
    pub vault: PaymentVault,
    pub state_machine: OrderStateMachine,
}

impl TenantServices {
    pub fn build(
        tenant: String,
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        feed: ChangeFeed,
        locks: CustomerLocks,
        config: &AppConfig,
    ) -> Self {
        let pricing = PricingReconciler::new(db.clone(), config.tax_rate);
        let guard = DuplicateChargeGuard::new(db.clone(), config.duplicate_window_secs as i64);
        let vault = PaymentVault::new(db.clone(), gateway.clone(), locks);
        let guests = GuestService::new(db.clone());
        let orders = OrderService::new(db.clone());
        let state_machine = OrderStateMachine::new(db.clone(), feed.clone(), tenant.clone());

        let checkout = CheckoutOrchestrator::new(
            db,
            pricing,
            guard,
            gateway,
            vault.clone(),
            guests,
            orders.clone(),
            state_machine.clone(),
            feed,
            tenant,
        );

        Self {
            checkout,
            orders,
            vault,
            state_machine,
        }
    }
}
