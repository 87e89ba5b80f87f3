use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Model as OrderModel},
        order_item,
    },
    errors::ServiceError,
    events::{ChangeFeed, ChangeOperation, OrderChange},
    gateway::{Address, ChargeLineItem, ChargeReceipt, PaymentGateway, PaymentToken},
    money::Money,
    services::{
        duplicate_guard::{DuplicateChargeGuard, Payer},
        guests::GuestService,
        order_status::{OrderStateMachine, OrderStatus},
        orders::{OrderService, OrderWithItems},
        pricing::{CartItemInput, Fees, PricedCart, PricingReconciler},
        vault::PaymentVault,
    },
};

/// How the order is fulfilled. Only delivery orders carry a shipping
/// address.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderType {
    Pickup,
    #[default]
    Delivery,
}

/// Common cart-level fields shared by every checkout flavor.
#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub items: Vec<CartItemInput>,
    pub fees: Fees,
    pub declared_amount: Decimal,
    pub order_type: OrderType,
    pub bill_to: Address,
    pub ship_to: Option<Address>,
}

/// Identity of the checkout initiator.
#[derive(Debug, Clone)]
pub enum CheckoutParty {
    Customer { id: Uuid, email: String },
    Guest { email: String, phone: String },
}

/// How the charge is funded.
#[derive(Debug, Clone)]
pub enum Funding {
    /// A fresh client-side token, optionally vaulted after the charge.
    Token {
        token: PaymentToken,
        save_card: bool,
    },
    /// An already vaulted instrument owned by the customer.
    SavedInstrument { instrument_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub order: OrderModel,
    pub refund_transaction_id: String,
}

/// Drives a checkout end to end: price reconciliation, duplicate guard,
/// gateway charge, order persistence, optional card vaulting, and the
/// created-order event. Ordering is strict; nothing is charged before the
/// cart has been repriced and the duplicate window checked.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    db: Arc<DatabaseConnection>,
    pricing: PricingReconciler,
    guard: DuplicateChargeGuard,
    gateway: Arc<dyn PaymentGateway>,
    vault: PaymentVault,
    guests: GuestService,
    orders: OrderService,
    state_machine: OrderStateMachine,
    feed: ChangeFeed,
    tenant: String,
}

impl CheckoutOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        pricing: PricingReconciler,
        guard: DuplicateChargeGuard,
        gateway: Arc<dyn PaymentGateway>,
        vault: PaymentVault,
        guests: GuestService,
        orders: OrderService,
        state_machine: OrderStateMachine,
        feed: ChangeFeed,
        tenant: String,
    ) -> Self {
        Self {
            db,
            pricing,
            guard,
            gateway,
            vault,
            guests,
            orders,
            state_machine,
            feed,
            tenant,
        }
    }

    /// Checkout for a registered customer.
    #[instrument(skip(self, input, funding), fields(customer_id = %customer_id))]
    pub async fn process_customer(
        &self,
        customer_id: Uuid,
        customer_email: String,
        input: CheckoutInput,
        funding: Funding,
    ) -> Result<OrderWithItems, ServiceError> {
        let party = CheckoutParty::Customer {
            id: customer_id,
            email: customer_email,
        };
        self.process(party, input, funding).await
    }

    /// Checkout for an anonymous guest. Guests always pay with a fresh
    /// token; there is no guest vault.
    #[instrument(skip(self, input, token))]
    pub async fn process_guest(
        &self,
        email: &str,
        phone: &str,
        input: CheckoutInput,
        token: PaymentToken,
    ) -> Result<OrderWithItems, ServiceError> {
        if email.trim().is_empty() || phone.trim().is_empty() {
            return Err(ServiceError::MissingGuestContact);
        }
        let party = CheckoutParty::Guest {
            email: email.to_string(),
            phone: phone.to_string(),
        };
        self.process(
            party,
            input,
            Funding::Token {
                token,
                save_card: false,
            },
        )
        .await
    }

    async fn process(
        &self,
        party: CheckoutParty,
        mut input: CheckoutInput,
        funding: Funding,
    ) -> Result<OrderWithItems, ServiceError> {
        // Pickup orders never carry a shipping address, whatever the
        // client sent.
        if input.order_type != OrderType::Delivery {
            input.ship_to = None;
        }

        // 1. Reprice from the catalog; mismatches stop here.
        let cart = self
            .pricing
            .reconcile(&input.items, &input.fees, input.declared_amount)
            .await?;

        // 2. Duplicate window, before any money moves.
        let payer = match &party {
            CheckoutParty::Customer { id, .. } => Payer::Customer(*id),
            CheckoutParty::Guest { email, .. } => Payer::guest(email),
        };
        self.guard.check(&payer, cart.total).await?;

        // 3. Charge. The gateway sees the recomputed total, never the
        // client's number.
        let order_number = generate_order_number();
        let line_items = charge_line_items(&cart);
        let receipt = match &funding {
            Funding::Token { token, .. } => {
                self.gateway
                    .tokenize_and_charge(
                        token,
                        cart.total,
                        &input.bill_to,
                        input.ship_to.as_ref(),
                        &line_items,
                        &order_number,
                    )
                    .await?
            }
            Funding::SavedInstrument { instrument_id } => {
                let customer_id = match &party {
                    CheckoutParty::Customer { id, .. } => *id,
                    CheckoutParty::Guest { .. } => {
                        return Err(ServiceError::ValidationError(
                            "saved cards require a registered customer".to_string(),
                        ))
                    }
                };
                let instrument = self.vault.get(customer_id, *instrument_id).await?;
                self.gateway
                    .charge_vaulted_instrument(
                        &instrument.vault_profile_id,
                        &instrument.vault_instrument_id,
                        cart.total,
                        &input.bill_to,
                        input.ship_to.as_ref(),
                        &order_number,
                    )
                    .await?
            }
        };

        // 4. Persist. A failure past this point has already captured
        // funds, so it is logged loudly before surfacing.
        let persisted = self
            .persist_order(&party, &input, &cart, &receipt, &order_number, &funding)
            .await
            .map_err(|err| {
                error!(
                    transaction_id = %receipt.transaction_id,
                    order_number = %order_number,
                    error = %err,
                    "order persistence failed after successful charge"
                );
                err
            })?;

        // 5. Best-effort card save; never fails the checkout.
        if let (
            Funding::Token {
                token,
                save_card: true,
            },
            CheckoutParty::Customer { id, .. },
        ) = (&funding, &party)
        {
            if let Err(err) = self
                .vault
                .add_instrument(*id, token, &input.bill_to, false)
                .await
            {
                warn!(customer_id = %id, error = %err, "card save after checkout failed");
            }
        }

        info!(
            order_number = %order_number,
            total = %cart.total,
            transaction_id = %receipt.transaction_id,
            "checkout completed"
        );

        self.feed.publish(OrderChange {
            order_id: persisted.order.id,
            order_number: order_number.clone(),
            status: OrderStatus::Pending,
            operation: ChangeOperation::Created,
            customer_id: persisted.order.customer_id,
            tenant: self.tenant.clone(),
        });

        Ok(persisted)
    }

    async fn persist_order(
        &self,
        party: &CheckoutParty,
        input: &CheckoutInput,
        cart: &PricedCart,
        receipt: &ChargeReceipt,
        order_number: &str,
        funding: &Funding,
    ) -> Result<OrderWithItems, ServiceError> {
        let (customer_type, customer_id, guest_id, guest_email, guest_phone) = match party {
            CheckoutParty::Customer { id, .. } => {
                ("user".to_string(), Some(*id), None, None, None)
            }
            CheckoutParty::Guest { email, phone } => {
                let guest = self.guests.upsert(email, phone).await?;
                (
                    "guest".to_string(),
                    None,
                    Some(guest.id),
                    Some(guest.email),
                    Some(guest.phone),
                )
            }
        };

        let payment_method = match funding {
            Funding::Token { .. } => "card",
            Funding::SavedInstrument { .. } => "saved_card",
        };

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let txn = self.db.begin().await?;

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.to_string()),
            customer_type: Set(customer_type),
            customer_id: Set(customer_id),
            guest_id: Set(guest_id),
            guest_email: Set(guest_email),
            guest_phone: Set(guest_phone),
            status: Set(OrderStatus::Pending.to_string()),
            order_type: Set(input.order_type.to_string()),
            subtotal: Set(cart.subtotal),
            tax: Set(cart.tax),
            tip: Set(cart.tip),
            bag_fee: Set(cart.bag_fee),
            delivery_fee: Set(cart.delivery_fee),
            total: Set(cart.total),
            shipping_address: Set(input
                .ship_to
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            billing_address: Set(Some(
                serde_json::to_string(&input.bill_to)
                    .map_err(|e| ServiceError::InternalError(e.to_string()))?,
            )),
            payment_transaction_id: Set(receipt.transaction_id.clone()),
            payment_method: Set(payment_method.to_string()),
            payment_amount: Set(cart.total),
            refund_transaction_id: Set(None),
            refund_amount: Set(None),
            refund_date: Set(None),
            refund_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(0),
        }
        .insert(&txn)
        .await?;

        for (position, item) in cart.items.iter().enumerate() {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                name: Set(item.name.clone()),
                unit_price: Set(item.unit_price),
                quantity: Set(item.quantity),
                image_url: Set(item.image_url.clone()),
                position: Set(position as i32),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        self.orders.get(order_id).await
    }

    /// Refund an order, fully by default or partially when `amount` is
    /// given. The order is cancelled afterwards when its status allows;
    /// a delivered order keeps its status and only gains refund fields.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<String>,
    ) -> Result<RefundOutcome, ServiceError> {
        let OrderWithItems { order, .. } = self.orders.get(order_id).await?;

        if order.refund_transaction_id.is_some() {
            return Err(ServiceError::ValidationError(
                "order has already been refunded".to_string(),
            ));
        }

        let amount = Money::from(amount.unwrap_or(order.total)).rounded().amount();
        if amount <= Decimal::ZERO || amount > order.total {
            return Err(ServiceError::ValidationError(format!(
                "refund amount {} is outside (0, {}]",
                amount, order.total
            )));
        }

        let receipt = self
            .gateway
            .refund(&order.payment_transaction_id, amount)
            .await?;

        let mut active: order::ActiveModel = order.clone().into();
        active.refund_transaction_id = Set(Some(receipt.refund_transaction_id.clone()));
        active.refund_amount = Set(Some(amount));
        active.refund_date = Set(Some(Utc::now()));
        active.refund_reason = Set(reason);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        // Cancellation is a courtesy; terminal orders stay as they are.
        let current = crate::services::order_status::parse_status(&updated.status)?;
        let order = if current.can_transition_to(OrderStatus::Cancelled) {
            self.state_machine
                .transition(order_id, OrderStatus::Cancelled)
                .await?
        } else {
            updated
        };

        info!(
            order_number = %order.order_number,
            amount = %amount,
            refund_transaction_id = %receipt.refund_transaction_id,
            "order refunded"
        );

        Ok(RefundOutcome {
            order,
            refund_transaction_id: receipt.refund_transaction_id,
        })
    }
}

/// Human-quotable order reference: creation millis plus a 3-digit
/// discriminator for same-millisecond collisions.
pub fn generate_order_number() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("ORD-{}-{:03}", millis, suffix)
}

fn charge_line_items(cart: &PricedCart) -> Vec<ChargeLineItem> {
    cart.items
        .iter()
        .map(|item| ChargeLineItem {
            item_ref: item.product_id.to_string(),
            name: item.name.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
        })
        .collect()
}
