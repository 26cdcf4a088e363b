use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    config::OrderConfig,
    entities::{
        cart_item,
        order::{self, OrderStatus, PaymentStatus},
        order_item::{self, OrderItemStatus},
    },
    errors::ServiceError,
    notifications::OrderNotifier,
    services::{
        catalog::{AddressLookup, CatalogLookup},
        date_coded_number,
        orders::OrderDetails,
        pricing::resolve_unit_price,
    },
};

const ORDER_NUMBER_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub shipping_address_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Payment method is required"))]
    pub payment_method: String,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub shipping_amount: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
}

/// Order totals derived from the priced lines and the caller's adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

impl Totals {
    /// `final = subtotal + tax + shipping - discount`; adjustments and the
    /// final amount must not be negative.
    pub fn compute(
        subtotal: Decimal,
        tax: Decimal,
        shipping: Decimal,
        discount: Decimal,
    ) -> Result<Self, ServiceError> {
        for (name, value) in [("tax", tax), ("shipping", shipping), ("discount", discount)] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ServiceError::ValidationError(format!(
                    "{} amount must not be negative",
                    name
                )));
            }
        }

        let final_amount = subtotal + tax + shipping - discount;
        if final_amount.is_sign_negative() && !final_amount.is_zero() {
            return Err(ServiceError::ValidationError(
                "Discount exceeds the order total".to_string(),
            ));
        }

        Ok(Self {
            subtotal,
            tax,
            shipping,
            discount,
            final_amount,
        })
    }
}

/// Converts an actor's cart into an order in one transaction.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<dyn CatalogLookup>,
    addresses: Arc<dyn AddressLookup>,
    notifier: OrderNotifier,
    config: OrderConfig,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<dyn CatalogLookup>,
        addresses: Arc<dyn AddressLookup>,
        notifier: OrderNotifier,
        config: OrderConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            addresses,
            notifier,
            config,
        }
    }

    /// Places an order from the actor's cart.
    ///
    /// Prices are re-resolved from the catalog; the order, its items and the
    /// removal of the cart lines commit together or not at all. Notifications
    /// are queued after commit and cannot fail the checkout.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id, address_id = %request.shipping_address_id))]
    pub async fn checkout(
        &self,
        actor: &Actor,
        request: CheckoutRequest,
    ) -> Result<OrderDetails, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin checkout transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let details = match self.place_order(&txn, actor, &request).await {
            Ok(details) => details,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to roll back checkout: {}", rollback_err);
                }
                warn!(error = %e, "checkout aborted");
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit checkout: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        counter!("orderflow_checkout.completed", 1);
        info!(
            order_id = %details.order.id,
            order_number = %details.order.order_number,
            items = details.items.len(),
            final_amount = %details.order.final_amount,
            "order placed"
        );

        self.notifier
            .order_placed(&details.order, &details.items)
            .await;

        Ok(details)
    }

    async fn place_order(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
        request: &CheckoutRequest,
    ) -> Result<OrderDetails, ServiceError> {
        let lines = cart_item::Entity::find()
            .filter(cart_item::Column::ActorId.eq(actor.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(txn)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let address = self
            .addresses
            .get_address(txn, request.shipping_address_id, actor.id)
            .await?
            .ok_or(ServiceError::AddressNotFound(request.shipping_address_id))?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let mut items = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;
        for line in &lines {
            let entry = self
                .catalog
                .get_item(txn, line.catalog_item_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Catalog item {} not found",
                        line.catalog_item_id
                    ))
                })?;

            let unit_price = resolve_unit_price(&entry, line.quantity, line.price_type)?;
            let total_amount = unit_price * Decimal::from(line.quantity);
            subtotal += total_amount;

            items.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                catalog_item_id: Set(entry.item.id),
                sku: Set(entry.item.sku.clone()),
                name: Set(entry.item.name.clone()),
                quantity: Set(line.quantity),
                price_type: Set(line.price_type),
                unit_price: Set(unit_price),
                total_amount: Set(total_amount),
                status: Set(OrderItemStatus::Active),
                created_at: Set(now),
                updated_at: Set(None),
            });
        }

        let totals = Totals::compute(
            subtotal,
            request.tax_amount,
            request.shipping_amount,
            request.discount_amount,
        )?;

        let order_number = self.allocate_order_number(txn, now).await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            actor_id: Set(actor.id),
            customer_email: Set(actor.email.clone()),
            customer_name: Set(actor.name.clone()),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            subtotal: Set(totals.subtotal),
            tax_amount: Set(totals.tax),
            shipping_amount: Set(totals.shipping),
            discount_amount: Set(totals.discount),
            final_amount: Set(totals.final_amount),
            shipping_address_id: Set(address.id),
            payment_method: Set(request.payment_method.clone()),
            order_date: Set(now),
            shipped_date: Set(None),
            delivered_date: Set(None),
            payment_date: Set(None),
            admin_notes: Set(None),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(txn)
        .await
        .map_err(|e| {
            error!("Failed to insert order: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let mut saved_items = Vec::with_capacity(items.len());
        for item in items {
            saved_items.push(item.insert(txn).await.map_err(|e| {
                error!("Failed to insert order item: {}", e);
                ServiceError::DatabaseError(e)
            })?);
        }

        let line_ids: Vec<Uuid> = lines.iter().map(|line| line.id).collect();
        let removed = cart_item::Entity::delete_many()
            .filter(cart_item::Column::ActorId.eq(actor.id))
            .filter(cart_item::Column::Id.is_in(line_ids))
            .exec(txn)
            .await?;
        if removed.rows_affected != lines.len() as u64 {
            // A concurrent checkout consumed some of these lines first.
            return Err(ServiceError::Conflict(
                "Cart changed during checkout".to_string(),
            ));
        }

        Ok(OrderDetails {
            order,
            items: saved_items,
            shipping_address: Some(address),
        })
    }

    async fn allocate_order_number(
        &self,
        txn: &DatabaseTransaction,
        at: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = date_coded_number(&self.config.number_prefix, at);
            let taken = order::Entity::find()
                .filter(order::Column::OrderNumber.eq(candidate.as_str()))
                .count(txn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "Could not allocate a unique order number".to_string(),
        ))
    }
}
