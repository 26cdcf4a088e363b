use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::OrderConfig,
    entities::{
        order::{self, Model as OrderModel, OrderStatus, PaymentStatus},
        order_item::{self, OrderItemStatus},
    },
    errors::ServiceError,
    notifications::OrderNotifier,
    services::orders::{find_order, load_items},
};

/// Statuses reachable from `from` in one step, excluding `from` itself.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
        OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Cancelled],
        OrderStatus::Shipped => &[OrderStatus::Delivered, OrderStatus::Returned],
        OrderStatus::Delivered => &[OrderStatus::Returned],
        OrderStatus::Cancelled | OrderStatus::Returned => &[],
    }
}

/// A same-status update is always legal; it only edits notes or tracking.
pub fn can_transition_to(from: OrderStatus, to: OrderStatus) -> bool {
    from == to || allowed_transitions(from).contains(&to)
}

/// Item status implied by an order status, if the order status cascades.
fn cascaded_item_status(status: OrderStatus) -> Option<OrderItemStatus> {
    match status {
        OrderStatus::Cancelled => Some(OrderItemStatus::Cancelled),
        OrderStatus::Returned => Some(OrderItemStatus::Returned),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Tracking number must be 1-100 characters"))]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
}

/// Snapshot of what a committed transition changed, used for post-commit
/// notifications.
struct Transition {
    order: OrderModel,
    items: Vec<order_item::Model>,
    status_changed: Option<OrderStatus>,
    payment_changed: Option<PaymentStatus>,
}

/// Applies order and payment status transitions with their side effects.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    notifier: OrderNotifier,
    config: OrderConfig,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, notifier: OrderNotifier, config: OrderConfig) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    fn check_notes(&self, notes: Option<&str>) -> Result<(), ServiceError> {
        match notes {
            Some(notes) if notes.chars().count() > self.config.admin_notes_max_len => {
                Err(ServiceError::ValidationError(format!(
                    "Notes exceed {} characters",
                    self.config.admin_notes_max_len
                )))
            }
            _ => Ok(()),
        }
    }

    /// Moves an order to `request.status`.
    ///
    /// Shipping and delivery dates are set the first time only. Delivery of an
    /// unpaid order settles it. Cancellation and return cascade to every item.
    #[instrument(skip(self, request), fields(order_id = %order_id, new_status = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<OrderModel, ServiceError> {
        request.validate()?;
        self.check_notes(request.notes.as_deref())?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let transition = match self.apply_status(&txn, order_id, &request).await {
            Ok(transition) => transition,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to roll back status update: {}", rollback_err);
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        self.after_commit(&transition).await;
        Ok(transition.order)
    }

    async fn apply_status(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        request: &UpdateOrderStatusRequest,
    ) -> Result<Transition, ServiceError> {
        let order = find_order(txn, order_id).await?;
        let old_status = order.status;
        let new_status = request.status;

        if !can_transition_to(old_status, new_status) {
            error!("Invalid status transition from {} to {}", old_status, new_status);
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let now = Utc::now();
        let mut payment_changed = None;
        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(now));
        if let Some(notes) = &request.notes {
            active.admin_notes = Set(Some(notes.clone()));
        }
        if let Some(tracking) = &request.tracking_number {
            active.tracking_number = Set(Some(tracking.clone()));
        }

        match new_status {
            OrderStatus::Shipped if order.shipped_date.is_none() => {
                active.shipped_date = Set(Some(now));
            }
            OrderStatus::Delivered => {
                if order.delivered_date.is_none() {
                    active.delivered_date = Set(Some(now));
                }
                if order.payment_status == PaymentStatus::Pending {
                    active.payment_status = Set(PaymentStatus::Paid);
                    if order.payment_date.is_none() {
                        active.payment_date = Set(Some(now));
                    }
                    payment_changed = Some(PaymentStatus::Paid);
                }
            }
            _ => {}
        }

        let updated = active.update(txn).await.map_err(|e| {
            error!("Failed to update order {} status: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        if let Some(item_status) = cascaded_item_status(new_status) {
            cascade_items(txn, order_id, item_status, now).await?;
        }

        let items = load_items(txn, order_id).await?;
        let status_changed = (old_status != new_status).then_some(new_status);
        if status_changed.is_some() {
            info!(
                "Order {} status updated from '{}' to '{}'",
                order_id, old_status, new_status
            );
        }

        Ok(Transition {
            order: updated,
            items,
            status_changed,
            payment_changed,
        })
    }

    /// Sets the payment status. Any value may follow any other.
    ///
    /// `paid` records the payment date once; `refunded` returns the order
    /// unless it is already cancelled or returned, and always marks every
    /// item returned.
    #[instrument(skip(self, request), fields(order_id = %order_id, payment_status = %request.payment_status))]
    pub async fn update_payment_status(
        &self,
        order_id: Uuid,
        request: UpdatePaymentStatusRequest,
    ) -> Result<OrderModel, ServiceError> {
        request.validate()?;
        self.check_notes(request.notes.as_deref())?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let transition = match self.apply_payment(&txn, order_id, &request).await {
            Ok(transition) => transition,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to roll back payment update: {}", rollback_err);
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        self.after_commit(&transition).await;
        Ok(transition.order)
    }

    async fn apply_payment(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        request: &UpdatePaymentStatusRequest,
    ) -> Result<Transition, ServiceError> {
        let order = find_order(txn, order_id).await?;
        let old_payment = order.payment_status;
        let new_payment = request.payment_status;
        let now = Utc::now();

        let mut status_changed = None;
        let mut active: order::ActiveModel = order.clone().into();
        active.payment_status = Set(new_payment);
        active.updated_at = Set(Some(now));
        if let Some(notes) = &request.notes {
            active.admin_notes = Set(Some(notes.clone()));
        }

        match new_payment {
            PaymentStatus::Paid if order.payment_date.is_none() => {
                active.payment_date = Set(Some(now));
            }
            PaymentStatus::Refunded => {
                if !matches!(order.status, OrderStatus::Cancelled | OrderStatus::Returned) {
                    active.status = Set(OrderStatus::Returned);
                    status_changed = Some(OrderStatus::Returned);
                }
            }
            _ => {}
        }

        let updated = active.update(txn).await.map_err(|e| {
            error!("Failed to update order {} payment status: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        if new_payment == PaymentStatus::Refunded {
            cascade_items(txn, order_id, OrderItemStatus::Returned, now).await?;
        }

        let items = load_items(txn, order_id).await?;
        let payment_changed = (old_payment != new_payment).then_some(new_payment);
        if payment_changed.is_some() {
            info!(
                "Order {} payment status updated from '{}' to '{}'",
                order_id, old_payment, new_payment
            );
        }

        Ok(Transition {
            order: updated,
            items,
            status_changed,
            payment_changed,
        })
    }

    async fn after_commit(&self, transition: &Transition) {
        if let Some(status) = transition.status_changed {
            counter!("orderflow_orders.status_changed", 1, "status" => status.to_string());
            self.notifier
                .order_status_changed(&transition.order, &transition.items, status)
                .await;
        }
        if let Some(payment) = transition.payment_changed {
            self.notifier
                .payment_status_changed(&transition.order, &transition.items, payment)
                .await;
        }
    }
}

async fn cascade_items(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    status: OrderItemStatus,
    at: DateTime<Utc>,
) -> Result<u64, ServiceError> {
    let result = order_item::Entity::update_many()
        .col_expr(order_item::Column::Status, Expr::value(status))
        .col_expr(order_item::Column::UpdatedAt, Expr::value(Some(at)))
        .filter(order_item::Column::OrderId.eq(order_id))
        .exec(txn)
        .await
        .map_err(|e| {
            error!("Failed to cascade item status for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;
    Ok(result.rows_affected)
}
