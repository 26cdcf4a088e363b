use tracing::{info, warn};
use uuid::Uuid;

use super::engine::{NewNotification, NotificationEngine};
use super::templates;
use crate::entities::{
    notification_task::NotificationKind,
    order::{Model as Order, OrderStatus, PaymentStatus},
    order_item::Model as OrderItem,
};

/// Fans order lifecycle events out into notification tasks.
///
/// Every method is best-effort: failures are logged and never reach the
/// business operation that triggered them, which has already committed.
#[derive(Clone)]
pub struct OrderNotifier {
    engine: NotificationEngine,
    admin_recipients: Vec<String>,
}

struct Recipient {
    email: String,
    name: Option<String>,
    actor_id: Option<Uuid>,
}

impl OrderNotifier {
    pub fn new(engine: NotificationEngine, admin_recipients: Vec<String>) -> Self {
        Self {
            engine,
            admin_recipients,
        }
    }

    fn is_admin_alert(kind: NotificationKind) -> bool {
        matches!(
            kind,
            NotificationKind::OrderAdminAlert | NotificationKind::PaymentFailedAdminAlert
        )
    }

    fn recipients(&self, kind: NotificationKind, order: &Order) -> Vec<Recipient> {
        if Self::is_admin_alert(kind) {
            self.admin_recipients
                .iter()
                .map(|email| Recipient {
                    email: email.clone(),
                    name: None,
                    actor_id: None,
                })
                .collect()
        } else {
            vec![Recipient {
                email: order.customer_email.clone(),
                name: Some(order.customer_name.clone()),
                actor_id: Some(order.actor_id),
            }]
        }
    }

    /// Renders and enqueues `kind` for every recipient. Returns how many
    /// tasks were queued.
    pub async fn notify(&self, kind: NotificationKind, order: &Order, items: &[OrderItem]) -> usize {
        let recipients = self.recipients(kind, order);
        if recipients.is_empty() {
            warn!(order_id = %order.id, %kind, "no recipients configured for notification");
            return 0;
        }

        let rendered = templates::render(kind, order, items);
        let mut queued = 0;
        for recipient in recipients {
            let task = NewNotification::from_rendered(
                kind,
                recipient.email.clone(),
                recipient.name,
                recipient.actor_id,
                Some(order.id),
                rendered.clone(),
            );
            match self.engine.enqueue(task).await {
                Ok(task_id) => {
                    queued += 1;
                    info!(order_id = %order.id, %task_id, %kind, "notification queued");
                }
                Err(e) => warn!(
                    order_id = %order.id,
                    %kind,
                    recipient = %recipient.email,
                    error = %e,
                    "failed to queue notification"
                ),
            }
        }
        queued
    }

    /// Confirmation to the customer plus an alert to the admin distribution.
    pub async fn order_placed(&self, order: &Order, items: &[OrderItem]) -> usize {
        self.notify(NotificationKind::OrderConfirmation, order, items).await
            + self.notify(NotificationKind::OrderAdminAlert, order, items).await
    }

    pub async fn order_status_changed(
        &self,
        order: &Order,
        items: &[OrderItem],
        status: OrderStatus,
    ) -> usize {
        let kind = match status {
            OrderStatus::Shipped => NotificationKind::OrderShipped,
            OrderStatus::Delivered => NotificationKind::OrderDelivered,
            OrderStatus::Cancelled => NotificationKind::OrderCancelled,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Returned => return 0,
        };
        self.notify(kind, order, items).await
    }

    pub async fn payment_status_changed(
        &self,
        order: &Order,
        items: &[OrderItem],
        status: PaymentStatus,
    ) -> usize {
        match status {
            PaymentStatus::Paid => {
                self.notify(NotificationKind::PaymentSuccess, order, items)
                    .await
            }
            PaymentStatus::Failed => {
                self.notify(NotificationKind::PaymentFailed, order, items)
                    .await
                    + self
                        .notify(NotificationKind::PaymentFailedAdminAlert, order, items)
                        .await
            }
            PaymentStatus::Refunded => {
                self.notify(NotificationKind::PaymentRefunded, order, items)
                    .await
            }
            PaymentStatus::Pending => 0,
        }
    }
}
