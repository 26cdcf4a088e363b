mod common;

use assert_matches::assert_matches;
use common::{checkout_request, TestApp};
use orderflow::{
    auth::Actor,
    entities::{
        catalog_item::PriceType,
        notification_task::NotificationKind,
        order::{self, OrderStatus, PaymentStatus},
        order_item::{self, OrderItemStatus},
    },
    errors::ServiceError,
    services::order_status::{UpdateOrderStatusRequest, UpdatePaymentStatusRequest},
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

fn to_status(status: OrderStatus) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest {
        status,
        notes: None,
        tracking_number: None,
    }
}

fn to_payment(payment_status: PaymentStatus) -> UpdatePaymentStatusRequest {
    UpdatePaymentStatusRequest {
        payment_status,
        notes: None,
    }
}

async fn item_statuses(app: &TestApp, order_id: Uuid) -> Vec<OrderItemStatus> {
    order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&*app.db)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.status)
        .collect()
}

async fn kinds_for(app: &TestApp, order_id: Uuid) -> Vec<NotificationKind> {
    app.engine()
        .list_for_order(order_id)
        .await
        .unwrap()
        .into_iter()
        .map(|task| task.kind)
        .collect()
}

#[tokio::test]
async fn pending_order_cannot_skip_to_shipped() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 1).await;

    let err = app
        .services()
        .order_status
        .update_status(placed.order.id, to_status(OrderStatus::Shipped))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidStatusTransition { ref from, ref to } if from == "pending" && to == "shipped"
    );

    let stored = order::Entity::find_by_id(placed.order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.shipped_date.is_none());
}

#[tokio::test]
async fn full_lifecycle_sets_dates_once_and_settles_payment() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 3).await;
    let id = placed.order.id;
    let status = &app.services().order_status;

    status.update_status(id, to_status(OrderStatus::Processing)).await.unwrap();
    let shipped = status
        .update_status(
            id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Shipped,
                notes: Some("left the warehouse".into()),
                tracking_number: Some("1Z999".into()),
            },
        )
        .await
        .unwrap();
    assert!(shipped.shipped_date.is_some());
    assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999"));
    assert_eq!(shipped.admin_notes.as_deref(), Some("left the warehouse"));

    let delivered = status.update_status(id, to_status(OrderStatus::Delivered)).await.unwrap();
    assert_eq!(delivered.payment_status, PaymentStatus::Paid);
    assert!(delivered.payment_date.is_some());
    let first_delivery = delivered.delivered_date.expect("delivered date set");

    // Re-applying the same status keeps the original date.
    let again = status.update_status(id, to_status(OrderStatus::Delivered)).await.unwrap();
    assert_eq!(again.delivered_date, Some(first_delivery));
    assert_eq!(again.shipped_date, shipped.shipped_date);

    let kinds = kinds_for(&app, id).await;
    assert!(kinds.contains(&NotificationKind::OrderShipped));
    assert_eq!(
        kinds.iter().filter(|k| **k == NotificationKind::OrderDelivered).count(),
        1,
        "a no-op update does not notify again"
    );
    assert!(kinds.contains(&NotificationKind::PaymentSuccess));
}

#[tokio::test]
async fn cancellation_cascades_to_items_and_is_terminal() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(4.00), 2).await;
    let id = placed.order.id;

    let cancelled = app
        .services()
        .order_status
        .update_status(id, to_status(OrderStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(item_statuses(&app, id)
        .await
        .iter()
        .all(|s| *s == OrderItemStatus::Cancelled));
    assert!(kinds_for(&app, id).await.contains(&NotificationKind::OrderCancelled));

    let err = app
        .services()
        .order_status
        .update_status(id, to_status(OrderStatus::Processing))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatusTransition { .. });
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .services()
        .order_status
        .update_status(Uuid::new_v4(), to_status(OrderStatus::Processing))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn overlong_notes_are_rejected() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(4.00), 1).await;
    let limit = app.state.config.orders.admin_notes_max_len;

    let err = app
        .services()
        .order_status
        .update_status(
            placed.order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Processing,
                notes: Some("x".repeat(limit + 1)),
                tracking_number: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn paid_records_payment_date_once() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(9.99), 1).await;
    let status = &app.services().order_status;

    let paid = status
        .update_payment_status(placed.order.id, to_payment(PaymentStatus::Paid))
        .await
        .unwrap();
    let first = paid.payment_date.expect("payment date set");

    status
        .update_payment_status(placed.order.id, to_payment(PaymentStatus::Failed))
        .await
        .unwrap();
    let repaid = status
        .update_payment_status(placed.order.id, to_payment(PaymentStatus::Paid))
        .await
        .unwrap();
    assert_eq!(repaid.payment_date, Some(first));

    let kinds = kinds_for(&app, placed.order.id).await;
    assert!(kinds.contains(&NotificationKind::PaymentFailed));
    assert!(kinds.contains(&NotificationKind::PaymentFailedAdminAlert));
}

#[tokio::test]
async fn refund_returns_order_and_items() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 2).await;
    let id = placed.order.id;
    let status = &app.services().order_status;

    status.update_status(id, to_status(OrderStatus::Processing)).await.unwrap();
    let refunded = status
        .update_payment_status(id, to_payment(PaymentStatus::Refunded))
        .await
        .unwrap();

    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(refunded.status, OrderStatus::Returned);
    assert!(item_statuses(&app, id)
        .await
        .iter()
        .all(|s| *s == OrderItemStatus::Returned));
}

#[tokio::test]
async fn refund_of_cancelled_order_keeps_it_cancelled() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 1).await;
    let id = placed.order.id;
    let status = &app.services().order_status;

    status.update_status(id, to_status(OrderStatus::Cancelled)).await.unwrap();
    let refunded = status
        .update_payment_status(id, to_payment(PaymentStatus::Refunded))
        .await
        .unwrap();

    assert_eq!(refunded.status, OrderStatus::Cancelled);
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert!(item_statuses(&app, id)
        .await
        .iter()
        .all(|s| *s == OrderItemStatus::Returned));
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 1).await;
    let orders = &app.services().orders;

    let own = orders.get_order(placed.order.id, &app.customer).await.unwrap();
    assert_eq!(own.items.len(), 1);
    assert!(own.shipping_address.is_some());

    let stranger = orderflow::auth::Actor::customer(Uuid::new_v4(), "x@example.com", "X");
    let err = orders.get_order(placed.order.id, &stranger).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let page = orders.list_orders(&stranger, None, 1, 20).await.unwrap();
    assert_eq!(page.total, 0);
    let page = orders.list_orders(&app.admin, Some(OrderStatus::Pending), 1, 20).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn status_change_commits_when_its_notification_cannot_be_queued() {
    let app = TestApp::new().await;
    let customer = Actor::customer(Uuid::new_v4(), "", "No Inbox");
    let item = app.seed_item("SKU-Q", dec!(9.00), None, 1, &[]).await;
    let address = app.seed_address(&customer).await;
    app.add_to_cart(&customer, item.id, 2, PriceType::Standard)
        .await;
    let placed = app
        .services()
        .checkout
        .checkout(&customer, checkout_request(address.id))
        .await
        .unwrap();

    let cancelled = app
        .services()
        .order_status
        .update_status(placed.order.id, to_status(OrderStatus::Cancelled))
        .await
        .expect("status change must not depend on notifications");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let stored = order::Entity::find_by_id(placed.order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert!(item_statuses(&app, placed.order.id)
        .await
        .iter()
        .all(|s| *s == OrderItemStatus::Cancelled));
    assert!(!kinds_for(&app, placed.order.id)
        .await
        .contains(&NotificationKind::OrderCancelled));
}
