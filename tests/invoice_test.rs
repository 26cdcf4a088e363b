mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use orderflow::{
    entities::{invoice::InvoiceStatus, order},
    errors::ServiceError,
    services::invoicing::{CreateInvoiceRequest, UpdateInvoiceRequest},
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

#[tokio::test]
async fn invoice_copies_order_amounts_once() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(25.00), 2).await;
    let invoices = &app.services().invoices;

    let invoice = invoices
        .create_invoice(placed.order.id, CreateInvoiceRequest::default())
        .await
        .unwrap();
    assert_eq!(invoice.amount, dec!(50.00));
    assert_eq!(invoice.tax_amount, dec!(0));
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.payment_method.as_deref(), Some("card"));
    assert!(invoice.invoice_number.starts_with("INV-"));
    assert!(invoice.due_date > invoice.issue_date);

    let err = invoices
        .create_invoice(placed.order.id, CreateInvoiceRequest::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvoiceAlreadyExists(id) if id == placed.order.id);

    // Later edits to the order do not flow into the issued invoice.
    let stored = order::Entity::find_by_id(placed.order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: order::ActiveModel = stored.into();
    active.final_amount = Set(dec!(999.00));
    active.update(&*app.db).await.unwrap();

    let reread = invoices.get_invoice_for_order(placed.order.id).await.unwrap();
    assert_eq!(reread.id, invoice.id);
    assert_eq!(reread.amount, dec!(50.00));
}

#[tokio::test]
async fn invoice_for_unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .services()
        .invoices
        .create_invoice(Uuid::new_v4(), CreateInvoiceRequest::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn due_date_in_the_past_is_rejected() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(5.00), 1).await;

    let err = app
        .services()
        .invoices
        .create_invoice(
            placed.order.id,
            CreateInvoiceRequest {
                due_date: Some(Utc::now() - Duration::days(10)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn paying_an_invoice_records_the_payment_date() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(5.00), 1).await;
    let invoices = &app.services().invoices;
    let invoice = invoices
        .create_invoice(placed.order.id, CreateInvoiceRequest::default())
        .await
        .unwrap();

    let paid = invoices
        .update_invoice(
            invoice.id,
            UpdateInvoiceRequest {
                status: Some(InvoiceStatus::Paid),
                payment_reference: Some("TX-42".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let paid_at = paid.payment_date.expect("payment date set");
    assert_eq!(paid.payment_reference.as_deref(), Some("TX-42"));

    let noted = invoices
        .update_invoice(
            invoice.id,
            UpdateInvoiceRequest {
                status: Some(InvoiceStatus::Paid),
                notes: Some("reconciled".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(noted.payment_date, Some(paid_at));
    assert_eq!(noted.notes.as_deref(), Some("reconciled"));
}

#[tokio::test]
async fn sweep_marks_only_late_pending_invoices_overdue() {
    let app = TestApp::new().await;
    let invoices = &app.services().invoices;

    let late = app.place_simple_order(dec!(5.00), 1).await;
    let late_invoice = invoices
        .create_invoice(
            late.order.id,
            CreateInvoiceRequest {
                due_date: Some(Utc::now() + Duration::days(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let settled = app.place_simple_order(dec!(7.00), 1).await;
    let settled_invoice = invoices
        .create_invoice(
            settled.order.id,
            CreateInvoiceRequest {
                due_date: Some(Utc::now() + Duration::days(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    invoices
        .update_invoice(
            settled_invoice.id,
            UpdateInvoiceRequest {
                status: Some(InvoiceStatus::Paid),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let not_yet = invoices.mark_overdue(Utc::now()).await.unwrap();
    assert_eq!(not_yet, 0);

    let marked = invoices
        .mark_overdue(Utc::now() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(marked, 1);
    assert_eq!(
        invoices.get_invoice(late_invoice.id).await.unwrap().status,
        InvoiceStatus::Overdue
    );
    assert_eq!(
        invoices.get_invoice(settled_invoice.id).await.unwrap().status,
        InvoiceStatus::Paid
    );
}
