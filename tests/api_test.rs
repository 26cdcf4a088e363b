mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use orderflow::{
    entities::{
        catalog_item::PriceType,
        invoice::{self, InvoiceStatus},
        order::{self, OrderStatus},
    },
    errors::ErrorResponse,
    notifications::{QueueDepth, TaskStatusView},
    services::{
        invoicing::CreateInvoiceRequest,
        order_status::UpdateOrderStatusRequest,
        orders::OrderDetails,
    },
    ApiResponse,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

#[tokio::test]
async fn checkout_over_http_places_the_order() {
    let app = TestApp::new().await;
    let item = app
        .seed_item("SKU-A", dec!(10.00), None, 1, &[(10, dec!(8.00))])
        .await;
    let address = app.seed_address(&app.customer).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(&app.customer),
            Some(json!({ "catalog_item_id": item.id, "quantity": 12, "price_type": "standard" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(&app.customer),
            Some(json!({
                "shipping_address_id": address.id,
                "payment_method": "card",
                "tax_amount": "5",
                "shipping_amount": "10"
            })),
        )
        .await;
    let (status, body): (_, ApiResponse<OrderDetails>) = common::response_json(response).await;
    assert_eq!(status, StatusCode::CREATED);
    let details = body.data.expect("order in response");
    assert_eq!(details.order.subtotal, dec!(96.00));
    assert_eq!(details.order.final_amount, dec!(111.00));
    assert_eq!(details.items[0].unit_price, dec!(8.00));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", details.order.id),
            Some(&app.customer),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    let (status, body): (_, ErrorResponse) = common::response_json(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.code, "unauthorized");
}

#[tokio::test]
async fn customers_cannot_use_admin_routes() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 1).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", placed.order.id),
            Some(&app.customer),
            Some(json!({ "status": "processing" })),
        )
        .await;
    let (status, body): (_, ErrorResponse) = common::response_json(response).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body.code, "forbidden");

    for uri in ["/api/v1/stats/orders", "/api/v1/notifications/queue-depth"] {
        let response = app.request(Method::GET, uri, Some(&app.customer), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }
}

#[tokio::test]
async fn invalid_transition_maps_to_conflict() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 1).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", placed.order.id),
            Some(&app.admin),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    let (status, body): (_, ErrorResponse) = common::response_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.code, "invalid_status_transition");

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", placed.order.id),
            Some(&app.admin),
            Some(json!({ "status": "processing", "tracking_number": "1Z999" })),
        )
        .await;
    let (status, body): (_, ApiResponse<order::Model>) = common::response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.data.unwrap().status, OrderStatus::Processing);
}

#[tokio::test]
async fn invoice_routes_create_once() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(20.00), 1).await;
    let uri = format!("/api/v1/orders/{}/invoice", placed.order.id);

    let response = app
        .request(Method::POST, &uri, Some(&app.admin), Some(json!({})))
        .await;
    let (status, body): (_, ApiResponse<invoice::Model>) = common::response_json(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.data.unwrap().amount, dec!(20.00));

    let response = app
        .request(Method::POST, &uri, Some(&app.admin), Some(json!({})))
        .await;
    let (status, body): (_, ErrorResponse) = common::response_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.code, "invoice_already_exists");

    let response = app.request(Method::GET, &uri, Some(&app.admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn notification_status_is_visible_to_admins() {
    let app = TestApp::new().await;
    let placed = app.place_simple_order(dec!(10.00), 1).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/notifications/by-order/{}", placed.order.id),
            Some(&app.admin),
            None,
        )
        .await;
    let (status, body): (_, ApiResponse<Vec<TaskStatusView>>) =
        common::response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = body.data.unwrap();
    assert_eq!(tasks.len(), 2);

    let response = app
        .request(Method::GET, "/api/v1/notifications/queue-depth", Some(&app.admin), None)
        .await;
    let (_, body): (_, ApiResponse<QueueDepth>) = common::response_json(response).await;
    assert_eq!(body.data.unwrap().pending, 2);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/notifications/{}/suppress", tasks[0].id),
            Some(&app.admin),
            Some(json!({ "reason": "" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::GET,
            "/api/v1/notifications/metrics?from=2030-01-02T00:00:00Z&to=2030-01-01T00:00:00Z",
            Some(&app.admin),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_summarise_orders_and_invoices() {
    let app = TestApp::new().await;
    let kept = app.place_simple_order(dec!(30.00), 1).await;
    let cancelled = app.place_simple_order(dec!(70.00), 1).await;
    app.services()
        .order_status
        .update_status(
            cancelled.order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Cancelled,
                notes: None,
                tracking_number: None,
            },
        )
        .await
        .unwrap();
    app.services()
        .invoices
        .create_invoice(kept.order.id, CreateInvoiceRequest::default())
        .await
        .unwrap();

    let stats = app.services().analytics.get_order_stats().await.unwrap();
    assert_eq!(stats.total_orders, 2);
    assert_eq!(stats.total_revenue, dec!(30.00));
    assert_eq!(stats.average_order_value, dec!(30.00));
    assert_eq!(stats.by_status.get("cancelled"), Some(&1));
    assert_eq!(stats.by_status.get("pending"), Some(&1));
    assert_eq!(stats.today.orders, 2);
    assert_eq!(stats.recent_orders.len(), 2);
    assert_eq!(stats.invoices.total, 1);
    assert_eq!(
        stats.invoices.by_status.get(&InvoiceStatus::Pending.to_string()),
        Some(&1)
    );
    assert_eq!(stats.invoices.outstanding_amount, dec!(30.00));

    let response = app
        .request(Method::GET, "/api/v1/stats/orders", Some(&app.admin), None)
        .await;
    let (status, body): (_, Value) = common::response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_orders"], 2);
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    let (status, body): (_, Value) = common::response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"]["status"], "up");

    let response = app.request(Method::GET, "/api-docs/openapi.json", None, None).await;
    let (status, body): (_, Value) = common::response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/checkout"].is_object());
}

#[tokio::test]
async fn wholesale_cart_line_over_http_is_priced_in_the_cart_view() {
    let app = TestApp::new().await;
    let item = app
        .seed_item("SKU-W", dec!(20.00), Some(dec!(15.00)), 1, &[])
        .await;
    app.add_to_cart(&app.customer, item.id, 2, PriceType::Wholesale)
        .await;

    let response = app
        .request(Method::GET, "/api/v1/cart", Some(&app.customer), None)
        .await;
    let (status, body): (_, Value) = common::response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    let unit_price: Decimal =
        serde_json::from_value(body["data"]["lines"][0]["unit_price"].clone()).unwrap();
    assert_eq!(unit_price, dec!(15.00));
}
