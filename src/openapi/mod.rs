use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "orderflow API",
        version = "0.1.0",
        description = r#"
# orderflow

Transactional order core: cart-to-order checkout, the order and payment
state machine, invoicing and notification delivery status.

## Identity

Requests carry the caller's identity in headers (token issuance is handled
upstream):

- `x-actor-id`: UUID of the caller (required)
- `x-actor-role`: `customer` (default) or `admin`
- `x-actor-email`, `x-actor-name`: contact used for order notifications

Admin-only routes reject customers with `403`.

## Error Handling

Errors use one JSON shape with a stable machine-readable `code`:

```json
{
  "error": "Conflict",
  "code": "invalid_status_transition",
  "message": "Cannot transition order from 'pending' to 'shipped'",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Cart", description = "Cart lines feeding checkout"),
        (name = "Checkout", description = "Cart to order conversion"),
        (name = "Orders", description = "Order read side and lifecycle transitions"),
        (name = "Invoices", description = "Billing documents"),
        (name = "Analytics", description = "Dashboard aggregates"),
        (name = "Notifications", description = "Delivery status and operator actions"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Cart
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_item,
        crate::handlers::cart::update_item,
        crate::handlers::cart::remove_item,

        // Checkout
        crate::handlers::checkout::checkout,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::update_payment_status,

        // Invoices
        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::get_order_invoice,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::update_invoice,
        crate::handlers::invoices::mark_overdue,

        // Analytics
        crate::handlers::analytics::get_order_stats,

        // Notifications
        crate::handlers::notifications::get_status,
        crate::handlers::notifications::list_for_order,
        crate::handlers::notifications::get_queue_depth,
        crate::handlers::notifications::get_metrics,
        crate::handlers::notifications::suppress,
        crate::handlers::notifications::record_event,

        // Health
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order_item::OrderItemStatus,
            crate::entities::invoice::InvoiceStatus,
            crate::entities::catalog_item::PriceType,
            crate::entities::notification_task::NotificationKind,
            crate::entities::notification_task::NotificationStatus,
            crate::services::cart::AddCartItemRequest,
            crate::services::cart::UpdateCartItemRequest,
            crate::services::checkout::CheckoutRequest,
            crate::services::order_status::UpdateOrderStatusRequest,
            crate::services::order_status::UpdatePaymentStatusRequest,
            crate::services::invoicing::CreateInvoiceRequest,
            crate::services::invoicing::UpdateInvoiceRequest,
            crate::handlers::notifications::SuppressRequest,
            crate::handlers::notifications::DeliveryEventRequest,
            crate::notifications::DeliveryEvent,
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_lifecycle_routes() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/orders/{id}/status"));
        assert!(json.contains("/api/v1/notifications/queue-depth"));
        assert!(json.contains("invalid_status_transition"));
    }
}
