use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::Actor,
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    handlers::invoices,
    services::{
        order_status::{UpdateOrderStatusRequest, UpdatePaymentStatusRequest},
        orders::OrderDetails,
    },
    ApiResponse, AppState, PaginatedResponse,
};

/// Build the orders Router scoped under `/api/v1/orders`.
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/payment-status", put(update_payment_status))
        .route(
            "/:id/invoice",
            get(invoices::get_order_invoice).post(invoices::create_invoice),
        )
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    /// Page number (default: 1)
    pub page: Option<u64>,
    /// Items per page (default: 20, max: 100)
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Newest first. Customers see their own orders, admins see all orders.",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<PaginatedResponse<order::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
    actor: Actor,
) -> Result<Json<ApiResponse<PaginatedResponse<order::Model>>>, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(
            &actor,
            query.status,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(20),
        )
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        page.items,
        page.total,
        page.page,
        page.per_page,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items and shipping address", body = ApiResponse<OrderDetails>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<OrderDetails>>, ServiceError> {
    let details = state.services.orders.get_order(id, &actor).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<order::Model>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invalid status transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    actor.require_admin()?;
    let updated = state.services.order_status.update_status(id, payload).await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/payment-status",
    summary = "Update payment status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status updated", body = ApiResponse<order::Model>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdatePaymentStatusRequest>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    actor.require_admin()?;
    let updated = state
        .services
        .order_status
        .update_payment_status(id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
