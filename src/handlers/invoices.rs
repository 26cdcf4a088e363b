use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Actor,
    entities::invoice,
    errors::ServiceError,
    services::invoicing::{CreateInvoiceRequest, UpdateInvoiceRequest},
    ApiResponse, AppState,
};

/// Build the invoice Router scoped under `/api/v1/invoices`.
///
/// Order-scoped creation and lookup are mounted by the orders router.
pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/mark-overdue", post(mark_overdue))
        .route("/:id", get(get_invoice).put(update_invoice))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverdueSweepResult {
    pub marked_overdue: u64,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice created", body = ApiResponse<invoice::Model>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<invoice::Model>>), ServiceError> {
    actor.require_admin()?;
    let invoice = state
        .services
        .invoices
        .create_invoice(order_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(invoice))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Invoice of the order", body = ApiResponse<invoice::Model>),
        (status = 404, description = "No invoice for the order", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn get_order_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<invoice::Model>>, ServiceError> {
    actor.require_admin()?;
    let invoice = state
        .services
        .invoices
        .get_invoice_for_order(order_id)
        .await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice", body = ApiResponse<invoice::Model>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<invoice::Model>>, ServiceError> {
    actor.require_admin()?;
    let invoice = state.services.invoices.get_invoice(id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    put,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = UpdateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice updated", body = ApiResponse<invoice::Model>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<Json<ApiResponse<invoice::Model>>, ServiceError> {
    actor.require_admin()?;
    let invoice = state.services.invoices.update_invoice(id, payload).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/mark-overdue",
    responses(
        (status = 200, description = "Pending invoices past due moved to overdue", body = ApiResponse<OverdueSweepResult>)
    ),
    tag = "Invoices"
)]
pub async fn mark_overdue(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<OverdueSweepResult>>, ServiceError> {
    actor.require_admin()?;
    let marked_overdue = state.services.invoices.mark_overdue(Utc::now()).await?;
    Ok(Json(ApiResponse::success(OverdueSweepResult { marked_overdue })))
}
