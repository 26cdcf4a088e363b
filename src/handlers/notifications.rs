use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    errors::ServiceError,
    notifications::{DeliveryEvent, DeliveryMetrics, QueueDepth, TaskStatusView},
    ApiResponse, AppState,
};

/// Build the notification status Router scoped under `/api/v1/notifications`.
/// Every route is admin-only.
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/queue-depth", get(get_queue_depth))
        .route("/metrics", get(get_metrics))
        .route("/by-order/:order_id", get(list_for_order))
        .route("/:id", get(get_status))
        .route("/:id/suppress", post(suppress))
        .route("/:id/events", post(record_event))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MetricsQuery {
    /// Inclusive lower bound on the send time (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the send time (RFC 3339)
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SuppressRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeliveryEventRequest {
    pub event: DeliveryEvent,
    /// Defaults to the time the callback is received.
    pub occurred_at: Option<DateTime<Utc>>,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/{id}",
    params(("id" = Uuid, Path, description = "Notification task ID")),
    responses(
        (status = 200, description = "Task status", body = ApiResponse<TaskStatusView>),
        (status = 404, description = "Task not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Notifications"
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<TaskStatusView>>, ServiceError> {
    actor.require_admin()?;
    let view = state.services.notifications.get_status(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/by-order/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Notification audit trail of the order", body = ApiResponse<Vec<TaskStatusView>>)
    ),
    tag = "Notifications"
)]
pub async fn list_for_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<Vec<TaskStatusView>>>, ServiceError> {
    actor.require_admin()?;
    let tasks = state.services.notifications.list_for_order(order_id).await?;
    Ok(Json(ApiResponse::success(tasks)))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/queue-depth",
    responses(
        (status = 200, description = "Undelivered tasks by state", body = ApiResponse<QueueDepth>)
    ),
    tag = "Notifications"
)]
pub async fn get_queue_depth(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<QueueDepth>>, ServiceError> {
    actor.require_admin()?;
    let depth = state.services.notifications.queue_depth().await?;
    Ok(Json(ApiResponse::success(depth)))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/metrics",
    params(MetricsQuery),
    responses(
        (status = 200, description = "Delivery statistics", body = ApiResponse<DeliveryMetrics>),
        (status = 400, description = "Invalid time range", body = crate::errors::ErrorResponse)
    ),
    tag = "Notifications"
)]
pub async fn get_metrics(
    State(state): State<AppState>,
    Query(range): Query<MetricsQuery>,
    actor: Actor,
) -> Result<Json<ApiResponse<DeliveryMetrics>>, ServiceError> {
    actor.require_admin()?;
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(ServiceError::ValidationError(
                "`from` must not be after `to`".to_string(),
            ));
        }
    }
    let metrics = state
        .services
        .notifications
        .metrics(range.from, range.to)
        .await?;
    Ok(Json(ApiResponse::success(metrics)))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/suppress",
    params(("id" = Uuid, Path, description = "Notification task ID")),
    request_body = SuppressRequest,
    responses(
        (status = 200, description = "Retries stopped", body = ApiResponse<TaskStatusView>),
        (status = 409, description = "Task already sent or terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "Notifications"
)]
pub async fn suppress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<SuppressRequest>,
) -> Result<Json<ApiResponse<TaskStatusView>>, ServiceError> {
    actor.require_admin()?;
    payload.validate()?;
    let view = state
        .services
        .notifications
        .suppress(id, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/events",
    params(("id" = Uuid, Path, description = "Notification task ID")),
    request_body = DeliveryEventRequest,
    responses(
        (status = 200, description = "Event recorded", body = ApiResponse<TaskStatusView>),
        (status = 409, description = "Task has not been sent", body = crate::errors::ErrorResponse)
    ),
    tag = "Notifications"
)]
pub async fn record_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<DeliveryEventRequest>,
) -> Result<Json<ApiResponse<TaskStatusView>>, ServiceError> {
    actor.require_admin()?;
    let view = state
        .services
        .notifications
        .record_delivery_event(id, payload.event, payload.occurred_at.unwrap_or_else(Utc::now))
        .await?;
    Ok(Json(ApiResponse::success(view)))
}
