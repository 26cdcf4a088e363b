use axum::{extract::State, response::Json, routing::get, Router};

use crate::{
    auth::Actor, errors::ServiceError, services::analytics::OrderStats, ApiResponse, AppState,
};

/// Build the stats Router scoped under `/api/v1/stats`.
pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/orders", get(get_order_stats))
}

/// Dashboard aggregate over orders and invoices
#[utoipa::path(
    get,
    path = "/api/v1/stats/orders",
    responses(
        (status = 200, description = "Order stats retrieved successfully", body = ApiResponse<OrderStats>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "Analytics"
)]
pub async fn get_order_stats(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<OrderStats>>, ServiceError> {
    actor.require_admin()?;
    let stats = state.services.analytics.get_order_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}
