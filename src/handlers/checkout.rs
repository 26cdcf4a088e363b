use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};

use crate::{
    auth::Actor,
    errors::ServiceError,
    services::{checkout::CheckoutRequest, orders::OrderDetails},
    ApiResponse, AppState,
};

/// Build the checkout Router scoped under `/api/v1/checkout`.
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

/// Places an order from the caller's cart.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderDetails>),
        (status = 400, description = "Empty cart, invalid adjustments or quantity below minimum", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Shipping address not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetails>>), ServiceError> {
    let details = state.services.checkout.checkout(&actor, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(details, "Order placed")),
    ))
}
