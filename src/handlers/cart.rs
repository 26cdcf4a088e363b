use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::Actor,
    entities::cart_item,
    errors::ServiceError,
    services::cart::{AddCartItemRequest, CartView, UpdateCartItemRequest},
    ApiResponse, AppState,
};

/// Build the cart Router scoped under `/api/v1/cart`.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:id", put(update_item).delete(remove_item))
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart with indicative pricing", body = ApiResponse<CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state.services.cart.get_cart(&actor).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Line added or merged", body = ApiResponse<cart_item::Model>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown catalog item", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<cart_item::Model>>), ServiceError> {
    let line = state.services.cart.add_item(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(line))))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart line ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity updated", body = ApiResponse<cart_item::Model>),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<Json<ApiResponse<cart_item::Model>>, ServiceError> {
    let line = state
        .services
        .cart
        .update_quantity(&actor, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(line)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart line ID")),
    responses(
        (status = 204, description = "Line removed"),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.cart.remove_item(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
