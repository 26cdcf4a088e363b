//! HTTP routing and the middleware stack shared by the server binary and
//! the router tests.

use std::time::Duration;

use axum::{body::Body, http::Request, routing::get, Router};
use http::{header::HeaderName, Method};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{handlers, openapi, AppState};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Every `/api/v1` route.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", handlers::cart::cart_routes())
        .nest("/checkout", handlers::checkout::checkout_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/invoices", handlers::invoices::invoice_routes())
        .nest("/stats", handlers::analytics::stats_routes())
        .nest(
            "/notifications",
            handlers::notifications::notification_routes(),
        )
}

fn cors_layer(state: &AppState) -> CorsLayer {
    if state.config.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any)
    }
}

/// Full application router with tracing, request ids, CORS and timeouts.
pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer(&state))
        .layer(PropagateRequestIdLayer::new(request_id));

    Router::new()
        .route("/", get(|| async { "orderflow up" }))
        .nest("/health", handlers::health::health_routes())
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(middleware)
        .with_state(state)
}
