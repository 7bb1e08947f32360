pub mod auth;
pub mod lending;
pub mod pagination;
pub mod shop;
pub mod webhook;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};

use crate::state::AppState;

/// JSON API, mounted under `/api`. Everything except the payment webhook
/// requires a session.
pub fn router(state: AppState) -> Router<AppState> {
    let admin_router = Router::new()
        .route("/requests/{id}/confirm", post(lending::confirm_request))
        .route("/requests/{id}/cancel", post(lending::cancel_request))
        .route("/reviews", get(lending::list_reviews))
        .route("/reviews/{id}/evaluate", post(lending::evaluate_review))
        .layer(middleware::from_fn(auth::require_admin));

    let session_router = Router::new()
        .route("/me", get(auth::me))
        .route("/books/{id}/availability", get(lending::book_availability))
        .route("/books/{id}/alerts", post(lending::register_alert))
        .route(
            "/requests",
            get(lending::list_requests).post(lending::create_request),
        )
        .route("/requests/{id}", get(lending::show_request))
        .route("/requests/{id}/return", post(lending::return_request))
        .route("/requests/{id}/review", post(lending::submit_review))
        .route("/reviews/{id}", get(lending::show_review))
        .route("/cart", get(shop::view_cart))
        .route("/cart/items", post(shop::add_item))
        .route(
            "/cart/items/{id}",
            patch(shop::update_item).delete(shop::remove_item),
        )
        .route("/checkout", post(shop::checkout))
        .route("/orders", get(shop::list_orders))
        .route("/orders/{id}", get(shop::show_order))
        .nest("/admin", admin_router)
        .layer(middleware::from_fn_with_state(
            state,
            auth::session_auth_layer,
        ));

    Router::new()
        .route("/webhooks/stripe", post(webhook::stripe_webhook))
        .merge(session_router)
}
