//! Cart, checkout and order endpoints.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::actor::Actor;
use crate::db::models::{CartItem, Order};
use crate::error::AppError;
use crate::web::pagination::{PageRequest, Paged};
use crate::shop::cart::{self, AddOutcome, CartView};
use crate::shop::checkout::{self, CheckoutOutcome, DeliveryDetails, OrderDetail};
use crate::state::AppState;

/// GET /api/cart
pub async fn view_cart(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(cart::view(&state, &actor).await?))
}

fn default_qty() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct AddItemBody {
    pub book_id: i64,
    #[serde(default = "default_qty")]
    pub qty: i64,
}

/// POST /api/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<AddItemBody>,
) -> Result<Json<AddOutcome>, AppError> {
    Ok(Json(cart::add_item(&state, &actor, body.book_id, body.qty).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemBody {
    pub qty: i64,
}

/// PATCH /api/cart/items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(item_id): Path<i64>,
    Json(body): Json<UpdateItemBody>,
) -> Result<Json<CartItem>, AppError> {
    Ok(Json(cart::update_item(&state, &actor, item_id, body.qty).await?))
}

/// DELETE /api/cart/items/{id}
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(item_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    cart::remove_item(&state, &actor, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(details): Json<DeliveryDetails>,
) -> Result<impl IntoResponse, AppError> {
    let outcome: CheckoutOutcome =
        checkout::checkout(&state, &actor, state.payments.as_ref(), &details).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paged<Order>>, AppError> {
    Ok(Json(checkout::list_orders(&state, &actor, &page).await?))
}

/// GET /api/orders/{id}
pub async fn show_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(checkout::show_order(&state, &actor, id).await?))
}
