//! Cart reservation. Quantities are checked against available stock on every
//! write but nothing is held back for the cart.

use serde::Serialize;
use tracing::debug;

use crate::actor::Actor;
use crate::db::models::{CartItem, CartStatus, price_to_cents};
use crate::db::queries::{books, carts};
use crate::db::DbTx;
use crate::error::AppError;
use crate::state::AppState;
use crate::stock;

#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub item_id: i64,
    pub book_id: i64,
    pub book_name: String,
    pub book_cover: Option<String>,
    pub unit_price_cents: i64,
    pub qty: i64,
    pub line_total_cents: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart_id: Option<i64>,
    pub items: Vec<CartLineView>,
    pub total_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub item: CartItem,
    /// Set when the quantity was clamped.
    pub warning: Option<String>,
}

/// `round(price * 100) * qty`, summed per line.
pub fn line_total_cents(price: f64, qty: i64) -> i64 {
    price_to_cents(price) * qty
}

fn check_qty(qty: i64, max_qty: i64) -> Result<(), AppError> {
    if (1..=max_qty).contains(&qty) {
        Ok(())
    } else {
        Err(AppError::validation(
            "qty",
            format!("The quantity must be between 1 and {max_qty}."),
        ))
    }
}

fn stock_limited(available: i64) -> String {
    format!("You cannot request more than {available} copies. Stock is limited.")
}

/// Lock the actor's row and load an item of their active cart.
async fn owned_item(tx: &mut DbTx, actor: &Actor, item_id: i64) -> Result<CartItem, AppError> {
    if !tx.lock_row("users", actor.id).await? {
        return Err(AppError::Unauthorized);
    }
    let item = carts::get_item_tx(tx, item_id)
        .await?
        .ok_or_else(|| AppError::not_found("cart item"))?;
    let cart = carts::get_by_id_tx(tx, item.cart_id)
        .await?
        .ok_or_else(|| AppError::not_found("cart"))?;
    if cart.user_id != actor.id || cart.status != CartStatus::Active {
        return Err(AppError::Forbidden);
    }
    Ok(item)
}

/// Add copies of a book to the active cart. Asking for more than is
/// available succeeds at the available quantity with a warning.
pub async fn add_item(
    state: &AppState,
    actor: &Actor,
    book_id: i64,
    qty: i64,
) -> Result<AddOutcome, AppError> {
    let max_qty = state.config.cart.max_qty;
    check_qty(qty, max_qty)?;

    let mut tx = state.db.begin().await?;
    if !tx.lock_row("users", actor.id).await? {
        return Err(AppError::Unauthorized);
    }
    if books::lock_tx(&mut tx, book_id).await?.is_none() {
        return Err(AppError::not_found("book"));
    }
    let available = stock::available(&mut tx, book_id).await?;
    if available <= 0 {
        return Err(AppError::validation(
            "book_id",
            "This book is out of stock and cannot be purchased right now.",
        ));
    }

    let now = crate::db::now();
    let cart = carts::get_or_create_active_tx(&mut tx, actor.id, &now).await?;
    let existing = carts::find_item_tx(&mut tx, cart.id, book_id).await?;
    let wanted = existing.as_ref().map_or(0, |i| i.qty) + qty;
    let cap = available.min(max_qty);
    let new_qty = wanted.min(cap);
    let warning = if wanted > available {
        Some(stock_limited(available))
    } else if wanted > max_qty {
        Some(format!("You can only add up to {max_qty} copies of this book."))
    } else {
        None
    };

    let item_id = match &existing {
        Some(item) => {
            carts::set_item_qty_tx(&mut tx, item.id, new_qty, &now).await?;
            item.id
        }
        None => carts::insert_item_tx(&mut tx, cart.id, book_id, new_qty, &now).await?,
    };
    carts::touch_tx(&mut tx, cart.id, &now).await?;
    let item = carts::get_item_tx(&mut tx, item_id)
        .await?
        .ok_or_else(|| AppError::not_found("cart item"))?;
    tx.commit().await?;

    debug!(cart_id = cart.id, book_id, qty = new_qty, clamped = warning.is_some(), "cart item added");
    Ok(AddOutcome { item, warning })
}

/// Set an item's quantity. Unlike [`add_item`] this never clamps.
pub async fn update_item(
    state: &AppState,
    actor: &Actor,
    item_id: i64,
    qty: i64,
) -> Result<CartItem, AppError> {
    check_qty(qty, state.config.cart.max_qty)?;

    let mut tx = state.db.begin().await?;
    let mut item = owned_item(&mut tx, actor, item_id).await?;
    tx.lock_row("books", item.book_id).await?;
    let available = stock::available(&mut tx, item.book_id).await?;
    if qty > available {
        return Err(AppError::validation("qty", stock_limited(available)));
    }

    let now = crate::db::now();
    carts::set_item_qty_tx(&mut tx, item.id, qty, &now).await?;
    carts::touch_tx(&mut tx, item.cart_id, &now).await?;
    tx.commit().await?;

    item.qty = qty;
    item.updated_at = now;
    Ok(item)
}

pub async fn remove_item(state: &AppState, actor: &Actor, item_id: i64) -> Result<(), AppError> {
    let mut tx = state.db.begin().await?;
    let item = owned_item(&mut tx, actor, item_id).await?;
    carts::delete_item_tx(&mut tx, item.id).await?;
    carts::touch_tx(&mut tx, item.cart_id, &crate::db::now()).await?;
    tx.commit().await?;
    Ok(())
}

/// The active cart with current availability and totals in cents.
pub async fn view(state: &AppState, actor: &Actor) -> Result<CartView, AppError> {
    let currency = state.config.cart.currency.clone();
    let Some(cart) = carts::get_active_for_user(&state.db, actor.id).await? else {
        return Ok(CartView {
            cart_id: None,
            items: Vec::new(),
            total_cents: 0,
            currency,
        });
    };

    let mut items = Vec::new();
    for line in carts::lines(&state.db, cart.id).await? {
        let available = stock::available_now(&state.db, line.book_id).await?;
        items.push(CartLineView {
            item_id: line.item_id,
            book_id: line.book_id,
            book_name: line.book_name,
            book_cover: line.book_cover,
            unit_price_cents: price_to_cents(line.price),
            qty: line.qty,
            line_total_cents: line_total_cents(line.price, line.qty),
            available,
        });
    }
    let total_cents = items.iter().map(|i| i.line_total_cents).sum();
    Ok(CartView {
        cart_id: Some(cart.id),
        items,
        total_cents,
        currency,
    })
}
