//! Order finalizer: turns the active cart into a pending order, hands it to the
//! payment gateway and applies the gateway's verdict.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::payments::{LineItem, PaymentEvent, PaymentGateway, PaymentResult, SessionRequest};
use crate::actor::Actor;
use crate::audit;
use crate::db::models::{CartStatus, Order, OrderItem, OrderStatus};
use crate::db::queries::{books, carts, orders, users};
use crate::error::AppError;
use crate::web::pagination::{PageRequest, Paged};
use crate::state::AppState;
use crate::stock;

/// Shipping address captured at checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryDetails {
    pub name: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub zip: String,
    pub city: String,
    pub country: String,
}

/// Trimmed and validated delivery fields; the country is upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Delivery {
    name: String,
    line1: String,
    line2: Option<String>,
    zip: String,
    city: String,
    country: String,
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(field, format!("The {field} field is required.")));
    }
    if value.chars().count() > max {
        return Err(AppError::validation(
            field,
            format!("The {field} field may not be greater than {max} characters."),
        ));
    }
    Ok(value.to_string())
}

impl DeliveryDetails {
    fn validate(&self) -> Result<Delivery, AppError> {
        let line2 = match self.address_line2.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Some(required("address_line2", v, 255)?),
            _ => None,
        };
        let name = required("name", &self.name, 255)?;
        let line1 = required("address_line1", &self.address_line1, 255)?;
        let zip = required("zip", &self.zip, 20)?;
        let city = required("city", &self.city, 120)?;
        let country = self.country.trim();
        if country.chars().count() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::validation(
                "country",
                "The country must be a 2-letter country code.",
            ));
        }
        Ok(Delivery {
            name,
            line1,
            line2,
            zip,
            city,
            country: country.to_ascii_uppercase(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order_id: i64,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Place an order for the actor's active cart and open a payment session.
///
/// The order is committed as `pending_payment`, and the cart claimed, before
/// the gateway is called, so no row locks are held across the network round
/// trip and a second checkout finds no active cart.
pub async fn checkout<G: PaymentGateway>(
    state: &AppState,
    actor: &Actor,
    gateway: &G,
    details: &DeliveryDetails,
) -> Result<CheckoutOutcome, AppError> {
    let delivery = details.validate()?;
    let currency = state.config.cart.currency.clone();

    let mut tx = state.db.begin().await?;
    if !tx.lock_row("users", actor.id).await? {
        return Err(AppError::Unauthorized);
    }
    let Some(cart) = carts::get_active_for_user_tx(&mut tx, actor.id).await? else {
        return Err(empty_cart());
    };
    let mut lines = carts::lines_tx(&mut tx, cart.id).await?;
    if lines.is_empty() {
        return Err(empty_cart());
    }
    lines.sort_by_key(|l| l.book_id);
    let customer_email = users::get_by_id_tx(&mut tx, actor.id)
        .await?
        .and_then(|u| u.email)
        .filter(|e| !e.trim().is_empty());

    let mut snapshot = Vec::with_capacity(lines.len());
    for line in &lines {
        let Some(book) = books::lock_tx(&mut tx, line.book_id).await? else {
            return Err(AppError::validation(
                "cart",
                format!("\"{}\" is no longer available.", line.book_name),
            ));
        };
        let available = stock::available(&mut tx, book.id).await?;
        if line.qty > available {
            return Err(AppError::validation(
                "cart",
                format!(
                    "Only {available} copies of \"{}\" are available. Please update your cart.",
                    book.name
                ),
            ));
        }
        let unit_price = book.price_cents();
        if unit_price <= 0 {
            continue;
        }
        snapshot.push((book.id, book.name, unit_price, line.qty));
    }

    let total: i64 = snapshot.iter().map(|(_, _, price, qty)| price * qty).sum();
    if total <= 0 {
        return Err(AppError::validation("cart", "Cart total is invalid."));
    }

    let now = crate::db::now();
    let order_id = orders::insert_tx(
        &mut tx,
        &orders::NewOrder {
            user_id: actor.id,
            total_amount: total,
            currency: &currency,
            delivery_name: &delivery.name,
            delivery_address_line1: &delivery.line1,
            delivery_address_line2: delivery.line2.as_deref(),
            delivery_zip: &delivery.zip,
            delivery_city: &delivery.city,
            delivery_country: &delivery.country,
        },
        &now,
    )
    .await?;
    for (book_id, name, unit_price, qty) in &snapshot {
        orders::insert_item_tx(&mut tx, order_id, *book_id, name, *unit_price, *qty).await?;
    }
    if !carts::claim_for_checkout_tx(&mut tx, cart.id, &now).await? {
        return Err(empty_cart());
    }
    tx.commit().await?;

    let base = state.config.server.public_url.trim_end_matches('/');
    let request = SessionRequest {
        order_id,
        user_id: actor.id,
        amount_cents: total,
        currency,
        customer_email,
        line_items: snapshot
            .iter()
            .map(|(_, name, unit_price, qty)| LineItem {
                name: name.clone(),
                unit_amount: *unit_price,
                quantity: *qty,
            })
            .collect(),
        success_url: format!("{base}/orders/{order_id}?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base}/cart"),
    };

    let session = match gateway.create_session(&request).await {
        Ok(session) => session,
        Err(e) => {
            warn!(order_id, "payment session creation failed: {e}");
            if let Err(db_err) = orders::set_status(&state.db, order_id, OrderStatus::Canceled).await
            {
                warn!(order_id, "failed to cancel order after gateway error: {db_err}");
            }
            if let Err(db_err) = restore_cart(state, actor.id, cart.id).await {
                warn!(order_id, cart_id = cart.id, "failed to restore cart after gateway error: {db_err}");
            }
            return Err(AppError::Integration(
                "The payment provider could not be reached. Please try again.".to_string(),
            ));
        }
    };

    let mut tx = state.db.begin().await?;
    tx.lock_row("users", actor.id).await?;
    let now = crate::db::now();
    orders::set_session_tx(&mut tx, order_id, &session.id, &now).await?;
    carts::get_or_create_active_tx(&mut tx, actor.id, &now).await?;
    tx.commit().await?;

    info!(order_id, cart_id = cart.id, total_cents = total, "checkout session opened");
    if let Ok(Some(order)) = orders::get_by_id(&state.db, order_id).await {
        audit::created(&state.db, Some(actor.id), "orders", order_id, &order).await;
    }

    Ok(CheckoutOutcome {
        order_id,
        redirect_url: session.redirect_url,
    })
}

/// Give a claimed cart back to its owner. If a new cart was opened while the
/// gateway was busy, the old items are folded into it instead.
async fn restore_cart(state: &AppState, user_id: i64, cart_id: i64) -> Result<(), sqlx::Error> {
    let mut tx = state.db.begin().await?;
    tx.lock_row("users", user_id).await?;
    let now = crate::db::now();
    match carts::get_active_for_user_tx(&mut tx, user_id).await? {
        None => {
            carts::reopen_tx(&mut tx, cart_id, &now).await?;
        }
        Some(newer) => {
            carts::copy_missing_items_tx(&mut tx, cart_id, newer.id, &now).await?;
            carts::set_status_tx(&mut tx, cart_id, CartStatus::Abandoned, &now).await?;
        }
    }
    tx.commit().await
}

fn empty_cart() -> AppError {
    AppError::validation("cart", "Your cart is empty.")
}

/// Apply a gateway verdict. Unknown sessions and repeated deliveries are
/// no-ops; a paid order is never moved back. Returns whether anything changed.
pub async fn apply_payment_event(state: &AppState, event: &PaymentEvent) -> Result<bool, AppError> {
    let mut tx = state.db.begin().await?;
    let Some(order) = orders::get_by_session_for_update_tx(&mut tx, &event.session_id).await? else {
        warn!(session_id = %event.session_id, "payment event for unknown session");
        return Ok(false);
    };

    let now = crate::db::now();
    let changed = match &event.result {
        PaymentResult::Paid { payment_intent_id } => {
            orders::mark_paid_tx(&mut tx, order.id, payment_intent_id.as_deref(), &now).await?
        }
        PaymentResult::Expired => orders::mark_expired_tx(&mut tx, order.id, &now).await?,
    };
    tx.commit().await?;

    if changed {
        info!(order_id = order.id, session_id = %event.session_id, result = ?event.result, "order payment updated");
        if let Ok(Some(after)) = orders::get_by_id(&state.db, order.id).await {
            audit::updated(&state.db, None, "orders", order.id, &order, &after).await;
        }
    }
    Ok(changed)
}

/// The actor's orders, newest first.
pub async fn list_orders(
    state: &AppState,
    actor: &Actor,
    page: &PageRequest,
) -> Result<Paged<Order>, AppError> {
    let total = orders::count_for_user(&state.db, actor.id).await?;
    let items = orders::list_for_user(&state.db, actor.id, page.per_page(), page.offset()).await?;
    Ok(Paged::new(items, page, total))
}

pub async fn show_order(
    state: &AppState,
    actor: &Actor,
    order_id: i64,
) -> Result<OrderDetail, AppError> {
    let order = orders::get_by_id(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::not_found("order"))?;
    if order.user_id != actor.id {
        return Err(AppError::Forbidden);
    }
    let items = orders::items(&state.db, order_id).await?;
    Ok(OrderDetail { order, items })
}
