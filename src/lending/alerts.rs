//! Availability alerts: citizens waiting for an out-of-stock book are
//! notified once when a copy frees up, then forgotten.

use serde::Serialize;
use tracing::{debug, info};

use crate::actor::Actor;
use crate::db::queries::{alerts, books};
use crate::error::AppError;
use crate::notify::{Addressee, Notification};
use crate::state::AppState;
use crate::stock;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Registration {
    pub book_id: i64,
    /// False when the citizen was already on the list.
    pub created: bool,
}

/// Ask to be told when the book is back. Only allowed while it is out of stock.
pub async fn register(
    state: &AppState,
    actor: &Actor,
    book_id: i64,
) -> Result<Registration, AppError> {
    let mut tx = state.db.begin().await?;
    if books::lock_tx(&mut tx, book_id).await?.is_none() {
        return Err(AppError::not_found("book"));
    }
    if stock::available(&mut tx, book_id).await? > 0 {
        return Err(AppError::validation("book_id", "This book is already available."));
    }
    let created = alerts::insert_if_absent_tx(&mut tx, book_id, actor.id, &crate::db::now()).await?;
    tx.commit().await?;

    debug!(book_id, user_id = actor.id, created, "availability alert registered");
    Ok(Registration { book_id, created })
}

/// If the book has a free copy, notify everyone waiting for it and clear the
/// list. Returns how many notifications were queued.
pub async fn notify_if_available(state: &AppState, book_id: i64) -> Result<usize, AppError> {
    let mut tx = state.db.begin().await?;
    let Some(book) = books::lock_tx(&mut tx, book_id).await? else {
        return Ok(0);
    };
    if stock::available(&mut tx, book_id).await? <= 0 {
        return Ok(0);
    }
    let recipients = alerts::recipients_tx(&mut tx, book_id).await?;
    let removed = alerts::delete_for_book_tx(&mut tx, book_id).await?;
    if removed == 0 {
        return Ok(0);
    }
    tx.commit().await?;

    let count = recipients.len();
    state
        .outbox
        .emit_all(recipients.into_iter().map(|r| Notification::BookAvailable {
            to: Addressee::from(r),
            book_id,
            book_name: book.name.clone(),
        }));
    info!(book_id, notified = count, "availability alerts dispatched");
    Ok(count)
}

/// [`notify_if_available`] for callers whose own work already committed.
pub(crate) async fn notify_after_commit(state: &AppState, book_id: Option<i64>) {
    let Some(book_id) = book_id else {
        return;
    };
    if let Err(e) = notify_if_available(state, book_id).await {
        tracing::warn!(book_id, "availability alert dispatch failed: {e}");
    }
}
