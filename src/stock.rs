//! Copies of a book free to be borrowed or bought right now.
//!
//! Always derived from `books.stock` minus the requests that currently hold
//! a copy; never stored.

use crate::db::queries::{books, requests};
use crate::db::{DbPool, DbTx};

/// `max(0, stock - claims)`.
pub fn available_from(stock: i64, claims: i64) -> i64 {
    (stock - claims).max(0)
}

/// Available copies as seen by an open transaction. A missing book has none.
///
/// Callers that act on the result lock the book row first.
pub async fn available(tx: &mut DbTx, book_id: i64) -> Result<i64, sqlx::Error> {
    let Some(book) = books::get_by_id_tx(tx, book_id).await? else {
        return Ok(0);
    };
    let claims = requests::count_claims_for_book_tx(tx, book_id).await?;
    Ok(available_from(book.stock, claims))
}

/// Available copies for display purposes.
pub async fn available_now(pool: &DbPool, book_id: i64) -> Result<i64, sqlx::Error> {
    let Some(book) = books::get_by_id(pool, book_id).await? else {
        return Ok(0);
    };
    let claims = requests::count_claims_for_book(pool, book_id).await?;
    Ok(available_from(book.stock, claims))
}
