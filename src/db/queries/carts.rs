use sqlx::FromRow;

use crate::db::models::{Cart, CartItem, CartStatus};
use crate::db::{DbPool, DbTx};

const CART_COLUMNS: &str =
    "id, user_id, status, last_activity_at, help_email_sent_at, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, cart_id, book_id, qty, created_at, updated_at";

/// A cart item joined with the book it refers to.
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct CartLine {
    pub item_id: i64,
    pub book_id: i64,
    pub book_name: String,
    pub book_cover: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub qty: i64,
}

const LINE_SELECT: &str = "SELECT ci.id AS item_id, ci.book_id, b.name AS book_name, \
     b.cover AS book_cover, b.price, b.stock, ci.qty \
     FROM cart_items ci JOIN books b ON b.id = ci.book_id \
     WHERE ci.cart_id = ? ORDER BY ci.id";

pub async fn get_active_for_user(pool: &DbPool, user_id: i64) -> Result<Option<Cart>, sqlx::Error> {
    let sql = pool.sql(&format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE user_id = ? AND status = 'active' \
         ORDER BY id DESC LIMIT 1"
    ));
    sqlx::query_as::<_, Cart>(&sql)
        .bind(user_id)
        .fetch_optional(pool.inner())
        .await
}

pub async fn get_active_for_user_tx(
    tx: &mut DbTx,
    user_id: i64,
) -> Result<Option<Cart>, sqlx::Error> {
    let sql = tx.sql(&format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE user_id = ? AND status = 'active' \
         ORDER BY id DESC LIMIT 1"
    ));
    sqlx::query_as::<_, Cart>(&sql)
        .bind(user_id)
        .fetch_optional(tx.conn())
        .await
}

pub async fn get_by_id_tx(tx: &mut DbTx, id: i64) -> Result<Option<Cart>, sqlx::Error> {
    let sql = tx.sql(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = ?"));
    sqlx::query_as::<_, Cart>(&sql)
        .bind(id)
        .fetch_optional(tx.conn())
        .await
}

pub async fn create_tx(tx: &mut DbTx, user_id: i64, now: &str) -> Result<i64, sqlx::Error> {
    let sql = tx.insert_sql(
        "INSERT INTO carts (user_id, status, last_activity_at, created_at, updated_at) \
         VALUES (?, 'active', ?, ?, ?)",
    );
    tx.insert(
        sqlx::query(&sql)
            .bind(user_id)
            .bind(now)
            .bind(now)
            .bind(now),
    )
    .await
}

/// The user's active cart, created on first use.
/// Callers hold the user row lock so two carts are never opened at once.
pub async fn get_or_create_active_tx(
    tx: &mut DbTx,
    user_id: i64,
    now: &str,
) -> Result<Cart, sqlx::Error> {
    if let Some(cart) = get_active_for_user_tx(tx, user_id).await? {
        return Ok(cart);
    }
    let id = create_tx(tx, user_id, now).await?;
    get_by_id_tx(tx, id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn lines(pool: &DbPool, cart_id: i64) -> Result<Vec<CartLine>, sqlx::Error> {
    let sql = pool.sql(LINE_SELECT);
    sqlx::query_as::<_, CartLine>(&sql)
        .bind(cart_id)
        .fetch_all(pool.inner())
        .await
}

pub async fn lines_tx(tx: &mut DbTx, cart_id: i64) -> Result<Vec<CartLine>, sqlx::Error> {
    let sql = tx.sql(LINE_SELECT);
    sqlx::query_as::<_, CartLine>(&sql)
        .bind(cart_id)
        .fetch_all(tx.conn())
        .await
}

pub async fn get_item_tx(tx: &mut DbTx, item_id: i64) -> Result<Option<CartItem>, sqlx::Error> {
    let sql = tx.sql(&format!("SELECT {ITEM_COLUMNS} FROM cart_items WHERE id = ?"));
    sqlx::query_as::<_, CartItem>(&sql)
        .bind(item_id)
        .fetch_optional(tx.conn())
        .await
}

pub async fn find_item_tx(
    tx: &mut DbTx,
    cart_id: i64,
    book_id: i64,
) -> Result<Option<CartItem>, sqlx::Error> {
    let sql = tx.sql(&format!(
        "SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = ? AND book_id = ?"
    ));
    sqlx::query_as::<_, CartItem>(&sql)
        .bind(cart_id)
        .bind(book_id)
        .fetch_optional(tx.conn())
        .await
}

pub async fn insert_item_tx(
    tx: &mut DbTx,
    cart_id: i64,
    book_id: i64,
    qty: i64,
    now: &str,
) -> Result<i64, sqlx::Error> {
    let sql = tx.insert_sql(
        "INSERT INTO cart_items (cart_id, book_id, qty, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    );
    tx.insert(
        sqlx::query(&sql)
            .bind(cart_id)
            .bind(book_id)
            .bind(qty)
            .bind(now)
            .bind(now),
    )
    .await
}

pub async fn set_item_qty_tx(
    tx: &mut DbTx,
    item_id: i64,
    qty: i64,
    now: &str,
) -> Result<(), sqlx::Error> {
    let sql = tx.sql("UPDATE cart_items SET qty = ?, updated_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(qty)
        .bind(now)
        .bind(item_id)
        .execute(tx.conn())
        .await?;
    Ok(())
}

pub async fn delete_item_tx(tx: &mut DbTx, item_id: i64) -> Result<(), sqlx::Error> {
    let sql = tx.sql("DELETE FROM cart_items WHERE id = ?");
    sqlx::query(&sql).bind(item_id).execute(tx.conn()).await?;
    Ok(())
}

/// Record cart activity. Resets the help-email marker so a cart that comes
/// back to life can be nudged again later.
pub async fn touch_tx(tx: &mut DbTx, cart_id: i64, now: &str) -> Result<(), sqlx::Error> {
    let sql = tx.sql(
        "UPDATE carts SET last_activity_at = ?, help_email_sent_at = NULL, updated_at = ? \
         WHERE id = ?",
    );
    sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(cart_id)
        .execute(tx.conn())
        .await?;
    Ok(())
}

pub async fn set_status_tx(
    tx: &mut DbTx,
    cart_id: i64,
    status: CartStatus,
    now: &str,
) -> Result<(), sqlx::Error> {
    let sql = tx.sql("UPDATE carts SET status = ?, updated_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(status.as_str())
        .bind(now)
        .bind(cart_id)
        .execute(tx.conn())
        .await?;
    Ok(())
}

/// active → converted. Returns false if the cart was no longer active.
pub async fn claim_for_checkout_tx(
    tx: &mut DbTx,
    cart_id: i64,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(
        "UPDATE carts SET status = 'converted', updated_at = ? WHERE id = ? AND status = 'active'",
    );
    let res = sqlx::query(&sql)
        .bind(now)
        .bind(cart_id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

/// converted → active, for a checkout that never reached the payment page.
pub async fn reopen_tx(tx: &mut DbTx, cart_id: i64, now: &str) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(
        "UPDATE carts SET status = 'active', last_activity_at = ?, updated_at = ? \
         WHERE id = ? AND status = 'converted'",
    );
    let res = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(cart_id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Copy items from one cart into another, skipping books the target
/// already holds.
pub async fn copy_missing_items_tx(
    tx: &mut DbTx,
    from_cart: i64,
    to_cart: i64,
    now: &str,
) -> Result<u64, sqlx::Error> {
    let sql = tx.sql(
        "INSERT INTO cart_items (cart_id, book_id, qty, created_at, updated_at) \
         SELECT ?, src.book_id, src.qty, ?, ? FROM cart_items src \
         WHERE src.cart_id = ? AND src.book_id NOT IN \
         (SELECT dst.book_id FROM cart_items dst WHERE dst.cart_id = ?)",
    );
    let res = sqlx::query(&sql)
        .bind(to_cart)
        .bind(now)
        .bind(now)
        .bind(from_cart)
        .bind(to_cart)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected())
}

/// Cart picked by the abandoned-cart sweep, with the owner's address.
#[derive(Debug, Clone, FromRow)]
pub struct SweepCandidate {
    pub cart_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub user_email: String,
}

/// Lock up to `limit` active, non-empty carts idle since before `idle_before`
/// that have not been nudged yet.
pub async fn lock_sweep_candidates_tx(
    tx: &mut DbTx,
    idle_before: &str,
    limit: i64,
) -> Result<Vec<SweepCandidate>, sqlx::Error> {
    tx.lock_for_write("carts").await?;
    let lock = tx.backend().lock_clause();
    let of_carts = if lock.is_empty() { "" } else { " OF c" };
    let lock = match tx.backend() {
        crate::db::DbBackend::Postgres => format!("{lock}{of_carts} SKIP LOCKED"),
        _ => lock.to_string(),
    };
    let sql = tx.sql(&format!(
        "SELECT c.id AS cart_id, c.user_id, u.name AS user_name, u.email AS user_email \
         FROM carts c JOIN users u ON u.id = c.user_id \
         WHERE c.status = 'active' AND c.help_email_sent_at IS NULL \
         AND c.last_activity_at IS NOT NULL AND c.last_activity_at < ? \
         AND u.email IS NOT NULL AND u.email <> '' \
         AND EXISTS (SELECT 1 FROM cart_items ci WHERE ci.cart_id = c.id) \
         ORDER BY c.last_activity_at, c.id LIMIT ?{lock}"
    ));
    sqlx::query_as::<_, SweepCandidate>(&sql)
        .bind(idle_before)
        .bind(limit)
        .fetch_all(tx.conn())
        .await
}

pub async fn mark_help_sent_tx(tx: &mut DbTx, cart_id: i64, now: &str) -> Result<(), sqlx::Error> {
    let sql = tx.sql("UPDATE carts SET help_email_sent_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(now)
        .bind(cart_id)
        .execute(tx.conn())
        .await?;
    Ok(())
}

/// Undo [`mark_help_sent_tx`] after a failed delivery, unless the cart was
/// touched (or nudged again) in the meantime.
pub async fn clear_help_sent(pool: &DbPool, cart_id: i64, stamp: &str) -> Result<(), sqlx::Error> {
    let sql = pool.sql(
        "UPDATE carts SET help_email_sent_at = NULL WHERE id = ? AND help_email_sent_at = ?",
    );
    sqlx::query(&sql)
        .bind(cart_id)
        .bind(stamp)
        .execute(pool.inner())
        .await?;
    Ok(())
}

pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<Cart>, sqlx::Error> {
    let sql = pool.sql(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = ?"));
    sqlx::query_as::<_, Cart>(&sql)
        .bind(id)
        .fetch_optional(pool.inner())
        .await
}

/// Overwrite a cart's last activity timestamp.
pub async fn set_last_activity(pool: &DbPool, cart_id: i64, at: &str) -> Result<(), sqlx::Error> {
    let sql = pool.sql("UPDATE carts SET last_activity_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(at)
        .bind(cart_id)
        .execute(pool.inner())
        .await?;
    Ok(())
}
