use crate::db::models::{Order, OrderItem, OrderStatus};
use crate::db::{DbPool, DbTx};

const ORDER_COLUMNS: &str = "id, user_id, status, total_amount, currency, delivery_name, \
     delivery_address_line1, delivery_address_line2, delivery_zip, delivery_city, \
     delivery_country, payment_session_id, payment_intent_id, created_at, updated_at";

pub struct NewOrder<'a> {
    pub user_id: i64,
    pub total_amount: i64,
    pub currency: &'a str,
    pub delivery_name: &'a str,
    pub delivery_address_line1: &'a str,
    pub delivery_address_line2: Option<&'a str>,
    pub delivery_zip: &'a str,
    pub delivery_city: &'a str,
    pub delivery_country: &'a str,
}

pub async fn insert_tx(tx: &mut DbTx, new: &NewOrder<'_>, now: &str) -> Result<i64, sqlx::Error> {
    let sql = tx.insert_sql(
        "INSERT INTO orders (user_id, status, total_amount, currency, delivery_name, \
         delivery_address_line1, delivery_address_line2, delivery_zip, delivery_city, \
         delivery_country, created_at, updated_at) \
         VALUES (?, 'pending_payment', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    );
    tx.insert(
        sqlx::query(&sql)
            .bind(new.user_id)
            .bind(new.total_amount)
            .bind(new.currency)
            .bind(new.delivery_name)
            .bind(new.delivery_address_line1)
            .bind(new.delivery_address_line2)
            .bind(new.delivery_zip)
            .bind(new.delivery_city)
            .bind(new.delivery_country)
            .bind(now)
            .bind(now),
    )
    .await
}

pub async fn insert_item_tx(
    tx: &mut DbTx,
    order_id: i64,
    book_id: i64,
    book_name: &str,
    unit_price: i64,
    qty: i64,
) -> Result<i64, sqlx::Error> {
    let sql = tx.insert_sql(
        "INSERT INTO order_items (order_id, book_id, book_name, unit_price, qty) \
         VALUES (?, ?, ?, ?, ?)",
    );
    tx.insert(
        sqlx::query(&sql)
            .bind(order_id)
            .bind(book_id)
            .bind(book_name)
            .bind(unit_price)
            .bind(qty),
    )
    .await
}

pub async fn set_session_tx(
    tx: &mut DbTx,
    id: i64,
    session_id: &str,
    now: &str,
) -> Result<(), sqlx::Error> {
    let sql = tx.sql("UPDATE orders SET payment_session_id = ?, updated_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(session_id)
        .bind(now)
        .bind(id)
        .execute(tx.conn())
        .await?;
    Ok(())
}

pub async fn set_status(
    pool: &DbPool,
    id: i64,
    status: OrderStatus,
) -> Result<(), sqlx::Error> {
    let sql = pool.sql("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(status.as_str())
        .bind(crate::db::now())
        .bind(id)
        .execute(pool.inner())
        .await?;
    Ok(())
}

/// Find the order for a payment session and lock it.
pub async fn get_by_session_for_update_tx(
    tx: &mut DbTx,
    session_id: &str,
) -> Result<Option<Order>, sqlx::Error> {
    tx.lock_for_write("orders").await?;
    let sql = tx.sql("SELECT id FROM orders WHERE payment_session_id = ?");
    let row: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(session_id)
        .fetch_optional(tx.conn())
        .await?;
    let Some((id,)) = row else {
        return Ok(None);
    };
    if !tx.lock_row("orders", id).await? {
        return Ok(None);
    }
    let sql = tx.sql(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"));
    sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(tx.conn())
        .await
}

/// Flip to paid. Returns false if the order already was.
pub async fn mark_paid_tx(
    tx: &mut DbTx,
    id: i64,
    payment_intent_id: Option<&str>,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(
        "UPDATE orders SET status = 'paid', \
         payment_intent_id = COALESCE(?, payment_intent_id), updated_at = ? \
         WHERE id = ? AND status <> 'paid'",
    );
    let res = sqlx::query(&sql)
        .bind(payment_intent_id)
        .bind(now)
        .bind(id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Flip a still-pending order to expired.
pub async fn mark_expired_tx(tx: &mut DbTx, id: i64, now: &str) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(
        "UPDATE orders SET status = 'expired', updated_at = ? \
         WHERE id = ? AND status = 'pending_payment'",
    );
    let res = sqlx::query(&sql)
        .bind(now)
        .bind(id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<Order>, sqlx::Error> {
    let sql = pool.sql(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"));
    sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(pool.inner())
        .await
}

pub async fn list_for_user(
    pool: &DbPool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    let sql = pool.sql(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    ));
    sqlx::query_as::<_, Order>(&sql)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool.inner())
        .await
}

pub async fn count_for_user(pool: &DbPool, user_id: i64) -> Result<i64, sqlx::Error> {
    let sql = pool.sql("SELECT COUNT(*) FROM orders WHERE user_id = ?");
    let (n,): (i64,) = sqlx::query_as(&sql)
        .bind(user_id)
        .fetch_one(pool.inner())
        .await?;
    Ok(n)
}

pub async fn items(pool: &DbPool, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error> {
    let sql = pool.sql(
        "SELECT id, order_id, book_id, book_name, unit_price, qty FROM order_items \
         WHERE order_id = ? ORDER BY id",
    );
    sqlx::query_as::<_, OrderItem>(&sql)
        .bind(order_id)
        .fetch_all(pool.inner())
        .await
}
