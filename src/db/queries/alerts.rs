use crate::db::queries::users::Recipient;
use crate::db::{DbBackend, DbPool, DbTx};

/// Register interest in a book. Returns false when the pair already existed.
pub async fn insert_if_absent_tx(
    tx: &mut DbTx,
    book_id: i64,
    user_id: i64,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let raw = match tx.backend() {
        DbBackend::Mysql => {
            "INSERT IGNORE INTO book_availability_alerts (book_id, user_id, created_at) \
             VALUES (?, ?, ?)"
        }
        _ => {
            "INSERT INTO book_availability_alerts (book_id, user_id, created_at) \
             VALUES (?, ?, ?) ON CONFLICT (book_id, user_id) DO NOTHING"
        }
    };
    let sql = tx.sql(raw);
    let res = sqlx::query(&sql)
        .bind(book_id)
        .bind(user_id)
        .bind(now)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn exists(pool: &DbPool, book_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    let sql = pool.sql(
        "SELECT COUNT(*) FROM book_availability_alerts WHERE book_id = ? AND user_id = ?",
    );
    let (n,): (i64,) = sqlx::query_as(&sql)
        .bind(book_id)
        .bind(user_id)
        .fetch_one(pool.inner())
        .await?;
    Ok(n > 0)
}

pub async fn count_for_book(pool: &DbPool, book_id: i64) -> Result<i64, sqlx::Error> {
    let sql = pool.sql("SELECT COUNT(*) FROM book_availability_alerts WHERE book_id = ?");
    let (n,): (i64,) = sqlx::query_as(&sql)
        .bind(book_id)
        .fetch_one(pool.inner())
        .await?;
    Ok(n)
}

/// Users waiting for this book that can be reached by email.
pub async fn recipients_tx(tx: &mut DbTx, book_id: i64) -> Result<Vec<Recipient>, sqlx::Error> {
    let sql = tx.sql(
        "SELECT u.id, u.name, u.email FROM book_availability_alerts a \
         JOIN users u ON u.id = a.user_id \
         WHERE a.book_id = ? AND u.email IS NOT NULL AND u.email <> '' \
         ORDER BY a.id",
    );
    sqlx::query_as::<_, Recipient>(&sql)
        .bind(book_id)
        .fetch_all(tx.conn())
        .await
}

pub async fn delete_for_book_tx(tx: &mut DbTx, book_id: i64) -> Result<u64, sqlx::Error> {
    let sql = tx.sql("DELETE FROM book_availability_alerts WHERE book_id = ?");
    let res = sqlx::query(&sql).bind(book_id).execute(tx.conn()).await?;
    Ok(res.rows_affected())
}
