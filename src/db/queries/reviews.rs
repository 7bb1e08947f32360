use crate::db::models::{Review, ReviewStatus};
use crate::db::{DbPool, DbTx};

const REVIEW_COLUMNS: &str = "id, request_id, book_id, user_id, rating, comment, status, \
     rejection_reason, created_at, updated_at";

pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<Review>, sqlx::Error> {
    let sql = pool.sql(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"));
    sqlx::query_as::<_, Review>(&sql)
        .bind(id)
        .fetch_optional(pool.inner())
        .await
}

/// Lock the review row and return it.
pub async fn get_for_update_tx(tx: &mut DbTx, id: i64) -> Result<Option<Review>, sqlx::Error> {
    if !tx.lock_row("reviews", id).await? {
        return Ok(None);
    }
    let sql = tx.sql(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"));
    sqlx::query_as::<_, Review>(&sql)
        .bind(id)
        .fetch_optional(tx.conn())
        .await
}

pub async fn get_by_request(pool: &DbPool, request_id: i64) -> Result<Option<Review>, sqlx::Error> {
    let sql = pool.sql(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE request_id = ?"
    ));
    sqlx::query_as::<_, Review>(&sql)
        .bind(request_id)
        .fetch_optional(pool.inner())
        .await
}

pub async fn get_by_request_tx(
    tx: &mut DbTx,
    request_id: i64,
) -> Result<Option<Review>, sqlx::Error> {
    let sql = tx.sql(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE request_id = ?"
    ));
    sqlx::query_as::<_, Review>(&sql)
        .bind(request_id)
        .fetch_optional(tx.conn())
        .await
}

pub async fn insert_tx(
    tx: &mut DbTx,
    request_id: i64,
    book_id: i64,
    user_id: i64,
    rating: i64,
    comment: Option<&str>,
    now: &str,
) -> Result<i64, sqlx::Error> {
    let sql = tx.insert_sql(
        "INSERT INTO reviews (request_id, book_id, user_id, rating, comment, status, \
         created_at, updated_at) VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
    );
    tx.insert(
        sqlx::query(&sql)
            .bind(request_id)
            .bind(book_id)
            .bind(user_id)
            .bind(rating)
            .bind(comment)
            .bind(now)
            .bind(now),
    )
    .await
}

/// Record the moderation outcome of a pending review.
/// Returns false if the review was no longer pending.
pub async fn decide_tx(
    tx: &mut DbTx,
    id: i64,
    status: ReviewStatus,
    rejection_reason: Option<&str>,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(
        "UPDATE reviews SET status = ?, rejection_reason = ?, updated_at = ? \
         WHERE id = ? AND status = 'pending'",
    );
    let res = sqlx::query(&sql)
        .bind(status.as_str())
        .bind(rejection_reason)
        .bind(now)
        .bind(id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_by_request_tx(tx: &mut DbTx, request_id: i64) -> Result<u64, sqlx::Error> {
    let sql = tx.sql("DELETE FROM reviews WHERE request_id = ?");
    let res = sqlx::query(&sql)
        .bind(request_id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected())
}

/// Newest first, optionally restricted to one status.
pub async fn list(
    pool: &DbPool,
    status: Option<ReviewStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Review>, sqlx::Error> {
    match status {
        Some(status) => {
            let sql = pool.sql(&format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews WHERE status = ? \
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
            ));
            sqlx::query_as::<_, Review>(&sql)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(pool.inner())
                .await
        }
        None => {
            let sql = pool.sql(&format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews \
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
            ));
            sqlx::query_as::<_, Review>(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool.inner())
                .await
        }
    }
}

pub async fn count(pool: &DbPool, status: Option<ReviewStatus>) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = match status {
        Some(status) => {
            let sql = pool.sql("SELECT COUNT(*) FROM reviews WHERE status = ?");
            sqlx::query_as(&sql)
                .bind(status.as_str())
                .fetch_one(pool.inner())
                .await?
        }
        None => {
            sqlx::query_as("SELECT COUNT(*) FROM reviews")
                .fetch_one(pool.inner())
                .await?
        }
    };
    Ok(n)
}
