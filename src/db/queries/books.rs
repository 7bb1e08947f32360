use crate::db::models::Book;
use crate::db::{DbPool, DbTx};

const BOOK_COLUMNS: &str = "id, name, cover, price, stock, created_at, updated_at";

pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<Book>, sqlx::Error> {
    let sql = pool.sql(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"));
    sqlx::query_as::<_, Book>(&sql)
        .bind(id)
        .fetch_optional(pool.inner())
        .await
}

pub async fn get_by_id_tx(tx: &mut DbTx, id: i64) -> Result<Option<Book>, sqlx::Error> {
    let sql = tx.sql(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"));
    sqlx::query_as::<_, Book>(&sql)
        .bind(id)
        .fetch_optional(tx.conn())
        .await
}

/// Lock the book row and return it. `None` when the book does not exist.
pub async fn lock_tx(tx: &mut DbTx, id: i64) -> Result<Option<Book>, sqlx::Error> {
    if !tx.lock_row("books", id).await? {
        return Ok(None);
    }
    get_by_id_tx(tx, id).await
}

/// Insert a catalog entry. Returns the new book ID.
pub async fn create(
    pool: &DbPool,
    name: &str,
    cover: Option<&str>,
    price: f64,
    stock: i64,
) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let sql = tx.insert_sql(
        "INSERT INTO books (name, cover, price, stock, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    );
    let now = crate::db::now();
    let id = tx
        .insert(
            sqlx::query(&sql)
                .bind(name)
                .bind(cover)
                .bind(price)
                .bind(stock)
                .bind(&now)
                .bind(&now),
        )
        .await?;
    tx.commit().await?;
    Ok(id)
}

/// Set the number of physical copies owned.
pub async fn update_stock(pool: &DbPool, id: i64, stock: i64) -> Result<(), sqlx::Error> {
    let sql = pool.sql("UPDATE books SET stock = ?, updated_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(stock)
        .bind(crate::db::now())
        .bind(id)
        .execute(pool.inner())
        .await?;
    Ok(())
}

pub async fn delete(pool: &DbPool, id: i64) -> Result<(), sqlx::Error> {
    let sql = pool.sql("DELETE FROM books WHERE id = ?");
    sqlx::query(&sql).bind(id).execute(pool.inner()).await?;
    Ok(())
}
