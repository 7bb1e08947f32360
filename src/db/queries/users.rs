use sqlx::FromRow;

use crate::db::models::User;
use crate::db::{DbPool, DbTx};

const USER_COLUMNS: &str = "id, name, email, profile_photo_path, is_admin, created_at";

/// Someone a notification can be addressed to.
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct Recipient {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Get a single user by ID.
pub async fn get_by_id(pool: &DbPool, user_id: i64) -> Result<Option<User>, sqlx::Error> {
    let sql = pool.sql(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"));
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(pool.inner())
        .await
}

/// Same as [`get_by_id`] but reads through an open transaction.
pub async fn get_by_id_tx(tx: &mut DbTx, user_id: i64) -> Result<Option<User>, sqlx::Error> {
    let sql = tx.sql(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"));
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(tx.conn())
        .await
}

/// All admins that have an email address on file.
pub async fn admin_recipients(pool: &DbPool) -> Result<Vec<Recipient>, sqlx::Error> {
    sqlx::query_as::<_, Recipient>(
        "SELECT id, name, email FROM users \
         WHERE is_admin = 1 AND email IS NOT NULL AND email <> '' ORDER BY id",
    )
    .fetch_all(pool.inner())
    .await
}

/// Create a new user. Returns the new user's ID.
pub async fn create(
    pool: &DbPool,
    name: &str,
    email: Option<&str>,
    profile_photo_path: Option<&str>,
    is_admin: bool,
) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let sql = tx.insert_sql(
        "INSERT INTO users (name, email, profile_photo_path, is_admin, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    );
    let now = crate::db::now();
    let id = tx
        .insert(
            sqlx::query(&sql)
                .bind(name)
                .bind(email)
                .bind(profile_photo_path)
                .bind(i64::from(is_admin))
                .bind(&now),
        )
        .await?;
    tx.commit().await?;
    Ok(id)
}

/// Update a user's profile photo (`None` clears it).
pub async fn set_profile_photo(
    pool: &DbPool,
    user_id: i64,
    path: Option<&str>,
) -> Result<(), sqlx::Error> {
    let sql = pool.sql("UPDATE users SET profile_photo_path = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(path)
        .bind(user_id)
        .execute(pool.inner())
        .await?;
    Ok(())
}
