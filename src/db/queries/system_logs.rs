use crate::db::DbPool;
use crate::db::models::SystemLog;

pub async fn insert(
    pool: &DbPool,
    user_id: Option<i64>,
    module: &str,
    record_id: &str,
    action: &str,
    changes: Option<&str>,
) -> Result<(), sqlx::Error> {
    let sql = pool.sql(
        "INSERT INTO system_logs (user_id, module, record_id, action, changes, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(module)
        .bind(record_id)
        .bind(action)
        .bind(changes)
        .bind(crate::db::now())
        .execute(pool.inner())
        .await?;
    Ok(())
}

/// Audit history of one record, oldest first.
pub async fn for_record(
    pool: &DbPool,
    module: &str,
    record_id: &str,
) -> Result<Vec<SystemLog>, sqlx::Error> {
    let sql = pool.sql(
        "SELECT id, user_id, module, record_id, action, changes, created_at \
         FROM system_logs WHERE module = ? AND record_id = ? ORDER BY id",
    );
    sqlx::query_as::<_, SystemLog>(&sql)
        .bind(module)
        .bind(record_id)
        .fetch_all(pool.inner())
        .await
}
