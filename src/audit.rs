//! Best-effort audit trail in `system_logs`.
//!
//! Written after the business transaction has committed. A failed write is
//! logged and swallowed.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::DbPool;
use crate::db::queries::system_logs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Deleted,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Deleted => "deleted",
        }
    }
}

/// Field-level difference between two snapshots of a record:
/// `{"field": {"old": .., "new": ..}}` for every field that changed.
/// `updated_at` is ignored.
pub fn diff<T: Serialize>(before: &T, after: &T) -> Value {
    let before = serde_json::to_value(before).unwrap_or(Value::Null);
    let after = serde_json::to_value(after).unwrap_or(Value::Null);
    let mut out = Map::new();
    if let (Value::Object(old), Value::Object(new)) = (&before, &after) {
        for (key, new_value) in new {
            if key == "updated_at" {
                continue;
            }
            let old_value = old.get(key).unwrap_or(&Value::Null);
            if old_value != new_value {
                out.insert(
                    key.clone(),
                    serde_json::json!({ "old": old_value, "new": new_value }),
                );
            }
        }
    }
    Value::Object(out)
}

/// Persist one audit record. Never fails the caller.
pub async fn record(
    pool: &DbPool,
    actor_id: Option<i64>,
    module: &str,
    record_id: i64,
    action: Action,
    changes: Option<Value>,
) {
    let changes = changes.map(|v| v.to_string());
    if let Err(e) = system_logs::insert(
        pool,
        actor_id,
        module,
        &record_id.to_string(),
        action.as_str(),
        changes.as_deref(),
    )
    .await
    {
        tracing::warn!(module, record_id, action = action.as_str(), "audit write failed: {e}");
    }
}

/// Record a creation with the full new state.
pub async fn created<T: Serialize>(
    pool: &DbPool,
    actor_id: Option<i64>,
    module: &str,
    record_id: i64,
    after: &T,
) {
    let snapshot = serde_json::to_value(after).ok();
    record(pool, actor_id, module, record_id, Action::Created, snapshot).await;
}

/// Record an update; skipped when nothing but `updated_at` changed.
pub async fn updated<T: Serialize>(
    pool: &DbPool,
    actor_id: Option<i64>,
    module: &str,
    record_id: i64,
    before: &T,
    after: &T,
) {
    let changes = diff(before, after);
    if changes.as_object().is_some_and(Map::is_empty) {
        return;
    }
    record(pool, actor_id, module, record_id, Action::Updated, Some(changes)).await;
}

/// Record a deletion with the last known state.
pub async fn deleted<T: Serialize>(
    pool: &DbPool,
    actor_id: Option<i64>,
    module: &str,
    record_id: i64,
    before: &T,
) {
    let snapshot = serde_json::to_value(before).ok();
    record(pool, actor_id, module, record_id, Action::Deleted, snapshot).await;
}
