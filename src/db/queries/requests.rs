use serde::Serialize;

use crate::db::models::{
    BookRequest, BookSnapshot, CLAIM_STATUSES_SQL, CitizenSnapshot, RequestStatus,
};
use crate::db::{DbPool, DbTx};

const REQUEST_COLUMNS: &str = "id, number, book_id, user_id, citizen_name, citizen_email, \
     citizen_photo, book_name, book_cover, status, requested_at, due_at, returned_at, \
     received_at, received_by_admin_id, days_elapsed, created_at, updated_at";

/// Fields written when a request is created.
pub struct NewRequest<'a> {
    pub number: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub citizen: &'a CitizenSnapshot,
    pub book: &'a BookSnapshot,
    pub requested_at: &'a str,
    pub due_at: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestSort {
    #[default]
    RequestedAt,
    DueAt,
    Book,
    Citizen,
}

impl RequestSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requested_at" => Some(RequestSort::RequestedAt),
            "due_at" => Some(RequestSort::DueAt),
            "book" => Some(RequestSort::Book),
            "citizen" => Some(RequestSort::Citizen),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            RequestSort::RequestedAt => "requested_at",
            RequestSort::DueAt => "due_at",
            RequestSort::Book => "book_name",
            RequestSort::Citizen => "citizen_name",
        }
    }
}

/// Listing criteria. `user_id` restricts rows to one owner.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub user_id: Option<i64>,
    pub status: Option<RequestStatus>,
    pub search: Option<String>,
    /// Also match the search term against citizen name and email.
    pub search_citizen: bool,
    pub sort: RequestSort,
    pub descending: bool,
}

enum Arg {
    Int(i64),
    Text(String),
}

impl RequestFilter {
    fn where_clause(&self) -> (String, Vec<Arg>) {
        let mut conds: Vec<String> = Vec::new();
        let mut args = Vec::new();

        if let Some(uid) = self.user_id {
            conds.push("user_id = ?".to_string());
            args.push(Arg::Int(uid));
        }
        if let Some(status) = self.status {
            conds.push("status = ?".to_string());
            args.push(Arg::Text(status.as_str().to_string()));
        }
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", term.to_lowercase());
            let mut alts = vec!["LOWER(book_name) LIKE ?".to_string()];
            args.push(Arg::Text(pattern.clone()));
            if self.search_citizen {
                alts.push("LOWER(citizen_name) LIKE ?".to_string());
                alts.push("LOWER(citizen_email) LIKE ?".to_string());
                args.push(Arg::Text(pattern.clone()));
                args.push(Arg::Text(pattern));
            }
            if let Ok(number) = term.trim_start_matches('#').parse::<i64>() {
                alts.push("number = ?".to_string());
                args.push(Arg::Int(number));
            }
            conds.push(format!("({})", alts.join(" OR ")));
        }

        if conds.is_empty() {
            (String::new(), args)
        } else {
            (format!(" WHERE {}", conds.join(" AND ")), args)
        }
    }
}

macro_rules! bind_args {
    ($query:expr, $args:expr) => {{
        let mut q = $query;
        for arg in $args {
            q = match arg {
                Arg::Int(v) => q.bind(*v),
                Arg::Text(s) => q.bind(s.as_str()),
            };
        }
        q
    }};
}

pub async fn list(
    pool: &DbPool,
    filter: &RequestFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<BookRequest>, sqlx::Error> {
    let (where_sql, args) = filter.where_clause();
    let dir = if filter.descending { "DESC" } else { "ASC" };
    let sql = pool.sql(&format!(
        "SELECT {REQUEST_COLUMNS} FROM requests{where_sql} \
         ORDER BY {} {dir}, id {dir} LIMIT ? OFFSET ?",
        filter.sort.column()
    ));
    let q = bind_args!(sqlx::query_as::<_, BookRequest>(&sql), &args);
    q.bind(limit).bind(offset).fetch_all(pool.inner()).await
}

pub async fn count(pool: &DbPool, filter: &RequestFilter) -> Result<i64, sqlx::Error> {
    let (where_sql, args) = filter.where_clause();
    let sql = pool.sql(&format!("SELECT COUNT(*) FROM requests{where_sql}"));
    let q = bind_args!(sqlx::query_as::<_, (i64,)>(&sql), &args);
    let (n,) = q.fetch_one(pool.inner()).await?;
    Ok(n)
}

pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<BookRequest>, sqlx::Error> {
    let sql = pool.sql(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"));
    sqlx::query_as::<_, BookRequest>(&sql)
        .bind(id)
        .fetch_optional(pool.inner())
        .await
}

/// Lock the request row and return it.
pub async fn get_for_update_tx(
    tx: &mut DbTx,
    id: i64,
) -> Result<Option<BookRequest>, sqlx::Error> {
    if !tx.lock_row("requests", id).await? {
        return Ok(None);
    }
    let sql = tx.sql(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"));
    sqlx::query_as::<_, BookRequest>(&sql)
        .bind(id)
        .fetch_optional(tx.conn())
        .await
}

/// Requests holding a copy of the book right now.
pub async fn count_claims_for_book(pool: &DbPool, book_id: i64) -> Result<i64, sqlx::Error> {
    let sql = pool.sql(&format!(
        "SELECT COUNT(*) FROM requests WHERE book_id = ? AND status IN {CLAIM_STATUSES_SQL}"
    ));
    let (n,): (i64,) = sqlx::query_as(&sql)
        .bind(book_id)
        .fetch_one(pool.inner())
        .await?;
    Ok(n)
}

pub async fn count_claims_for_book_tx(tx: &mut DbTx, book_id: i64) -> Result<i64, sqlx::Error> {
    let sql = tx.sql(&format!(
        "SELECT COUNT(*) FROM requests WHERE book_id = ? AND status IN {CLAIM_STATUSES_SQL}"
    ));
    let (n,): (i64,) = sqlx::query_as(&sql)
        .bind(book_id)
        .fetch_one(tx.conn())
        .await?;
    Ok(n)
}

pub async fn count_claims_for_user_tx(tx: &mut DbTx, user_id: i64) -> Result<i64, sqlx::Error> {
    let sql = tx.sql(&format!(
        "SELECT COUNT(*) FROM requests WHERE user_id = ? AND status IN {CLAIM_STATUSES_SQL}"
    ));
    let (n,): (i64,) = sqlx::query_as(&sql)
        .bind(user_id)
        .fetch_one(tx.conn())
        .await?;
    Ok(n)
}

/// Next request number: one past the highest ever assigned.
pub async fn next_number_tx(tx: &mut DbTx) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(number), 0) + 1 FROM requests")
        .fetch_one(tx.conn())
        .await?;
    Ok(n)
}

pub async fn insert_tx(tx: &mut DbTx, new: &NewRequest<'_>) -> Result<i64, sqlx::Error> {
    let sql = tx.insert_sql(
        "INSERT INTO requests (number, book_id, user_id, citizen_name, citizen_email, \
         citizen_photo, book_name, book_cover, status, requested_at, due_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, ?)",
    );
    tx.insert(
        sqlx::query(&sql)
            .bind(new.number)
            .bind(new.book_id)
            .bind(new.user_id)
            .bind(new.citizen.name.as_str())
            .bind(new.citizen.email.as_deref())
            .bind(new.citizen.photo.as_deref())
            .bind(new.book.name.as_str())
            .bind(new.book.cover.as_deref())
            .bind(new.requested_at)
            .bind(new.due_at)
            .bind(new.requested_at)
            .bind(new.requested_at),
    )
    .await
}

/// active → awaiting_confirmation. Returns false if the row was not active.
pub async fn mark_returned_tx(tx: &mut DbTx, id: i64, now: &str) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(
        "UPDATE requests SET status = 'awaiting_confirmation', returned_at = ?, updated_at = ? \
         WHERE id = ? AND status = 'active'",
    );
    let res = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

/// awaiting_confirmation → completed.
pub async fn complete_tx(
    tx: &mut DbTx,
    id: i64,
    received_at: &str,
    admin_id: i64,
    days_elapsed: i64,
) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(
        "UPDATE requests SET status = 'completed', received_at = ?, received_by_admin_id = ?, \
         days_elapsed = ?, updated_at = ? WHERE id = ? AND status = 'awaiting_confirmation'",
    );
    let res = sqlx::query(&sql)
        .bind(received_at)
        .bind(admin_id)
        .bind(days_elapsed)
        .bind(received_at)
        .bind(id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn cancel_tx(tx: &mut DbTx, id: i64, now: &str) -> Result<bool, sqlx::Error> {
    let sql = tx.sql(&format!(
        "UPDATE requests SET status = 'canceled', updated_at = ? \
         WHERE id = ? AND status IN {CLAIM_STATUSES_SQL}"
    ));
    let res = sqlx::query(&sql)
        .bind(now)
        .bind(id)
        .execute(tx.conn())
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Claims whose due date falls in `[from, to)` and that have an email to remind.
pub async fn due_between(
    pool: &DbPool,
    from: &str,
    to: &str,
) -> Result<Vec<BookRequest>, sqlx::Error> {
    let sql = pool.sql(&format!(
        "SELECT {REQUEST_COLUMNS} FROM requests \
         WHERE status IN {CLAIM_STATUSES_SQL} AND due_at >= ? AND due_at < ? \
         AND citizen_email IS NOT NULL AND citizen_email <> '' \
         ORDER BY due_at, id"
    ));
    sqlx::query_as::<_, BookRequest>(&sql)
        .bind(from)
        .bind(to)
        .fetch_all(pool.inner())
        .await
}

/// Dashboard counters for admins.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RequestStats {
    pub active_claims: i64,
    pub last_30_days: i64,
    pub delivered_today: i64,
}

pub async fn stats(
    pool: &DbPool,
    since_30_days: &str,
    today_start: &str,
) -> Result<RequestStats, sqlx::Error> {
    let (active_claims,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM requests WHERE status IN {CLAIM_STATUSES_SQL}"
    ))
    .fetch_one(pool.inner())
    .await?;

    let sql = pool.sql("SELECT COUNT(*) FROM requests WHERE requested_at >= ?");
    let (last_30_days,): (i64,) = sqlx::query_as(&sql)
        .bind(since_30_days)
        .fetch_one(pool.inner())
        .await?;

    let sql = pool.sql(
        "SELECT COUNT(*) FROM requests WHERE status = 'completed' AND received_at >= ?",
    );
    let (delivered_today,): (i64,) = sqlx::query_as(&sql)
        .bind(today_start)
        .fetch_one(pool.inner())
        .await?;

    Ok(RequestStats {
        active_claims,
        last_30_days,
        delivered_today,
    })
}
