pub mod models;
pub mod queries;

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyConnection, Row, Transaction};

use crate::config::DatabaseConfig;

/// Storage format for every timestamp column (UTC, sorts lexicographically).
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Database backend detected from the connection URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    Sqlite,
    Postgres,
    Mysql,
}

impl DbBackend {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres") {
            DbBackend::Postgres
        } else if url.starts_with("mysql") || url.starts_with("mariadb") {
            DbBackend::Mysql
        } else {
            DbBackend::Sqlite
        }
    }

    /// Rewrite `?` placeholders into `$1, $2, ...` for PostgreSQL.
    /// Question marks inside single-quoted literals are left alone.
    pub fn sql(self, raw: &str) -> String {
        if self != DbBackend::Postgres {
            return raw.to_string();
        }
        let mut out = String::with_capacity(raw.len() + 8);
        let mut n = 0;
        let mut in_literal = false;
        for ch in raw.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(ch);
                }
                '?' if !in_literal => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(ch),
            }
        }
        out
    }

    /// Row-lock suffix for `SELECT` statements inside a transaction.
    /// SQLite has no row locks; callers take the database write lock instead.
    pub fn lock_clause(self) -> &'static str {
        match self {
            DbBackend::Sqlite => "",
            DbBackend::Postgres | DbBackend::Mysql => " FOR UPDATE",
        }
    }
}

/// Connection pool plus the backend it talks to. All query modules take this
/// instead of a concrete pool type, allowing runtime backend selection via URI:
///   - `sqlite://path.db`  → SQLite
///   - `postgres://...`    → PostgreSQL
///   - `mysql://...`       → MySQL / MariaDB
#[derive(Debug, Clone)]
pub struct DbPool {
    inner: sqlx::AnyPool,
    backend: DbBackend,
}

impl DbPool {
    pub fn new(inner: sqlx::AnyPool, backend: DbBackend) -> Self {
        Self { inner, backend }
    }

    pub fn inner(&self) -> &sqlx::AnyPool {
        &self.inner
    }

    pub fn backend(&self) -> DbBackend {
        self.backend
    }

    pub fn sql(&self, raw: &str) -> String {
        self.backend.sql(raw)
    }

    pub async fn begin(&self) -> Result<DbTx, sqlx::Error> {
        Ok(DbTx {
            inner: self.inner.begin().await?,
            backend: self.backend,
        })
    }
}

/// An open transaction. Every state change in the lending and shop modules
/// happens inside one of these and is committed as a unit.
pub struct DbTx {
    inner: Transaction<'static, Any>,
    backend: DbBackend,
}

impl DbTx {
    pub fn backend(&self) -> DbBackend {
        self.backend
    }

    pub fn sql(&self, raw: &str) -> String {
        self.backend.sql(raw)
    }

    pub fn conn(&mut self) -> &mut AnyConnection {
        &mut self.inner
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.inner.commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.inner.rollback().await
    }

    /// Lock a single row by primary key until the transaction ends.
    /// Returns `false` when the row does not exist.
    ///
    /// On SQLite this issues a no-op UPDATE, which takes the database write
    /// lock up front so concurrent writers queue behind us instead of failing
    /// on lock upgrade.
    pub async fn lock_row(&mut self, table: &str, id: i64) -> Result<bool, sqlx::Error> {
        match self.backend {
            DbBackend::Sqlite => {
                let sql = format!("UPDATE {table} SET id = id WHERE id = ?");
                let res = sqlx::query(&sql).bind(id).execute(self.conn()).await?;
                Ok(res.rows_affected() > 0)
            }
            DbBackend::Postgres | DbBackend::Mysql => {
                let sql = self.sql(&format!("SELECT id FROM {table} WHERE id = ? FOR UPDATE"));
                let row: Option<(i64,)> = sqlx::query_as(&sql)
                    .bind(id)
                    .fetch_optional(self.conn())
                    .await?;
                Ok(row.is_some())
            }
        }
    }

    /// Take the SQLite write lock without touching any row. No-op elsewhere.
    pub async fn lock_for_write(&mut self, table: &str) -> Result<(), sqlx::Error> {
        if self.backend == DbBackend::Sqlite {
            let sql = format!("UPDATE {table} SET id = id WHERE 1 = 0");
            sqlx::query(&sql).execute(self.conn()).await?;
        }
        Ok(())
    }

    /// Append the backend-specific clause that makes an INSERT yield its new id.
    pub fn insert_sql(&self, raw: &str) -> String {
        match self.backend {
            DbBackend::Mysql => self.sql(raw),
            DbBackend::Sqlite | DbBackend::Postgres => self.sql(&format!("{raw} RETURNING id")),
        }
    }

    /// Run an INSERT built from [`DbTx::insert_sql`] and return the new row id.
    pub async fn insert<'q>(
        &mut self,
        query: sqlx::query::Query<'q, Any, <Any as sqlx::Database>::Arguments<'q>>,
    ) -> Result<i64, sqlx::Error> {
        match self.backend {
            DbBackend::Mysql => {
                query.execute(self.conn()).await?;
                let (id,): (i64,) = sqlx::query_as("SELECT CAST(LAST_INSERT_ID() AS SIGNED)")
                    .fetch_one(self.conn())
                    .await?;
                Ok(id)
            }
            DbBackend::Sqlite | DbBackend::Postgres => {
                let row: AnyRow = query.fetch_one(self.conn()).await?;
                row.try_get::<i64, _>(0)
            }
        }
    }
}

/// Current UTC time in storage format.
pub fn now() -> String {
    chrono::Utc::now().format(TS_FORMAT).to_string()
}

pub fn format_ts(ts: chrono::NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn parse_ts(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value, TS_FORMAT).ok()
}

/// True when the error is a unique-constraint violation reported by any backend.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

fn pool_options(backend: DbBackend, max_connections: u32) -> AnyPoolOptions {
    let options = AnyPoolOptions::new().max_connections(max_connections);
    if backend == DbBackend::Sqlite {
        // Foreign keys are a per-connection setting in SQLite.
        options.after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys=ON").execute(conn).await?;
                Ok(())
            })
        })
    } else {
        options
    }
}

/// Install database drivers and create a connection pool.
/// The backend is determined by the URI scheme in `config.url`.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    // Register all compiled-in database drivers
    sqlx::any::install_default_drivers();

    let backend = DbBackend::from_url(&config.url);
    let pool = pool_options(backend, config.max_connections)
        .connect(&config.url)
        .await?;

    if backend == DbBackend::Sqlite {
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
    }

    run_migrations(&pool, backend).await?;

    Ok(DbPool::new(pool, backend))
}

async fn run_migrations(pool: &sqlx::AnyPool, backend: DbBackend) -> Result<(), sqlx::Error> {
    let migrator = match backend {
        DbBackend::Sqlite => sqlx::migrate!("./migrations"),
        DbBackend::Postgres => sqlx::migrate!("./migrations_pg"),
        DbBackend::Mysql => sqlx::migrate!("./migrations_mysql"),
    };
    migrator.run(pool).await?;
    Ok(())
}

/// Create an in-memory SQLite pool for testing, with all migrations applied.
pub async fn create_test_pool() -> DbPool {
    sqlx::any::install_default_drivers();

    let pool = pool_options(DbBackend::Sqlite, 1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool, DbBackend::Sqlite)
        .await
        .expect("Failed to run migrations");

    DbPool::new(pool, DbBackend::Sqlite)
}

/// Create a test pool for any backend (used by Docker integration tests).
pub async fn create_test_pool_for(url: &str) -> DbPool {
    sqlx::any::install_default_drivers();
    let backend = DbBackend::from_url(url);
    let pool = pool_options(backend, 8)
        .connect(url)
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool, backend)
        .await
        .expect("Failed to run migrations");
    DbPool::new(pool, backend)
}
