use super::*;

// ---------------------------------------------------------------------------
// Migration & schema tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mysql_migrations_run_successfully() {
    let (_container, pool) = start_mysql().await;
    for table in [
        "users",
        "books",
        "requests",
        "reviews",
        "book_availability_alerts",
        "carts",
        "cart_items",
        "orders",
        "order_items",
        "system_logs",
    ] {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let row: (i64,) = sqlx::query_as(&sql).fetch_one(pool.inner()).await.unwrap();
        assert_eq!(row.0, 0, "{table} should start empty");
    }
}

/// Request numbers are unique at the storage level too.
#[tokio::test]
async fn mysql_duplicate_request_number_is_unique_violation() {
    let (_container, pool) = start_mysql().await;
    let insert = "INSERT INTO requests (number, citizen_name, book_name, status, requested_at, \
                  due_at, created_at, updated_at) VALUES (7, 'Ana', 'Dune', 'active', '', '', '', '')";
    sqlx::query(insert).execute(pool.inner()).await.unwrap();
    let err = sqlx::query(insert).execute(pool.inner()).await.unwrap_err();
    assert!(libris::db::is_unique_violation(&err));
}

#[tokio::test]
async fn mysql_alert_pairs_are_deduplicated() {
    let (_container, pool) = start_mysql().await;
    let ana = citizen(&pool, "Ana").await;
    let book = books::create(&pool, "Dune", None, 10.0, 0).await.unwrap();
    let mut tx = pool.begin().await.unwrap();
    assert!(alerts::insert_if_absent_tx(&mut tx, book, ana.id, "now").await.unwrap());
    assert!(!alerts::insert_if_absent_tx(&mut tx, book, ana.id, "now").await.unwrap());
    tx.commit().await.unwrap();
    assert_eq!(alerts::count_for_book(&pool, book).await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Concurrency and end-to-end flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mysql_concurrent_requests_respect_stock() {
    let (_container, pool) = start_mysql().await;
    concurrent_requests_respect_stock(pool).await;
}

#[tokio::test]
async fn mysql_concurrent_requests_respect_cap() {
    let (_container, pool) = start_mysql().await;
    concurrent_requests_respect_cap(pool).await;
}

#[tokio::test]
async fn mysql_lifecycle_round_trip() {
    let (_container, pool) = start_mysql().await;
    lifecycle_round_trip(pool).await;
}

#[tokio::test]
async fn mysql_checkout_and_payment() {
    let (_container, pool) = start_mysql().await;
    checkout_and_payment(pool).await;
}

#[tokio::test]
async fn mysql_concurrent_sweeps_claim_once() {
    let (_container, pool) = start_mysql().await;
    concurrent_sweeps_claim_once(pool).await;
}
