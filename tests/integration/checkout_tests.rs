use super::*;
use libris::db::models::{CartStatus, OrderStatus};
use libris::db::queries::{carts, orders};
use libris::error::AppError;
use libris::lending::requests;
use libris::web::pagination::PageRequest;
use libris::shop::checkout::{self, DeliveryDetails};
use libris::shop::cart;
use libris::shop::payments::{PaymentEvent, PaymentResult};

fn delivery() -> DeliveryDetails {
    DeliveryDetails {
        name: "Ana Lima".into(),
        address_line1: "Rua Um 1".into(),
        address_line2: None,
        zip: "1000-001".into(),
        city: "Lisboa".into(),
        country: "pt".into(),
    }
}

fn paid(session_id: &str) -> PaymentEvent {
    PaymentEvent {
        session_id: session_id.to_string(),
        result: PaymentResult::Paid {
            payment_intent_id: Some("pi_123".into()),
        },
    }
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let gateway = FakeGateway::default();

    let err = checkout::checkout(&app.state, &ana, &gateway, &delivery())
        .await
        .unwrap_err();
    match err {
        AppError::Validation { field, message } => {
            assert_eq!(field, "cart");
            assert_eq!(message, "Your cart is empty.");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn checkout_snapshots_order_and_rotates_cart() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let dune = app.book("Dune", 12.5, 3).await;
    let emma = app.book("Emma", 4.99, 3).await;
    cart::add_item(&app.state, &ana, emma, 1).await.unwrap();
    cart::add_item(&app.state, &ana, dune, 2).await.unwrap();
    let old_cart = cart::view(&app.state, &ana).await.unwrap().cart_id.unwrap();

    let gateway = FakeGateway::default();
    let outcome = checkout::checkout(&app.state, &ana, &gateway, &delivery())
        .await
        .unwrap();
    assert_eq!(
        outcome.redirect_url,
        format!("https://pay.example/{}", outcome.order_id)
    );

    let sent = gateway.requests.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount_cents, 2 * 1250 + 499);
    assert_eq!(sent[0].customer_email.as_deref(), Some("ana@example.org"));
    assert_eq!(sent[0].cancel_url, "http://libris.test/cart");
    assert_eq!(
        sent[0].success_url,
        format!(
            "http://libris.test/orders/{}?session_id={{CHECKOUT_SESSION_ID}}",
            outcome.order_id
        )
    );

    let detail = checkout::show_order(&app.state, &ana, outcome.order_id)
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::PendingPayment);
    assert_eq!(detail.order.total_amount, 2999);
    assert_eq!(detail.order.delivery_country, "PT");
    assert_eq!(
        detail.order.payment_session_id.as_deref(),
        Some(format!("cs_test_{}", outcome.order_id).as_str())
    );
    // Lines are snapshotted in book order.
    let names: Vec<_> = detail.items.iter().map(|i| i.book_name.as_str()).collect();
    assert_eq!(names, vec!["Dune", "Emma"]);
    assert_eq!(detail.items[0].unit_price, 1250);
    assert_eq!(detail.items[0].qty, 2);

    let converted = carts::get_by_id(app.pool(), old_cart).await.unwrap().unwrap();
    assert_eq!(converted.status, CartStatus::Converted);
    let fresh = cart::view(&app.state, &ana).await.unwrap();
    assert_ne!(fresh.cart_id, Some(old_cart));
    assert!(fresh.items.is_empty());
}

#[tokio::test]
async fn gateway_failure_cancels_order_and_keeps_cart() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 2).await;
    cart::add_item(&app.state, &ana, book, 1).await.unwrap();
    let cart_before = cart::view(&app.state, &ana).await.unwrap();

    let err = checkout::checkout(&app.state, &ana, &FakeGateway::failing(), &delivery())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Integration(_)));

    let orders = checkout::list_orders(&app.state, &ana, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(orders.items.len(), 1);
    assert_eq!(orders.items[0].status, OrderStatus::Canceled);

    let cart_after = cart::view(&app.state, &ana).await.unwrap();
    assert_eq!(cart_after.cart_id, cart_before.cart_id);
    assert_eq!(cart_after.items.len(), 1);
    assert_eq!(active_carts(&app, ana.id).await, 1);
}

async fn active_carts(app: &TestApp, user_id: i64) -> i64 {
    let (n,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM carts WHERE user_id = ? AND status = 'active'")
            .bind(user_id)
            .fetch_one(app.pool().inner())
            .await
            .unwrap();
    n
}

#[tokio::test]
async fn overlapping_checkouts_place_one_order() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 3).await;
    cart::add_item(&app.state, &ana, book, 2).await.unwrap();

    let gateway = FakeGateway::slow(200);
    let (delivery_a, delivery_b) = (delivery(), delivery());
    let (a, b) = tokio::join!(
        checkout::checkout(&app.state, &ana, &gateway, &delivery_a),
        checkout::checkout(&app.state, &ana, &gateway, &delivery_b),
    );
    let (ok, err) = match (a, b) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
        (a, b) => panic!("expected one success, got {:?} and {:?}", a.is_ok(), b.is_ok()),
    };
    assert!(matches!(err, AppError::Validation { field: "cart", .. }));
    assert_eq!(gateway.requests.lock().unwrap().len(), 1);

    let listed = checkout::list_orders(&app.state, &ana, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.pagination.total_items, 1);
    assert_eq!(listed.items[0].id, ok.order_id);
    assert_eq!(active_carts(&app, ana.id).await, 1);
}

#[tokio::test]
async fn items_added_during_failed_checkout_are_merged() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let dune = app.book("Dune", 10.0, 3).await;
    let emma = app.book("Emma", 5.0, 3).await;
    cart::add_item(&app.state, &ana, dune, 1).await.unwrap();
    let old_cart = cart::view(&app.state, &ana).await.unwrap().cart_id.unwrap();

    let gateway = FakeGateway {
        fail: true,
        ..FakeGateway::slow(300)
    };
    let delivery = delivery();
    let (result, _) = tokio::join!(
        checkout::checkout(&app.state, &ana, &gateway, &delivery),
        async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cart::add_item(&app.state, &ana, emma, 1).await.unwrap();
        },
    );
    assert!(matches!(result, Err(AppError::Integration(_))));

    assert_eq!(active_carts(&app, ana.id).await, 1);
    let view = cart::view(&app.state, &ana).await.unwrap();
    assert_ne!(view.cart_id, Some(old_cart));
    assert_eq!(view.items.len(), 2);
    let old = carts::get_by_id(app.pool(), old_cart).await.unwrap().unwrap();
    assert_eq!(old.status, CartStatus::Abandoned);
}

#[tokio::test]
async fn stock_is_rechecked_at_checkout() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let ben = app.citizen("Ben").await;
    let book = app.book("Dune", 10.0, 2).await;
    cart::add_item(&app.state, &ana, book, 2).await.unwrap();
    requests::create(&app.state, &ben, book).await.unwrap();

    let gateway = FakeGateway::default();
    let err = checkout::checkout(&app.state, &ana, &gateway, &delivery())
        .await
        .unwrap_err();
    match err {
        AppError::Validation { field, message } => {
            assert_eq!(field, "cart");
            assert_eq!(
                message,
                "Only 1 copies of \"Dune\" are available. Please update your cart."
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(gateway.requests.lock().unwrap().is_empty());
    let listed = checkout::list_orders(&app.state, &ana, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.pagination.total_items, 0);
}

#[tokio::test]
async fn invalid_delivery_is_rejected_first() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 2).await;
    cart::add_item(&app.state, &ana, book, 1).await.unwrap();

    let mut details = delivery();
    details.country = "Portugal".into();
    let err = checkout::checkout(&app.state, &ana, &FakeGateway::default(), &details)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { field: "country", .. }));
}

#[tokio::test]
async fn payment_events_are_idempotent_and_never_regress() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 2).await;
    cart::add_item(&app.state, &ana, book, 1).await.unwrap();
    let outcome = checkout::checkout(&app.state, &ana, &FakeGateway::default(), &delivery())
        .await
        .unwrap();
    let session = format!("cs_test_{}", outcome.order_id);

    assert!(checkout::apply_payment_event(&app.state, &paid(&session)).await.unwrap());
    assert!(!checkout::apply_payment_event(&app.state, &paid(&session)).await.unwrap());
    let expired = PaymentEvent {
        session_id: session.clone(),
        result: PaymentResult::Expired,
    };
    assert!(!checkout::apply_payment_event(&app.state, &expired).await.unwrap());

    let order = orders::get_by_id(app.pool(), outcome.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_intent_id.as_deref(), Some("pi_123"));

    assert!(!checkout::apply_payment_event(&app.state, &paid("cs_unknown")).await.unwrap());

    let logs = libris::db::queries::system_logs::for_record(
        app.pool(),
        "orders",
        &outcome.order_id.to_string(),
    )
    .await
    .unwrap();
    let actions: Vec<_> = logs.iter().map(|l| l.action.as_str()).collect();
    assert_eq!(actions, vec!["created", "updated"]);
    assert_eq!(logs[1].user_id, None);
}

#[tokio::test]
async fn expired_session_marks_pending_order() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 2).await;
    cart::add_item(&app.state, &ana, book, 1).await.unwrap();
    let outcome = checkout::checkout(&app.state, &ana, &FakeGateway::default(), &delivery())
        .await
        .unwrap();

    let expired = PaymentEvent {
        session_id: format!("cs_test_{}", outcome.order_id),
        result: PaymentResult::Expired,
    };
    assert!(checkout::apply_payment_event(&app.state, &expired).await.unwrap());
    let order = orders::get_by_id(app.pool(), outcome.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
}

#[tokio::test]
async fn orders_are_private() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let ben = app.citizen("Ben").await;
    let admin = app.admin("Clara").await;
    let book = app.book("Dune", 10.0, 5).await;
    cart::add_item(&app.state, &ana, book, 1).await.unwrap();
    let outcome = checkout::checkout(&app.state, &ana, &FakeGateway::default(), &delivery())
        .await
        .unwrap();

    for other in [&ben, &admin] {
        assert!(matches!(
            checkout::show_order(&app.state, other, outcome.order_id)
                .await
                .unwrap_err(),
            AppError::Forbidden
        ));
    }
    assert!(matches!(
        checkout::show_order(&app.state, &ana, 424242).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    let listed = checkout::list_orders(&app.state, &ben, &PageRequest::default())
        .await
        .unwrap();
    assert!(listed.items.is_empty());
}
