use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use super::*;
use libris::db::models::OrderStatus;
use libris::db::queries::orders;
use libris::shop::cart;
use libris::shop::checkout::{self, DeliveryDetails};
use libris::shop::payments::sign_payload;

fn delivery_json() -> serde_json::Value {
    json!({
        "name": "Ana Lima",
        "address_line1": "Rua Um 1",
        "zip": "1000-001",
        "city": "Lisboa",
        "country": "PT"
    })
}

async fn post_webhook(app: Router, body: &str, signature: Option<String>) -> axum::response::Response {
    let mut req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        req = req.header("stripe-signature", sig);
    }
    app.oneshot(req.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new().await;
    let resp = send(app.router(), "GET", "/health", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "connected");
}

#[tokio::test]
async fn session_is_required() {
    let app = TestApp::new().await;
    let resp = send(app.router(), "GET", "/api/requests", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "unauthorized");

    // A valid signature for a user that does not exist.
    let resp = get_with_session(app.router(), "/api/me", 4242).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_actor_and_csrf_token() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let resp = get_with_session(app.router(), "/api/me", ana.id).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["user_id"], ana.id);
    assert_eq!(json["is_admin"], false);
    assert_eq!(json["has_verified_photo"], true);
    let expected = csrf_for_session(&session_cookie_value(ana.id));
    assert_eq!(json["csrf_token"], expected.as_str());
}

#[tokio::test]
async fn mutating_requests_need_csrf_header() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 1).await;

    let session = session_cookie_value(ana.id);
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/requests")
        .header("cookie", format!("session={session}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "book_id": book }).to_string()))
        .unwrap();
    let resp = app.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(
        app.router(),
        "POST",
        "/api/requests",
        Some(json!({ "book_id": book })),
        Some(ana.id),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json = body_json(resp).await;
    assert_eq!(json["number"], 1);
    assert_eq!(json["status"], "active");
}

#[tokio::test]
async fn validation_errors_carry_field() {
    let app = TestApp::new().await;
    let no_photo = app
        .user("Zed", Some("zed@example.org"), None, false)
        .await;
    let book = app.book("Dune", 10.0, 1).await;

    let resp = send(
        app.router(),
        "POST",
        "/api/requests",
        Some(json!({ "book_id": book })),
        Some(no_photo.id),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "validation");
    assert_eq!(json["field"], "book_id");
    assert!(json["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn admin_routes_are_admin_only() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let admin = app.admin("Clara").await;
    let book = app.book("Dune", 10.0, 1).await;

    let resp = send(
        app.router(),
        "POST",
        "/api/requests",
        Some(json!({ "book_id": book })),
        Some(ana.id),
    )
    .await;
    let id = body_json(resp).await["id"].as_i64().unwrap();

    let cancel = format!("/api/admin/requests/{id}/cancel");
    let resp = send(app.router(), "POST", &cancel, None, Some(ana.id)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = get_with_session(app.router(), "/api/admin/reviews", ana.id).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(app.router(), "POST", &cancel, None, Some(admin.id)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "canceled");

    let resp = get_with_session(app.router(), "/api/admin/reviews", admin.id).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn listing_and_availability_over_http() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let ben = app.citizen("Ben").await;
    let book = app.book("Dune", 10.0, 1).await;

    send(
        app.router(),
        "POST",
        "/api/requests",
        Some(json!({ "book_id": book })),
        Some(ana.id),
    )
    .await;

    let resp = get_with_session(
        app.router(),
        &format!("/api/books/{book}/availability"),
        ben.id,
    )
    .await;
    let json = body_json(resp).await;
    assert_eq!(json["available"], 0);
    assert_eq!(json["alert_registered"], false);

    let alerts = format!("/api/books/{book}/alerts");
    let resp = send(app.router(), "POST", &alerts, None, Some(ben.id)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = send(app.router(), "POST", &alerts, None, Some(ben.id)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = get_with_session(app.router(), "/api/requests?per_page=5", ana.id).await;
    let json = body_json(resp).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["pagination"]["per_page"], 5);
    assert!(json["stats"].is_null());

    let resp = get_with_session(app.router(), "/api/requests", ben.id).await;
    let json = body_json(resp).await;
    assert!(json["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cart_and_checkout_over_http() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 2).await;

    let resp = send(
        app.router(),
        "POST",
        "/api/cart/items",
        Some(json!({ "book_id": book, "qty": 5 })),
        Some(ana.id),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["item"]["qty"], 2);
    assert!(json["warning"].is_string());

    let resp = get_with_session(app.router(), "/api/cart", ana.id).await;
    let json = body_json(resp).await;
    assert_eq!(json["total_cents"], 2000);

    // The configured gateway points at a closed port.
    let resp = send(
        app.router(),
        "POST",
        "/api/checkout",
        Some(delivery_json()),
        Some(ana.id),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "integration");

    let resp = get_with_session(app.router(), "/api/orders", ana.id).await;
    let json = body_json(resp).await;
    assert_eq!(json["items"][0]["status"], "canceled");
    let resp = get_with_session(app.router(), "/api/cart", ana.id).await;
    assert_eq!(body_json(resp).await["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_marks_order_paid() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 2).await;
    cart::add_item(&app.state, &ana, book, 1).await.unwrap();
    let details: DeliveryDetails = serde_json::from_value(delivery_json()).unwrap();
    let outcome = checkout::checkout(&app.state, &ana, &FakeGateway::default(), &details)
        .await
        .unwrap();

    let body = json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": format!("cs_test_{}", outcome.order_id),
            "payment_intent": "pi_42",
            "payment_status": "paid"
        }}
    })
    .to_string();

    let resp = post_webhook(app.router(), &body, None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let forged = sign_payload(body.as_bytes(), "whsec_other", chrono::Utc::now().timestamp());
    let resp = post_webhook(app.router(), &body, Some(forged)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let signature = sign_payload(body.as_bytes(), WEBHOOK_SECRET, chrono::Utc::now().timestamp());
    let resp = post_webhook(app.router(), &body, Some(signature.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["changed"], true);

    let resp = post_webhook(app.router(), &body, Some(signature)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["changed"], false);

    let order = orders::get_by_id(app.pool(), outcome.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_intent_id.as_deref(), Some("pi_42"));
}

#[tokio::test]
async fn webhook_ignores_other_events() {
    let app = TestApp::new().await;
    let body = json!({
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    })
    .to_string();
    let signature = sign_payload(body.as_bytes(), WEBHOOK_SECRET, chrono::Utc::now().timestamp());
    let resp = post_webhook(app.router(), &body, Some(signature)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["received"], true);
    assert!(json.get("changed").is_none());
}

#[tokio::test]
async fn webhook_without_secret_is_server_error() {
    let mut config = test_config();
    config.payments.stripe_webhook_secret = String::new();
    let app = TestApp::with_config(config).await;
    let body = r#"{"type":"checkout.session.expired","data":{"object":{"id":"cs_x"}}}"#;
    let signature = sign_payload(body.as_bytes(), WEBHOOK_SECRET, chrono::Utc::now().timestamp());
    let resp = post_webhook(app.router(), body, Some(signature)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
