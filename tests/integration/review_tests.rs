use super::*;
use libris::db::models::{RequestStatus, ReviewStatus};
use libris::db::queries::reviews as review_queries;
use libris::error::AppError;
use libris::lending::requests;
use libris::lending::reviews::{self, ReviewDecision};
use libris::web::pagination::PageRequest;

fn field_of(err: AppError) -> &'static str {
    match err {
        AppError::Validation { field, .. } => field,
        other => panic!("expected validation error, got {other:?}"),
    }
}

struct Setup {
    app: TestApp,
    admin: Actor,
    ana: Actor,
    request_id: i64,
}

/// A returned (awaiting confirmation) request owned by Ana.
async fn returned_request() -> Setup {
    let app = TestApp::new().await;
    let admin = app.admin("Clara").await;
    let ana = app.citizen("Ana").await;
    let book = app.book("Dune", 10.0, 1).await;
    let req = requests::create(&app.state, &ana, book).await.unwrap();
    requests::mark_returned(&app.state, &ana, req.id).await.unwrap();
    Setup {
        app,
        admin,
        ana,
        request_id: req.id,
    }
}

#[tokio::test]
async fn review_requires_returned_request_and_owner() {
    let app = TestApp::new().await;
    let ana = app.citizen("Ana").await;
    let ben = app.citizen("Ben").await;
    let book = app.book("Dune", 10.0, 1).await;
    let req = requests::create(&app.state, &ana, book).await.unwrap();

    let err = reviews::submit(&app.state, &ana, req.id, 5, None).await.unwrap_err();
    assert_eq!(field_of(err), "request_id");

    requests::mark_returned(&app.state, &ana, req.id).await.unwrap();
    let err = reviews::submit(&app.state, &ben, req.id, 5, None).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = reviews::submit(&app.state, &ana, req.id, 6, None).await.unwrap_err();
    assert_eq!(field_of(err), "rating");
    let long = "x".repeat(2001);
    let err = reviews::submit(&app.state, &ana, req.id, 4, Some(&long))
        .await
        .unwrap_err();
    assert_eq!(field_of(err), "comment");
}

#[tokio::test]
async fn one_review_per_request_and_admins_notified() {
    let mut s = returned_request().await;
    s.app.drain();

    let review = reviews::submit(&s.app.state, &s.ana, s.request_id, 4, Some("  Great read "))
        .await
        .unwrap();
    assert_eq!(review.status, ReviewStatus::Pending);
    assert_eq!(review.comment.as_deref(), Some("Great read"));

    let err = reviews::submit(&s.app.state, &s.ana, s.request_id, 3, None)
        .await
        .unwrap_err();
    assert_eq!(field_of(err), "request_id");

    let sent = s.app.drain();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        Notification::ReviewCreated { rating: 4, to, .. } if to.email == "clara@library.example.org"
    ));
}

#[tokio::test]
async fn confirm_requires_decision_on_pending_review() {
    let mut s = returned_request().await;
    reviews::submit(&s.app.state, &s.ana, s.request_id, 2, None)
        .await
        .unwrap();

    let err = requests::confirm_received(&s.app.state, &s.admin, s.request_id, None)
        .await
        .unwrap_err();
    assert_eq!(field_of(err), "review_action");

    let empty_reject = ReviewDecision::Reject {
        reason: "   ".into(),
    };
    let err = requests::confirm_received(&s.app.state, &s.admin, s.request_id, Some(&empty_reject))
        .await
        .unwrap_err();
    assert_eq!(field_of(err), "rejection_reason");

    // Nothing changed after the failed attempts.
    let detail = requests::show(&s.app.state, &s.admin, s.request_id).await.unwrap();
    assert_eq!(detail.view.request.status, RequestStatus::AwaitingConfirmation);
    assert_eq!(detail.review.unwrap().status, ReviewStatus::Pending);

    s.app.drain();
    let reject = ReviewDecision::Reject {
        reason: "Contains spoilers".into(),
    };
    let done = requests::confirm_received(&s.app.state, &s.admin, s.request_id, Some(&reject))
        .await
        .unwrap();
    assert_eq!(done.status, RequestStatus::Completed);

    let review = review_queries::get_by_request(s.app.pool(), s.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(review.status, ReviewStatus::Rejected);
    assert_eq!(review.rejection_reason.as_deref(), Some("Contains spoilers"));

    let sent = s.app.drain();
    assert!(sent.iter().any(|n| matches!(
        n,
        Notification::ReviewEvaluated { approved: false, rejection_reason: Some(r), to, .. }
            if r == "Contains spoilers" && to.email == "ana@example.org"
    )));
}

#[tokio::test]
async fn standalone_evaluation_and_listing() {
    let s = returned_request().await;
    let review = reviews::submit(&s.app.state, &s.ana, s.request_id, 5, None)
        .await
        .unwrap();

    let err = reviews::evaluate(&s.app.state, &s.ana, review.id, &ReviewDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let pending = reviews::list(&s.app.state, &s.admin, Some("pending"), &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(pending.items.len(), 1);

    let approved = reviews::evaluate(&s.app.state, &s.admin, review.id, &ReviewDecision::Approve)
        .await
        .unwrap();
    assert_eq!(approved.status, ReviewStatus::Active);

    let err = reviews::evaluate(&s.app.state, &s.admin, review.id, &ReviewDecision::Approve)
        .await
        .unwrap_err();
    assert_eq!(field_of(err), "status");

    let pending = reviews::list(&s.app.state, &s.admin, Some("pending"), &PageRequest::default())
        .await
        .unwrap();
    assert!(pending.items.is_empty());
    let all = reviews::list(&s.app.state, &s.admin, None, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.pagination.total_items, 1);

    // An already-decided review does not block confirmation.
    let done = requests::confirm_received(&s.app.state, &s.admin, s.request_id, None)
        .await
        .unwrap();
    assert_eq!(done.status, RequestStatus::Completed);

    assert!(reviews::show(&s.app.state, &s.ana, review.id).await.is_ok());
    let ben = s.app.citizen("Ben").await;
    assert!(matches!(
        reviews::show(&s.app.state, &ben, review.id).await.unwrap_err(),
        AppError::Forbidden
    ));
}

#[tokio::test]
async fn cancel_deletes_review() {
    let s = returned_request().await;
    let review = reviews::submit(&s.app.state, &s.ana, s.request_id, 3, None)
        .await
        .unwrap();

    requests::cancel(&s.app.state, &s.admin, s.request_id).await.unwrap();
    assert!(review_queries::get_by_id(s.app.pool(), review.id)
        .await
        .unwrap()
        .is_none());

    let logs = libris::db::queries::system_logs::for_record(
        s.app.pool(),
        "reviews",
        &review.id.to_string(),
    )
    .await
    .unwrap();
    assert_eq!(logs.last().unwrap().action, "deleted");
}
