//! Request lifecycle.
//!
//! ```text
//! active ──return──▶ awaiting_confirmation ──confirm──▶ completed
//!    │                        │
//!    └────────cancel──────────┴──────────▶ canceled
//! ```
//!
//! Every transition runs in one transaction holding the row locks it
//! depends on. Notifications, audit entries and availability alerts follow
//! the commit and never undo it.

use std::future::Future;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::alerts;
use super::reviews::{self, ReviewDecision};
use crate::actor::Actor;
use crate::audit;
use crate::db::models::{BookRequest, BookSnapshot, CitizenSnapshot, RequestStatus, Review, ReviewStatus};
use crate::db::queries::requests::{self as queries, NewRequest, RequestFilter, RequestSort, RequestStats};
use crate::db::queries::{books, reviews as review_queries, users};
use crate::db::{format_ts, is_unique_violation, parse_ts};
use crate::error::AppError;
use crate::notify::{Addressee, Notification};
use crate::web::pagination::{PageRequest, Paged};
use crate::state::AppState;
use crate::stock;

/// A request as shown to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: BookRequest,
    pub is_overdue: bool,
}

impl RequestView {
    pub fn new(request: BookRequest, now: &str) -> Self {
        let is_overdue = request.is_overdue(now);
        Self {
            request,
            is_overdue,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub view: RequestView,
    pub review: Option<Review>,
    pub can_leave_review: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestList {
    #[serde(flatten)]
    pub page: Paged<RequestView>,
    /// Only present for admins.
    pub stats: Option<RequestStats>,
}

/// Listing options as they arrive from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListParams {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Whole days between two stored timestamps, never negative.
fn days_between(from: &str, to: &str) -> i64 {
    match (parse_ts(from), parse_ts(to)) {
        (Some(a), Some(b)) => (b - a).num_days().max(0),
        _ => 0,
    }
}

/// Create a borrowing request for `book_id` on behalf of `actor`.
pub async fn create(state: &AppState, actor: &Actor, book_id: i64) -> Result<BookRequest, AppError> {
    let id = retry_on_number_clash(move || try_create(state, actor, book_id)).await?;

    let request = queries::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("request {id} vanished after insert")))?;
    info!(
        request_id = id,
        number = request.number,
        book_id,
        user_id = actor.id,
        "request created"
    );

    audit::created(&state.db, Some(actor.id), "requests", id, &request).await;

    let mut notifications = Vec::new();
    if let Some(email) = request.citizen.email.clone().filter(|e| !e.is_empty()) {
        notifications.push(created_notification(
            &request,
            Addressee {
                name: request.citizen.name.clone(),
                email,
            },
            false,
        ));
    }
    notifications.extend(
        super::to_admins(&state.db, |to| created_notification(&request, to, true)).await,
    );
    state.outbox.emit_all(notifications);

    Ok(request)
}

/// Run `attempt` once more if it lost the race for the next request number.
/// A second clash is reported as a conflict.
async fn retry_on_number_clash<F, Fut>(attempt: F) -> Result<i64, AppError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<i64, AppError>>,
{
    match attempt().await {
        Err(AppError::Db(e)) if is_unique_violation(&e) => {
            warn!("request number taken concurrently, retrying");
            match attempt().await {
                Err(AppError::Db(e)) if is_unique_violation(&e) => Err(AppError::Conflict(
                    "Another request was created at the same time. Please try again.".to_string(),
                )),
                other => other,
            }
        }
        other => other,
    }
}

fn created_notification(request: &BookRequest, to: Addressee, for_admin: bool) -> Notification {
    Notification::RequestCreated {
        to,
        for_admin,
        request_id: request.id,
        number: request.number,
        book_name: request.book.name.clone(),
        citizen_name: request.citizen.name.clone(),
        due_at: request.due_at.clone(),
    }
}

async fn try_create(state: &AppState, actor: &Actor, book_id: i64) -> Result<i64, AppError> {
    let mut tx = state.db.begin().await?;

    // Lock order: user, then book.
    if !tx.lock_row("users", actor.id).await? {
        return Err(AppError::Unauthorized);
    }
    if !tx.lock_row("books", book_id).await? {
        return Err(AppError::not_found("book"));
    }

    if !actor.has_verified_photo {
        return Err(AppError::validation(
            "book_id",
            "You must upload a profile photo before creating a request.",
        ));
    }
    let max_active = state.config.library.max_active_requests;
    if queries::count_claims_for_user_tx(&mut tx, actor.id).await? >= max_active {
        return Err(AppError::validation(
            "book_id",
            format!("You already have {max_active} active requests. Return a book before requesting another."),
        ));
    }
    if stock::available(&mut tx, book_id).await? <= 0 {
        return Err(AppError::validation(
            "book_id",
            "This book is out of stock and not available for request right now.",
        ));
    }

    let user = users::get_by_id_tx(&mut tx, actor.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let book = books::get_by_id_tx(&mut tx, book_id)
        .await?
        .ok_or_else(|| AppError::not_found("book"))?;

    let citizen = CitizenSnapshot {
        name: user.name,
        email: user.email,
        photo: user.profile_photo_path,
    };
    let snapshot = BookSnapshot {
        name: book.name,
        cover: book.cover,
    };
    let now = chrono::Utc::now().naive_utc();
    let requested_at = format_ts(now);
    let due_at = format_ts(now + Duration::days(state.config.library.loan_days));
    let number = queries::next_number_tx(&mut tx).await?;

    let id = queries::insert_tx(
        &mut tx,
        &NewRequest {
            number,
            book_id,
            user_id: actor.id,
            citizen: &citizen,
            book: &snapshot,
            requested_at: &requested_at,
            due_at: &due_at,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(id)
}

/// The citizen (or an admin) hands the book back. Repeating it is harmless.
pub async fn mark_returned(
    state: &AppState,
    actor: &Actor,
    request_id: i64,
) -> Result<BookRequest, AppError> {
    let mut tx = state.db.begin().await?;
    let before = queries::get_for_update_tx(&mut tx, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("request"))?;
    if !actor.can_access(before.user_id) {
        return Err(AppError::Forbidden);
    }
    match before.status {
        RequestStatus::Active => {
            queries::mark_returned_tx(&mut tx, request_id, &crate::db::now()).await?;
        }
        RequestStatus::AwaitingConfirmation => return Ok(before),
        RequestStatus::Completed | RequestStatus::Canceled => {
            return Err(AppError::validation("status", "This request is not active."));
        }
    }
    tx.commit().await?;

    let after = reload(state, request_id).await?;
    info!(request_id, user_id = actor.id, "request marked returned");
    audit::updated(&state.db, Some(actor.id), "requests", request_id, &before, &after).await;
    Ok(after)
}

/// An admin confirms the book is back on the shelf. A pending review on the
/// request must be decided in the same step.
pub async fn confirm_received(
    state: &AppState,
    actor: &Actor,
    request_id: i64,
    review_decision: Option<&ReviewDecision>,
) -> Result<BookRequest, AppError> {
    actor.require_admin()?;

    let mut tx = state.db.begin().await?;
    let before = queries::get_for_update_tx(&mut tx, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("request"))?;
    if before.status != RequestStatus::AwaitingConfirmation {
        return Err(AppError::validation(
            "status",
            "This request cannot be confirmed.",
        ));
    }

    let mut evaluated = None;
    if let Some(review) = review_queries::get_by_request_tx(&mut tx, request_id).await?
        && review.status == ReviewStatus::Pending
    {
        if !tx.lock_row("reviews", review.id).await? {
            return Err(AppError::not_found("review"));
        }
        let Some(decision) = review_decision else {
            return Err(AppError::validation(
                "review_action",
                "Approve or reject the pending review before confirming this request.",
            ));
        };
        let outcome = reviews::apply_decision_tx(&mut tx, &review, decision).await?;
        evaluated = Some((review, outcome));
    }

    let received_at = crate::db::now();
    let days_elapsed = days_between(&before.requested_at, &received_at);
    queries::complete_tx(&mut tx, request_id, &received_at, actor.id, days_elapsed).await?;
    tx.commit().await?;

    let after = reload(state, request_id).await?;
    info!(request_id, admin_id = actor.id, days_elapsed, "request completed");
    audit::updated(&state.db, Some(actor.id), "requests", request_id, &before, &after).await;
    if let Some((review, outcome)) = evaluated {
        reviews::announce(state, actor, &review, outcome).await;
    }
    alerts::notify_after_commit(state, after.book_id).await;
    Ok(after)
}

/// An admin cancels a request that is not completed. Any review on it is
/// deleted. Canceling twice is a no-op.
pub async fn cancel(
    state: &AppState,
    actor: &Actor,
    request_id: i64,
) -> Result<BookRequest, AppError> {
    actor.require_admin()?;

    let mut tx = state.db.begin().await?;
    let before = queries::get_for_update_tx(&mut tx, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("request"))?;
    match before.status {
        RequestStatus::Completed => {
            return Err(AppError::validation(
                "status",
                "Completed requests cannot be canceled.",
            ));
        }
        RequestStatus::Canceled => return Ok(before),
        RequestStatus::Active | RequestStatus::AwaitingConfirmation => {}
    }

    let review = review_queries::get_by_request_tx(&mut tx, request_id).await?;
    if review.is_some() {
        review_queries::delete_by_request_tx(&mut tx, request_id).await?;
    }
    queries::cancel_tx(&mut tx, request_id, &crate::db::now()).await?;
    tx.commit().await?;

    let after = reload(state, request_id).await?;
    info!(request_id, admin_id = actor.id, "request canceled");
    audit::updated(&state.db, Some(actor.id), "requests", request_id, &before, &after).await;
    if let Some(review) = review {
        audit::deleted(&state.db, Some(actor.id), "reviews", review.id, &review).await;
    }
    alerts::notify_after_commit(state, after.book_id).await;
    Ok(after)
}

async fn reload(state: &AppState, request_id: i64) -> Result<BookRequest, AppError> {
    queries::get_by_id(&state.db, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("request"))
}

/// Citizens see their own requests; admins see everyone's plus counters.
pub async fn list(
    state: &AppState,
    actor: &Actor,
    params: &ListParams,
) -> Result<RequestList, AppError> {
    let status = params
        .status
        .as_deref()
        .and_then(|s| s.parse::<RequestStatus>().ok());
    let sort = params
        .sort
        .as_deref()
        .and_then(RequestSort::parse)
        .filter(|s| actor.is_admin || *s != RequestSort::Citizen)
        .unwrap_or_default();
    let descending = match params.direction.as_deref() {
        Some("asc") => false,
        Some("desc") => true,
        _ => sort == RequestSort::RequestedAt,
    };
    let filter = RequestFilter {
        user_id: (!actor.is_admin).then_some(actor.id),
        status,
        search: params.search.clone(),
        search_citizen: actor.is_admin,
        sort,
        descending,
    };

    let page = params.page_request();
    let total = queries::count(&state.db, &filter).await?;
    let rows = queries::list(&state.db, &filter, page.per_page(), page.offset()).await?;
    let now = crate::db::now();
    let items = rows.into_iter().map(|r| RequestView::new(r, &now)).collect();

    let stats = if actor.is_admin {
        let today = chrono::Utc::now().naive_utc().date();
        let today_start = NaiveDateTime::new(today, NaiveTime::MIN);
        Some(
            queries::stats(
                &state.db,
                &format_ts(today_start - Duration::days(30)),
                &format_ts(today_start),
            )
            .await?,
        )
    } else {
        None
    };

    Ok(RequestList {
        page: Paged::new(items, &page, total),
        stats,
    })
}

pub async fn show(state: &AppState, actor: &Actor, request_id: i64) -> Result<RequestDetail, AppError> {
    let request = reload(state, request_id).await?;
    if !actor.can_access(request.user_id) {
        return Err(AppError::Forbidden);
    }
    let review = review_queries::get_by_request(&state.db, request_id).await?;
    let can_leave_review = request.user_id == Some(actor.id)
        && matches!(
            request.status,
            RequestStatus::AwaitingConfirmation | RequestStatus::Completed
        )
        && request.book_id.is_some()
        && review.is_none();
    Ok(RequestDetail {
        view: RequestView::new(request, &crate::db::now()),
        review,
        can_leave_review,
    })
}

/// Queue a reminder for every claim due during the UTC day after `now`.
pub async fn remind_due_tomorrow(state: &AppState, now: NaiveDateTime) -> Result<usize, AppError> {
    let tomorrow = NaiveDateTime::new(now.date() + Duration::days(1), NaiveTime::MIN);
    let due = queries::due_between(
        &state.db,
        &format_ts(tomorrow),
        &format_ts(tomorrow + Duration::days(1)),
    )
    .await?;

    let count = due.len();
    state.outbox.emit_all(due.into_iter().filter_map(|r| {
        let email = r.citizen.email?;
        Some(Notification::DueTomorrow {
            to: Addressee {
                name: r.citizen.name,
                email,
            },
            request_id: r.id,
            number: r.number,
            book_name: r.book.name,
            due_at: r.due_at,
        })
    }));
    info!(count, "due-tomorrow reminders queued");
    Ok(count)
}
