//! Review gate: one review per request, moderated by an admin.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actor::Actor;
use crate::audit;
use crate::db::models::{RequestStatus, Review, ReviewStatus};
use crate::db::queries::{requests, reviews};
use crate::db::{DbTx, is_unique_violation};
use crate::error::AppError;
use crate::notify::Notification;
use crate::web::pagination::{PageRequest, Paged};
use crate::state::AppState;

pub const MAX_TEXT_LEN: usize = 2000;

/// An admin's verdict on a pending review.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject {
        #[serde(default)]
        reason: String,
    },
}

/// Review outcome to announce once the surrounding transaction commits.
pub(crate) struct Evaluated {
    pub review: Review,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

/// Apply `decision` to a pending review inside `tx`.
pub(crate) async fn apply_decision_tx(
    tx: &mut DbTx,
    review: &Review,
    decision: &ReviewDecision,
) -> Result<Evaluated, AppError> {
    if review.status != ReviewStatus::Pending {
        return Err(AppError::validation(
            "status",
            "This review has already been evaluated.",
        ));
    }
    let (status, reason) = match decision {
        ReviewDecision::Approve => (ReviewStatus::Active, None),
        ReviewDecision::Reject { reason } => {
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(AppError::validation(
                    "rejection_reason",
                    "Rejection reason is required when rejecting a review.",
                ));
            }
            if reason.chars().count() > MAX_TEXT_LEN {
                return Err(AppError::validation(
                    "rejection_reason",
                    format!("The rejection reason may not be greater than {MAX_TEXT_LEN} characters."),
                ));
            }
            (ReviewStatus::Rejected, Some(reason.to_string()))
        }
    };

    let now = crate::db::now();
    if !reviews::decide_tx(tx, review.id, status, reason.as_deref(), &now).await? {
        return Err(AppError::validation(
            "status",
            "This review has already been evaluated.",
        ));
    }
    let mut updated = review.clone();
    updated.status = status;
    updated.rejection_reason = reason.clone();
    updated.updated_at = now;
    Ok(Evaluated {
        review: updated,
        approved: status == ReviewStatus::Active,
        rejection_reason: reason,
    })
}

/// Notify the author and write the audit entry for a committed evaluation.
pub(crate) async fn announce(state: &AppState, actor: &Actor, before: &Review, evaluated: Evaluated) {
    audit::updated(
        &state.db,
        Some(actor.id),
        "reviews",
        before.id,
        before,
        &evaluated.review,
    )
    .await;

    let book_name = match requests::get_by_id(&state.db, before.request_id).await {
        Ok(Some(r)) => r.book.name,
        _ => String::new(),
    };
    if let Some(to) = super::addressee(&state.db, before.user_id).await {
        state.outbox.emit(Notification::ReviewEvaluated {
            to,
            book_name,
            approved: evaluated.approved,
            rejection_reason: evaluated.rejection_reason,
        });
    }
}

/// Leave a review on one's own returned or completed request.
pub async fn submit(
    state: &AppState,
    actor: &Actor,
    request_id: i64,
    rating: i64,
    comment: Option<&str>,
) -> Result<Review, AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::validation("rating", "The rating must be between 1 and 5."));
    }
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    if comment.is_some_and(|c| c.chars().count() > MAX_TEXT_LEN) {
        return Err(AppError::validation(
            "comment",
            format!("The comment may not be greater than {MAX_TEXT_LEN} characters."),
        ));
    }

    let mut tx = state.db.begin().await?;
    let request = requests::get_for_update_tx(&mut tx, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("request"))?;
    if request.user_id != Some(actor.id) {
        return Err(AppError::Forbidden);
    }
    if !matches!(
        request.status,
        RequestStatus::AwaitingConfirmation | RequestStatus::Completed
    ) {
        return Err(AppError::validation(
            "request_id",
            "You can only leave a review when the request is awaiting confirmation or completed.",
        ));
    }
    let Some(book_id) = request.book_id else {
        return Err(AppError::validation(
            "request_id",
            "This request no longer has a book associated, so it cannot be reviewed.",
        ));
    };
    if reviews::get_by_request_tx(&mut tx, request_id).await?.is_some() {
        return Err(already_reviewed());
    }

    let now = crate::db::now();
    let id = reviews::insert_tx(&mut tx, request_id, book_id, actor.id, rating, comment, &now)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                already_reviewed()
            } else {
                AppError::Db(e)
            }
        })?;
    tx.commit().await?;

    let review = reviews::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("review {id} vanished after insert")))?;
    info!(review_id = id, request_id, rating, "review submitted");

    audit::created(&state.db, Some(actor.id), "reviews", id, &review).await;
    let notifications = super::to_admins(&state.db, |to| Notification::ReviewCreated {
        to,
        review_id: id,
        request_number: request.number,
        book_name: request.book.name.clone(),
        rating,
        comment: review.comment.clone(),
    })
    .await;
    state.outbox.emit_all(notifications);

    Ok(review)
}

fn already_reviewed() -> AppError {
    AppError::validation(
        "request_id",
        "You have already submitted a review for this request.",
    )
}

/// Approve or reject a pending review.
pub async fn evaluate(
    state: &AppState,
    actor: &Actor,
    review_id: i64,
    decision: &ReviewDecision,
) -> Result<Review, AppError> {
    actor.require_admin()?;

    let mut tx = state.db.begin().await?;
    let review = reviews::get_for_update_tx(&mut tx, review_id)
        .await?
        .ok_or_else(|| AppError::not_found("review"))?;
    let evaluated = apply_decision_tx(&mut tx, &review, decision).await?;
    tx.commit().await?;

    info!(review_id, approved = evaluated.approved, "review evaluated");
    let updated = evaluated.review.clone();
    announce(state, actor, &review, evaluated).await;
    Ok(updated)
}

/// Admin listing, newest first. Unknown status filters list everything.
pub async fn list(
    state: &AppState,
    actor: &Actor,
    status: Option<&str>,
    page: &PageRequest,
) -> Result<Paged<Review>, AppError> {
    actor.require_admin()?;
    let status = status.and_then(|s| s.parse::<ReviewStatus>().ok());
    let total = reviews::count(&state.db, status).await?;
    let items = reviews::list(&state.db, status, page.per_page(), page.offset()).await?;
    Ok(Paged::new(items, page, total))
}

pub async fn show(state: &AppState, actor: &Actor, review_id: i64) -> Result<Review, AppError> {
    let review = reviews::get_by_id(&state.db, review_id)
        .await?
        .ok_or_else(|| AppError::not_found("review"))?;
    if !actor.can_access(Some(review.user_id)) {
        return Err(AppError::Forbidden);
    }
    Ok(review)
}
