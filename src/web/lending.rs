//! Borrowing endpoints: book availability, alerts, requests and reviews.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::db::models::{BookRequest, Review};
use crate::db::queries::{alerts as alert_queries, books};
use crate::error::AppError;
use crate::lending::requests::{ListParams, RequestDetail, RequestList};
use crate::lending::reviews::ReviewDecision;
use crate::lending::{alerts, requests, reviews};
use crate::web::pagination::{PageRequest, Paged};
use crate::state::AppState;
use crate::stock;

#[derive(Debug, Serialize)]
pub struct Availability {
    pub book_id: i64,
    pub name: String,
    pub stock: i64,
    pub available: i64,
    pub alert_registered: bool,
}

/// GET /api/books/{id}/availability
pub async fn book_availability(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(book_id): Path<i64>,
) -> Result<Json<Availability>, AppError> {
    let book = books::get_by_id(&state.db, book_id)
        .await?
        .ok_or_else(|| AppError::not_found("book"))?;
    let available = stock::available_now(&state.db, book_id).await?;
    let alert_registered = alert_queries::exists(&state.db, book_id, actor.id).await?;
    Ok(Json(Availability {
        book_id,
        name: book.name,
        stock: book.stock,
        available,
        alert_registered,
    }))
}

/// POST /api/books/{id}/alerts
pub async fn register_alert(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(book_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let registration = alerts::register(&state, &actor, book_id).await?;
    let status = if registration.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(registration)))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub book_id: i64,
}

/// GET /api/requests
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<RequestList>, AppError> {
    Ok(Json(requests::list(&state, &actor, &params).await?))
}

/// POST /api/requests
pub async fn create_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse, AppError> {
    let request = requests::create(&state, &actor, body.book_id).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/requests/{id}
pub async fn show_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<RequestDetail>, AppError> {
    Ok(Json(requests::show(&state, &actor, id).await?))
}

/// POST /api/requests/{id}/return
pub async fn return_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<BookRequest>, AppError> {
    Ok(Json(requests::mark_returned(&state, &actor, id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmBody {
    #[serde(default)]
    pub review: Option<ReviewDecision>,
}

/// POST /api/admin/requests/{id}/confirm
pub async fn confirm_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    body: Option<Json<ConfirmBody>>,
) -> Result<Json<BookRequest>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let request = requests::confirm_received(&state, &actor, id, body.review.as_ref()).await?;
    Ok(Json(request))
}

/// POST /api/admin/requests/{id}/cancel
pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<BookRequest>, AppError> {
    Ok(Json(requests::cancel(&state, &actor, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// POST /api/requests/{id}/review
pub async fn submit_review(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(body): Json<ReviewBody>,
) -> Result<impl IntoResponse, AppError> {
    let review = reviews::submit(&state, &actor, id, body.rating, body.comment.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// GET /api/admin/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<Paged<Review>>, AppError> {
    let page = PageRequest {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(
        reviews::list(&state, &actor, query.status.as_deref(), &page).await?,
    ))
}

/// GET /api/reviews/{id}
pub async fn show_review(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(reviews::show(&state, &actor, id).await?))
}

/// POST /api/admin/reviews/{id}/evaluate
pub async fn evaluate_review(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(decision): Json<ReviewDecision>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(reviews::evaluate(&state, &actor, id, &decision).await?))
}
