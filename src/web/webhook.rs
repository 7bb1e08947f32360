use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::shop::checkout;
use crate::shop::payments::{self, WebhookError};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": "webhook", "message": message })),
    )
        .into_response()
}

/// POST /api/webhooks/stripe: payment results. Acknowledged with 200 once
/// the signature checks out, whether or not an order changed.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let config = &state.config.payments;
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let now = chrono::Utc::now().timestamp();

    match payments::verify_signature(
        &body,
        header,
        &config.stripe_webhook_secret,
        now,
        config.webhook_tolerance_secs,
    ) {
        Ok(()) => {}
        Err(WebhookError::MissingSecret) => {
            tracing::error!("Stripe webhook received but payments.stripe_webhook_secret is empty");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "webhook not configured");
        }
        Err(e) => {
            tracing::warn!("Rejected Stripe webhook: {e}");
            return reject(StatusCode::BAD_REQUEST, "invalid signature");
        }
    }

    let event = match payments::parse_event(&body) {
        Ok(Some(event)) => event,
        Ok(None) => return Json(serde_json::json!({ "received": true })).into_response(),
        Err(e) => {
            tracing::warn!("Rejected Stripe webhook: {e}");
            return reject(StatusCode::BAD_REQUEST, "invalid payload");
        }
    };

    match checkout::apply_payment_event(&state, &event).await {
        Ok(changed) => Json(serde_json::json!({ "received": true, "changed": changed })).into_response(),
        Err(e) => e.into_response(),
    }
}
