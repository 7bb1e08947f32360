use axum::extract::{Extension, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::CookieJar;
use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;

use crate::actor::Actor;
use crate::db::queries::users;
use crate::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Create a signed session cookie value: `{user_id}:{expiry}:{hex_signature}`.
pub fn sign_session(user_id: i64, secret: &[u8], ttl_hours: u64) -> String {
    let expiry = chrono::Utc::now().timestamp() + (ttl_hours * 3600) as i64;
    let payload = format!("{user_id}:{expiry}");
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("{payload}:{sig}")
}

/// Verify a signed session cookie value. Returns user_id if valid and not expired.
pub fn verify_session(cookie_value: &str, secret: &[u8]) -> Option<i64> {
    let parts: Vec<&str> = cookie_value.splitn(3, ':').collect();
    if parts.len() != 3 {
        return None;
    }
    let user_id: i64 = parts[0].parse().ok()?;
    let expiry: i64 = parts[1].parse().ok()?;

    if chrono::Utc::now().timestamp() > expiry {
        return None;
    }

    let payload = format!("{}:{}", parts[0], parts[1]);
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    let expected = hex::decode(parts[2]).ok()?;
    mac.verify_slice(&expected).ok()?;

    Some(user_id)
}

/// CSRF token tied to the session value.
pub fn generate_csrf_token(session_value: &str, secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(b"csrf:");
    mac.update(session_value.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Middleware: resolve the session cookie to an [`Actor`] stored in the
/// request extensions. Mutating requests must echo the CSRF token in the
/// `X-CSRF-Token` header.
pub async fn session_auth_layer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let secret = state.config.server.session_secret.as_bytes();
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return AppError::Unauthorized.into_response();
    };
    let Some(user_id) = verify_session(cookie.value(), secret) else {
        return AppError::Unauthorized.into_response();
    };

    if is_mutating(request.method()) {
        let submitted = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if submitted != generate_csrf_token(cookie.value(), secret) {
            tracing::debug!(user_id, path = %request.uri().path(), "CSRF token mismatch");
            return AppError::Forbidden.into_response();
        }
    }

    let user = match users::get_by_id(&state.db, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return AppError::Unauthorized.into_response(),
        Err(e) => return AppError::Db(e).into_response(),
    };
    request.extensions_mut().insert(Actor::from_user(&user));
    next.run(request).await
}

/// GET /api/me: the resolved actor plus the CSRF token for mutating calls.
pub async fn me(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(actor): Extension<Actor>,
) -> Json<serde_json::Value> {
    let secret = state.config.server.session_secret.as_bytes();
    let csrf_token = jar
        .get(SESSION_COOKIE)
        .map(|c| generate_csrf_token(c.value(), secret))
        .unwrap_or_default();
    Json(serde_json::json!({
        "user_id": actor.id,
        "is_admin": actor.is_admin,
        "has_verified_photo": actor.has_verified_photo,
        "csrf_token": csrf_token,
    }))
}

/// Middleware: admin-only routes. Runs inside [`session_auth_layer`].
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<Actor>() {
        Some(actor) if actor.is_admin => next.run(request).await,
        Some(_) => AppError::Forbidden.into_response(),
        None => AppError::Unauthorized.into_response(),
    }
}
