pub mod actor;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod lending;
pub mod notify;
pub mod scheduler;
pub mod shop;
pub mod state;
pub mod stock;
pub mod web;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = sqlx::query("SELECT 1")
        .execute(state.db.inner())
        .await
        .is_ok();
    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": if db_ok { "connected" } else { "error" },
    }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", web::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
