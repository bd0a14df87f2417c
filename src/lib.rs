pub mod ack;
pub mod admin;
pub mod app;
pub mod config;
pub mod course;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod model;
pub mod overrides;
pub mod owntracks;
pub mod persistence;
pub mod position_store;
pub mod registry;
pub mod validator;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{BoxError, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use app::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn handle_timeout_error(err: BoxError) -> StatusCode {
    if err.is::<tower::timeout::error::Elapsed>() {
        StatusCode::REQUEST_TIMEOUT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn health_check() -> axum::Json<serde_json::Value> {
    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "serverTime": now_ms,
    }))
}

/// Assemble the full HTTP surface: public tracker ingest, the OwnTracks
/// adapter, the public event/course reads, and the admin/manager routes.
/// CORS is wide open — trackers are native mobile clients and browsers from
/// arbitrary origins, with no cookie-based session to protect. Every request,
/// body read included, is capped at 10 seconds; exceeding it yields 408
/// rather than tying up a handler indefinitely.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/tracker", post(ingest::post_tracker))
        .route("/api/position", post(ingest::post_tracker))
        .route("/api/owntracks", post(owntracks::post_owntracks))
        .route("/api/events", get(admin::list_events))
        .route("/api/course", get(admin::get_course))
        .route("/api/auth/check", get(admin::auth_check))
        .route("/api/admin/clear-tracks", post(admin::clear_tracks))
        .route("/api/admin/course", post(admin::set_course).delete(admin::delete_course))
        .route("/api/users", get(admin::list_users))
        .route("/api/admin/user/:id", post(admin::set_user).delete(admin::remove_user))
        .route("/api/manager/events", get(admin::manager_list_events).post(admin::manager_create_event))
        .route("/api/manager/events/:eid", put(admin::manager_update_event).delete(admin::manager_delete_event))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}
