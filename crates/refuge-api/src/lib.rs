pub mod attachments;
pub mod auth;
pub mod middleware;
pub mod reports;
pub mod review;
pub mod session;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware as axum_middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use refuge_types::Error;
use tracing::error;

use crate::auth::AccessPolicy;
use crate::session::SessionStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: refuge_db::Database,
    pub storage: refuge_store::Storage,
    pub sessions: SessionStore,
    pub policy: AccessPolicy,
    pub notifier: refuge_notify::Notifier,
}

/// Maps the shared error taxonomy onto HTTP outcomes. Internal detail is
/// logged, never echoed to the caller.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Validation(reason) => (StatusCode::UNPROCESSABLE_ENTITY, reason.clone()),
            Error::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            Error::AuthDenied => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            Error::Transport(detail) | Error::Internal(detail) => {
                error!("Internal error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::from(Error::internal(e))
        })?
        .map_err(ApiError::from)
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let session_routes = Router::new()
        .route("/auth/pin", post(auth::verify_pin))
        .route("/auth/logout", post(auth::logout))
        .route("/reports", post(reports::submit_report))
        .route("/tickets/{protocol}", get(reports::resume_ticket))
        .route("/tickets/{protocol}/messages", post(reports::post_message))
        .route("/attachments", post(attachments::upload))
        .route("/attachments/{handle}", get(attachments::download))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ))
        .with_state(state.clone());

    let review_routes = Router::new()
        .route("/review/tickets", get(review::dashboard))
        .route("/review/tickets/{protocol}", get(review::ticket_detail))
        .route("/review/tickets/{protocol}/status", post(review::set_status))
        .route("/review/tickets/{protocol}/note", post(review::set_note))
        .route("/review/tickets/{protocol}/messages", post(review::reply))
        .layer(axum_middleware::from_fn(middleware::require_reviewer))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ))
        .with_state(state);

    Router::new()
        .merge(public)
        .merge(session_routes)
        .merge(review_routes)
}

/// GET /health — liveness probe, no auth.
async fn health() -> &'static str {
    "OK"
}
