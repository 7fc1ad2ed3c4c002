use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use refuge_types::Error;
use uuid::Uuid;

use crate::session::Session;
use crate::{ApiError, AppState};

/// The resolved session for the current request, inserted by
/// `require_session` and read by handlers and `require_reviewer`.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub token: Uuid,
    pub session: Session,
}

/// Resolve the bearer token to a live session. Anything indeterminate (no
/// header, malformed token, expired store entry) is unauthenticated.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .and_then(|s| s.parse::<Uuid>().ok())
        .ok_or(Error::AuthDenied)?;

    let session = state.sessions.get(token).await.ok_or(Error::AuthDenied)?;

    req.extensions_mut().insert(CurrentSession { token, session });
    Ok(next.run(req).await)
}

/// Privileged routes need a privileged role AND a completed step-up
/// challenge. A missing role sends the caller back to login (401); a missing
/// step-up sends them to the PIN challenge (403).
pub async fn require_reviewer(req: Request, next: Next) -> Result<Response, ApiError> {
    let current = req
        .extensions()
        .get::<CurrentSession>()
        .cloned()
        .ok_or(Error::AuthDenied)?;

    if !current.session.identity.role.is_privileged() {
        return Err(Error::AuthDenied.into());
    }
    if !current.session.step_up_verified {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "step-up verification required" })),
        )
            .into_response());
    }

    Ok(next.run(req).await)
}
