use std::collections::HashSet;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use refuge_types::api::{LoginRequest, LoginResponse, PinRequest};
use refuge_types::models::{Identity, Role};
use refuge_types::Error;
use tracing::debug;

use crate::middleware::CurrentSession;
use crate::{ApiError, AppState};

/// Allow-list configuration loaded once at startup: who may log in at all,
/// and which identities carry a privileged role. The privileged sets win
/// when an address appears in more than one set.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub allowed: HashSet<String>,
    pub reviewers: HashSet<String>,
    pub administrators: HashSet<String>,
    /// Step-up secret shared by all privileged identities.
    pub pin: String,
}

impl AccessPolicy {
    pub fn normalize(email: &str) -> String {
        email.trim().to_ascii_lowercase()
    }

    /// Gate A: allow-list membership. Returns the identity tagged with its
    /// derived role, or nothing. There is no default-allow.
    pub fn authorize(&self, email: &str) -> Option<Identity> {
        let email = Self::normalize(email);
        if email.is_empty() {
            return None;
        }

        let role = if self.administrators.contains(&email) {
            Role::Administrator
        } else if self.reviewers.contains(&email) {
            Role::Reviewer
        } else if self.allowed.contains(&email) {
            Role::Reporter
        } else {
            return None;
        };

        Some(Identity { email, role })
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state.policy.authorize(&req.email).ok_or(Error::AuthDenied)?;

    let role = identity.role;
    let step_up_required = role.is_privileged();
    let token = state.sessions.create(identity).await;

    debug!("Session opened with role {:?}", role);
    Ok(Json(LoginResponse {
        token,
        role,
        step_up_required,
    }))
}

pub async fn verify_pin(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<PinRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .verify_pin(current.token, &req.pin, &state.policy.pin)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> StatusCode {
    state.sessions.remove(current.token).await;
    StatusCode::NO_CONTENT
}
