use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use refuge_types::api::{
    PostMessageRequest, SubmitReportRequest, SubmitReportResponse, ThreadResponse, TicketView,
};
use refuge_types::models::{AuthorRole, ChatMessage};
use refuge_types::Error;
use tracing::info;

use crate::attachments::resolve_attachment;
use crate::middleware::CurrentSession;
use crate::{run_blocking, ApiError, AppState};

/// POST /reports — file a new anonymous report. Returns the protocol, the
/// only credential ever needed to resume the conversation. The report text
/// also becomes the thread's first reporter message, so resuming shows it
/// and the dashboard counts it as unread.
pub async fn submit_report(
    State(state): State<AppState>,
    Extension(_current): Extension<CurrentSession>,
    Json(req): Json<SubmitReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.accept_terms {
        return Err(Error::validation("the terms of use must be accepted").into());
    }
    let body = req.body.trim().to_string();
    if body.is_empty() {
        return Err(Error::validation("the report text must not be empty").into());
    }

    let attachment = resolve_attachment(
        &state.storage,
        req.attachment_id.as_deref(),
        req.audio.as_deref(),
    )
    .await?;

    let db = state.clone();
    let report_body = body.clone();
    let ticket = run_blocking(move || {
        let ticket = db.db.create_ticket(&report_body)?;
        db.db.append_message(
            ticket.id,
            AuthorRole::Reporter,
            Some(&report_body),
            attachment.as_deref(),
        )?;
        Ok(ticket)
    })
    .await?;

    info!("Report filed under protocol {}", ticket.protocol);

    // Best-effort, fully decoupled from the write path.
    state.notifier.ticket_created(&ticket.protocol, &ticket.body);

    Ok((
        StatusCode::CREATED,
        Json(SubmitReportResponse {
            protocol: ticket.protocol,
        }),
    ))
}

/// GET /tickets/{protocol} — resume a conversation. The internal note never
/// appears in this view.
pub async fn resume_ticket(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
    Extension(_current): Extension<CurrentSession>,
) -> Result<Json<ThreadResponse>, ApiError> {
    let db = state.clone();
    let (ticket, messages) = run_blocking(move || {
        let ticket = db.db.ticket_by_protocol(&protocol)?.ok_or(Error::NotFound)?;
        let messages = db.db.messages_for_ticket(ticket.id)?;
        Ok((ticket, messages))
    })
    .await?;

    Ok(Json(ThreadResponse {
        ticket: TicketView::from(&ticket),
        messages,
    }))
}

/// POST /tickets/{protocol}/messages — reporter chat turn.
pub async fn post_message(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
    Extension(_current): Extension<CurrentSession>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let attachment = resolve_attachment(
        &state.storage,
        req.attachment_id.as_deref(),
        req.audio.as_deref(),
    )
    .await?;

    let db = state.clone();
    let message = run_blocking(move || {
        let ticket = db.db.ticket_by_protocol(&protocol)?.ok_or(Error::NotFound)?;
        db.db.append_message(
            ticket.id,
            AuthorRole::Reporter,
            req.text.as_deref(),
            attachment.as_deref(),
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}
