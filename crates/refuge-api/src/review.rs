use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use refuge_types::api::{
    DashboardResponse, ReviewThreadResponse, ReviewTicketView, SetNoteRequest, SetStatusRequest,
};
use refuge_types::models::{AuthorRole, ChatMessage, TicketStatus};
use refuge_types::Error;
use tracing::info;

use crate::attachments::resolve_attachment;
use crate::middleware::CurrentSession;
use crate::{run_blocking, ApiError, AppState};

/// GET /review/tickets — every ticket, newest first, with the unread badge
/// counts fetched in one grouped query rather than per ticket.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(_current): Extension<CurrentSession>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let db = state.clone();
    let (tickets, mut unread) = run_blocking(move || {
        let tickets = db.db.list_tickets()?;
        let unread = db.db.unread_counts()?;
        Ok((tickets, unread))
    })
    .await?;

    // tickets without pending messages still get a badge entry
    for ticket in &tickets {
        unread.entry(ticket.protocol.clone()).or_insert(0);
    }

    Ok(Json(DashboardResponse {
        tickets: tickets.iter().map(ReviewTicketView::from).collect(),
        unread,
    }))
}

/// GET /review/tickets/{protocol} — thread detail. Loading the thread marks
/// every pending reporter message as seen in the same operation.
pub async fn ticket_detail(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
    Extension(_current): Extension<CurrentSession>,
) -> Result<Json<ReviewThreadResponse>, ApiError> {
    let db = state.clone();
    let (ticket, messages) = run_blocking(move || {
        let ticket = db.db.ticket_by_protocol(&protocol)?.ok_or(Error::NotFound)?;
        let messages = db.db.open_thread(ticket.id)?;
        Ok((ticket, messages))
    })
    .await?;

    Ok(Json(ReviewThreadResponse {
        ticket: ReviewTicketView::from(&ticket),
        messages,
    }))
}

/// POST /review/tickets/{protocol}/status — any valid status may replace any
/// other; unknown values are rejected without touching the ticket.
pub async fn set_status(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
    Extension(_current): Extension<CurrentSession>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<ReviewTicketView>, ApiError> {
    let status = TicketStatus::from_str(&req.status)?;

    let db = state.clone();
    let ticket = run_blocking(move || {
        let mut ticket = db.db.ticket_by_protocol(&protocol)?.ok_or(Error::NotFound)?;
        db.db.set_status(ticket.id, status)?;
        ticket.status = status;
        Ok(ticket)
    })
    .await?;

    info!("Ticket {} moved to {}", ticket.protocol, ticket.status);
    Ok(Json(ReviewTicketView::from(&ticket)))
}

/// POST /review/tickets/{protocol}/note — internal annotation, invisible to
/// the reporter.
pub async fn set_note(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
    Extension(_current): Extension<CurrentSession>,
    Json(req): Json<SetNoteRequest>,
) -> Result<Json<ReviewTicketView>, ApiError> {
    let db = state.clone();
    let ticket = run_blocking(move || {
        let mut ticket = db.db.ticket_by_protocol(&protocol)?.ok_or(Error::NotFound)?;
        db.db.set_note(ticket.id, &req.note)?;
        ticket.note = Some(req.note);
        Ok(ticket)
    })
    .await?;

    Ok(Json(ReviewTicketView::from(&ticket)))
}

/// POST /review/tickets/{protocol}/messages — reviewer reply. Stays allowed
/// on closed tickets, e.g. to record closure notes.
pub async fn reply(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
    Extension(_current): Extension<CurrentSession>,
    Json(req): Json<refuge_types::api::PostMessageRequest>,
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
            AuthorRole::Reviewer,
            req.text.as_deref(),
            attachment.as_deref(),
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}
