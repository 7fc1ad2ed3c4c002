use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use refuge_store::Storage;
use refuge_types::Error;
use serde::{Deserialize, Serialize};

use crate::middleware::CurrentSession;
use crate::{ApiError, AppState};

/// 10 MB upload limit for attachments
pub const MAX_ATTACHMENT_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Only the extension is taken from this; the stored name is generated.
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub attachment_id: String,
    pub size: u64,
}

/// POST /attachments?filename= — accepts raw bytes, stores them under an
/// opaque handle, returns the handle for a later chat turn to reference.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    Extension(_current): Extension<CurrentSession>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.len() > MAX_ATTACHMENT_SIZE {
        return Err(Error::validation("attachment exceeds the 10 MB limit").into());
    }

    let ext = query
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .ok_or_else(|| Error::validation("filename needs an extension"))?;

    let handle = state.storage.store(&bytes, ext).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            attachment_id: handle,
            size: bytes.len() as u64,
        }),
    ))
}

/// GET /attachments/{handle} — serves a blob back by handle only.
pub async fn download(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Extension(_current): Extension<CurrentSession>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.storage.read(&handle).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

/// Resolve the attachment parts of a chat-turn request to a stored handle.
/// Inline audio wins over a previously uploaded handle when both are sent.
pub(crate) async fn resolve_attachment(
    storage: &Storage,
    attachment_id: Option<&str>,
    audio: Option<&str>,
) -> Result<Option<String>, Error> {
    if let Some(uri) = audio {
        return Ok(Some(storage.store_audio_data_uri(uri).await?));
    }

    if let Some(handle) = attachment_id {
        if !storage.exists(handle).await? {
            return Err(Error::validation("unknown attachment reference"));
        }
        return Ok(Some(handle.to_string()));
    }

    Ok(None)
}
