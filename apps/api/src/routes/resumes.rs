use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::{CacheEntry, CacheSource, Fingerprint, ReadError, SweepReport};
use crate::errors::AppError;
use crate::models::resume::ParsedResume;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub fingerprint: Fingerprint,
    pub cache_hit: bool,
    pub source: CacheSource,
    /// False when the parse came back without usable contact details; the
    /// client should ask for a better file.
    pub stored: bool,
    pub structured_resume: ParsedResume,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub deleted: usize,
}

struct Upload {
    owner_id: Uuid,
    content_type: String,
    bytes: Bytes,
}

/// Reads the `owner_id` and `file` parts of a multipart upload.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, AppError> {
    let mut owner_id = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("owner_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable owner_id: {e}")))?;
                owner_id = Some(
                    Uuid::parse_str(raw.trim())
                        .map_err(|_| AppError::Validation("owner_id must be a UUID".to_string()))?,
                );
            }
            Some("file") => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ReadError::Io(std::io::Error::other(e.to_string())))?;
                file = Some((content_type, bytes));
            }
            _ => {}
        }
    }

    let owner_id = owner_id.ok_or_else(|| AppError::Validation("owner_id is required".to_string()))?;
    let (content_type, bytes) =
        file.ok_or_else(|| AppError::Validation("file is required".to_string()))?;
    Ok(Upload {
        owner_id,
        content_type,
        bytes,
    })
}

fn parse_fingerprint(raw: &str) -> Result<Fingerprint, AppError> {
    Fingerprint::parse(raw)
        .ok_or_else(|| AppError::Validation("fingerprint must be a SHA-256 hex digest".to_string()))
}

/// POST /api/v1/resumes/parse
pub async fn handle_parse(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ParseResponse>, AppError> {
    let Upload {
        owner_id,
        content_type,
        bytes,
    } = read_upload(&mut multipart).await?;

    let parser = state.parser.clone();
    let outcome = state
        .cache
        .get_or_compute(bytes, owner_id, move |bytes| async move {
            parser.parse(bytes, &content_type).await
        })
        .await?;

    Ok(Json(ParseResponse {
        cache_hit: outcome.cache_hit(),
        fingerprint: outcome.fingerprint,
        source: outcome.source,
        stored: outcome.stored,
        structured_resume: outcome.result,
    }))
}

/// GET /api/v1/resumes/cache/:fingerprint
pub async fn handle_get_cached(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<CacheEntry>, AppError> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    state
        .cache
        .lookup(&fingerprint)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No cached parse for {fingerprint}")))
}

/// DELETE /api/v1/resumes/cache/:fingerprint
pub async fn handle_invalidate(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<StatusCode, AppError> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    state.cache.invalidate(&fingerprint).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/users/:owner_id/resume-cache
pub async fn handle_purge_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<PurgeResponse>, AppError> {
    let deleted = state.cache.invalidate_all_for_owner(owner_id).await?;
    Ok(Json(PurgeResponse { deleted }))
}

/// POST /api/v1/admin/cache/sweep
pub async fn handle_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    Ok(Json(state.sweep.run().await?))
}
