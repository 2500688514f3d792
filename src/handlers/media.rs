use crate::api::error::ApiError;
use crate::middleware::auth::AdminUser;
use crate::services::registry::{NewMediaFile, NewMediaItem};
use crate::services::storage::{self, LOCAL_FILE_ENGINE, StorageError};
use crate::utils::slug;
use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Header carrying the single-use upload token in phase 3.
pub const UPLOAD_TOKEN_HEADER: &str = "X-Upload-Token";
/// Header carrying the declared filename in phase 3.
pub const FILE_NAME_HEADER: &str = "X-File-Name";

const INVALID_META_MESSAGE: &str = "Invalid JSON object given for `meta`";

#[derive(Deserialize, ToSchema)]
pub struct CreateMediaRequest {
    pub title: String,
    pub author_email: Option<String>,
    pub author_name: Option<String>,
    pub slug: Option<String>,
    /// Comma-separated tag names
    pub tags: Option<String>,
    pub podcast_id: Option<i64>,
    /// Comma-separated category ids
    pub category_ids: Option<String>,
    /// JSON object, sent as a string
    pub meta: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateMediaResponse {
    pub success: bool,
    pub id: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct PrepareUploadRequest {
    pub content_type: String,
    pub filename: String,
    /// Declared size in bytes; advisory, not verified against the stream
    pub filesize: i64,
    /// JSON object, sent as a string
    pub meta: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadHeaders {
    #[serde(rename = "Content-Type")]
    pub content_type: String,
    #[serde(rename = "Cache-Control")]
    pub cache_control: String,
    #[serde(rename = "X-File-Name")]
    pub file_name: String,
    #[serde(rename = "X-Upload-Token")]
    pub upload_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct PrepareUploadResponse {
    pub success: bool,
    pub id: i64,
    pub upload_url: String,
    pub upload_headers: UploadHeaders,
    pub postprocess_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct AckResponse {
    pub success: bool,
}

/// Client-correctable input errors come back as a normal 200 body, not a
/// protocol error.
fn soft_failure(message: &str) -> Response {
    Json(json!({ "success": false, "message": message })).into_response()
}

/// `meta` must be a JSON object when present. Returns the canonical
/// stored form, or Err for the soft-failure path.
fn validate_meta(meta: Option<&str>) -> Result<Option<String>, ()> {
    match meta.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => {
            match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
                Ok(_) => Ok(Some(raw.to_string())),
                Err(_) => Err(()),
            }
        }
    }
}

/// Normalize a comma-separated list into a JSON array of trimmed,
/// non-empty strings.
fn normalize_tags(raw: Option<&str>) -> Option<String> {
    let items: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        None
    } else {
        serde_json::to_string(&items).ok()
    }
}

/// Normalize a comma-separated list of category ids into a JSON array of
/// integers, dropping entries that do not parse.
fn normalize_category_ids(raw: Option<&str>) -> Option<String> {
    let ids: Vec<i64> = raw?
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if ids.is_empty() {
        None
    } else {
        serde_json::to_string(&ids).ok()
    }
}

/// Phase 1: register a media item.
#[utoipa::path(
    post,
    path = "/api/media",
    request_body = CreateMediaRequest,
    responses(
        (status = 200, description = "Media item created (or soft validation failure)", body = CreateMediaResponse),
        (status = 401, description = "Missing or invalid admin credentials"),
        (status = 422, description = "Missing required field")
    ),
    security(("basic" = [])),
    tag = "media"
)]
pub async fn create_media_item(
    State(state): State<crate::AppState>,
    Extension(admin): Extension<AdminUser>,
    Json(req): Json<CreateMediaRequest>,
) -> Result<Response, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("`title` must not be empty".to_string()));
    }

    // Validate-then-mutate: meta is checked before anything persists, so
    // a malformed object never leaves a partial media item behind.
    let meta = match validate_meta(req.meta.as_deref()) {
        Ok(meta) => meta,
        Err(()) => return Ok(soft_failure(INVALID_META_MESSAGE)),
    };

    let candidate = match req.slug.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => slug::slugify(slug::strip_stub_prefix(s)),
        _ => slug::slugify(title),
    };
    let slug = state.registry.available_slug(&candidate).await?;

    let item = NewMediaItem {
        title: title.to_string(),
        slug,
        author_name: req
            .author_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "No Author".to_string()),
        author_email: req
            .author_email
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "No Email".to_string()),
        // 0 is the "no podcast" sentinel; real podcast ids start at 1.
        podcast_id: req.podcast_id.filter(|id| *id > 0),
        tags: normalize_tags(req.tags.as_deref()),
        category_ids: normalize_category_ids(req.category_ids.as_deref()),
        meta,
    };

    let id = state.registry.create_media(&item).await?;
    tracing::info!("createMediaItem(\"{}\") -> media {} by {}", title, id, admin.username);

    Ok(Json(CreateMediaResponse { success: true, id }).into_response())
}

/// Phase 2: register a pending file and issue its upload token.
#[utoipa::path(
    post,
    path = "/api/media/{media_id}/files",
    params(("media_id" = i64, Path, description = "Media item id")),
    request_body = PrepareUploadRequest,
    responses(
        (status = 200, description = "Transfer instructions (or soft validation failure)", body = PrepareUploadResponse),
        (status = 401, description = "Missing or invalid admin credentials"),
        (status = 404, description = "Media item not found"),
        (status = 503, description = "No enabled storage engine")
    ),
    security(("basic" = [])),
    tag = "media"
)]
pub async fn prepare_for_upload(
    State(state): State<crate::AppState>,
    Extension(_admin): Extension<AdminUser>,
    Path(media_id): Path<i64>,
    Json(req): Json<PrepareUploadRequest>,
) -> Result<Response, ApiError> {
    tracing::info!(
        "prepareForUpload({},{},{},{})",
        media_id,
        req.content_type,
        req.filename,
        req.filesize
    );

    let meta = match validate_meta(req.meta.as_deref()) {
        Ok(meta) => meta,
        Err(()) => return Ok(soft_failure(INVALID_META_MESSAGE)),
    };

    let media = state
        .registry
        .fetch_media(media_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("media {} not found", media_id)))?;

    let (engine_id, _engine) = storage::find_enabled_engine(&state.db, LOCAL_FILE_ENGINE)
        .await?
        .ok_or(ApiError::NoStorageEngine)?;

    let file_id = state
        .registry
        .create_file(&NewMediaFile {
            media_id: media.id,
            content_type: req.content_type.clone(),
            display_name: req.filename.clone(),
            size: req.filesize,
            meta,
            storage_engine_id: engine_id,
        })
        .await?;
    state.registry.set_media_type(media.id, &req.content_type).await?;

    let token = state
        .tokens
        .issue(file_id)
        .await
        .map_err(|e| ApiError::StorageUnavailable(e.to_string()))?;

    let base = state.config.public_base_url.trim_end_matches('/');
    Ok(Json(PrepareUploadResponse {
        success: true,
        id: file_id,
        upload_url: format!("{}/api/media/{}/files/{}/content", base, media_id, file_id),
        upload_headers: UploadHeaders {
            content_type: "application/octet-stream".to_string(),
            cache_control: "none".to_string(),
            file_name: req.filename,
            upload_token: token,
        },
        postprocess_url: format!("{}/api/media/{}/files/{}/postprocess", base, media_id, file_id),
    })
    .into_response())
}

/// Phase 3: raw byte transfer, authorized solely by the upload token.
#[utoipa::path(
    post,
    path = "/api/media/{media_id}/files/{file_id}/content",
    params(
        ("media_id" = i64, Path, description = "Media item id"),
        ("file_id" = i64, Path, description = "Pending file id"),
        ("X-Upload-Token" = String, Header, description = "Single-use upload token"),
        ("X-File-Name" = String, Header, description = "Declared filename")
    ),
    request_body(content = Vec<u8>, description = "Raw file bytes", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Bytes stored", body = AckResponse),
        (status = 403, description = "Missing, unknown or already-consumed upload token"),
        (status = 404, description = "Media item or file not found")
    ),
    tag = "media"
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    Path((media_id, file_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    tracing::info!("uploadFile({},{})", media_id, file_id);

    let presented = headers
        .get(UPLOAD_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Forbidden)?;

    // Reject before any of the body is consumed.
    match state
        .tokens
        .peek(file_id)
        .await
        .map_err(|e| ApiError::StorageUnavailable(e.to_string()))?
    {
        Some(expected) if expected == presented => {}
        _ => return Err(ApiError::Forbidden),
    }

    if let Some(declared) = headers.get(FILE_NAME_HEADER).and_then(|v| v.to_str().ok()) {
        tracing::debug!("uploadFile({},{}) declared name {}", media_id, file_id, declared);
    }

    let media = state
        .registry
        .fetch_media(media_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("media {} not found", media_id)))?;
    let file = state
        .registry
        .fetch_file(file_id)
        .await?
        .filter(|f| f.media_id == media.id)
        .ok_or_else(|| ApiError::NotFound(format!("file {} not found", file_id)))?;

    let (_, engine) = storage::find_enabled_engine(&state.db, LOCAL_FILE_ENGINE)
        .await?
        .ok_or(ApiError::NoStorageEngine)?;

    let stream = body
        .into_data_stream()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));
    let reader = StreamReader::new(stream);

    // On store failure the token is left alive, so a client whose
    // connection dropped mid-stream gets one legitimate retry.
    let unique_id = engine
        .store(&file, Box::pin(reader))
        .await
        .map_err(|e| ApiError::StoreFailed(e.to_string()))?;

    // The conditional delete is the race arbiter: of two transfers that
    // both passed the peek above, only one consumes the token.
    if !state
        .tokens
        .consume(file_id, presented)
        .await
        .map_err(|e| ApiError::StorageUnavailable(e.to_string()))?
    {
        return Err(ApiError::Forbidden);
    }

    if let Err(e) = engine.transcode(&file).await {
        match e {
            StorageError::Unsupported => tracing::debug!(
                "Engine {} unsuitable for transcoding file {}",
                engine.engine_type(),
                file.id
            ),
            other => tracing::warn!("Transcoding file {} failed: {}", file.id, other),
        }
    }

    let container = std::path::Path::new(&file.display_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_string());
    let unique_id = Some(unique_id).filter(|id| !id.is_empty());
    state
        .registry
        .record_transfer(file.id, container.as_deref(), unique_id.as_deref())
        .await?;

    Ok(Json(AckResponse { success: true }).into_response())
}

/// Phase 4: terminal acknowledgment hook for external collaborators.
#[utoipa::path(
    put,
    path = "/api/media/{media_id}/files/{file_id}/postprocess",
    params(
        ("media_id" = i64, Path, description = "Media item id"),
        ("file_id" = i64, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "Acknowledged", body = AckResponse),
        (status = 401, description = "Missing or invalid admin credentials"),
        (status = 404, description = "Media item or file not found")
    ),
    security(("basic" = [])),
    tag = "media"
)]
pub async fn postprocess_file(
    State(state): State<crate::AppState>,
    Extension(_admin): Extension<AdminUser>,
    Path((media_id, file_id)): Path<(i64, i64)>,
) -> Result<Json<AckResponse>, ApiError> {
    tracing::info!("postprocessFile({},{})", media_id, file_id);

    let media = state
        .registry
        .fetch_media(media_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("media {} not found", media_id)))?;
    state
        .registry
        .fetch_file(file_id)
        .await?
        .filter(|f| f.media_id == media.id)
        .ok_or_else(|| ApiError::NotFound(format!("file {} not found", file_id)))?;

    Ok(Json(AckResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_meta() {
        assert_eq!(validate_meta(None), Ok(None));
        assert_eq!(validate_meta(Some("")), Ok(None));
        assert_eq!(
            validate_meta(Some(r#"{"camera":"A"}"#)),
            Ok(Some(r#"{"camera":"A"}"#.to_string()))
        );
        assert_eq!(validate_meta(Some("not json")), Err(()));
        // Valid JSON but not an object is still rejected.
        assert_eq!(validate_meta(Some("[1,2,3]")), Err(()));
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(normalize_tags(None), None);
        assert_eq!(normalize_tags(Some(" , ,")), None);
        assert_eq!(
            normalize_tags(Some("rust, media ,upload")),
            Some(r#"["rust","media","upload"]"#.to_string())
        );
    }

    #[test]
    fn test_normalize_category_ids() {
        assert_eq!(normalize_category_ids(None), None);
        assert_eq!(normalize_category_ids(Some("x,y")), None);
        assert_eq!(
            normalize_category_ids(Some("3, 7, junk, 9")),
            Some("[3,7,9]".to_string())
        );
    }
}
