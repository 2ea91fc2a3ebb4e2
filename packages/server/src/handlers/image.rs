use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::storage::ContentHash;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/images/{file}",
    tag = "Images",
    operation_id = "serveImage",
    summary = "Serve an uploaded banner image",
    description = "Streams an image blob by its content-addressed name (`{sha256}.{ext}`). \
        Immutable content, so the ETag is the hash itself.",
    params(("file" = String, Path, description = "Image file name, `{sha256}.{ext}`")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 304, description = "Not modified"),
        (status = 404, description = "Unknown image (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers))]
pub async fn serve_image(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (stem, ext) = file
        .split_once('.')
        .ok_or_else(|| AppError::NotFound("Image not found".into()))?;
    let hash = ContentHash::from_hex(stem)
        .map_err(|_| AppError::NotFound("Image not found".into()))?;

    // Content-addressed blobs never change, so the hash is the ETag.
    let etag = format!("\"{}\"", hash.to_hex());
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && if_none_match.to_str().is_ok_and(|v| v == etag)
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let len = state.images.len(&hash).await?;
    let reader = state.images.open(&hash).await?;

    let content_type = mime_guess::from_ext(ext).first_or_octet_stream();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, len)
        .header(header::ETAG, etag)
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build image response: {e}")))?;

    Ok(response)
}
