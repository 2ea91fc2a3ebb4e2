use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Local;
use common::schedule;
use common::storage::ContentHash;
use sea_orm::prelude::Expr;
use sea_orm::*;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::banner::{self, ImageType};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AdminUser;
use crate::extractors::json::AppJson;
use crate::models::banner::{
    BannerListResponse, BannerResponse, CreateBannerForm, DeleteResponse, ImageSource,
    LookupQuery, ToggleRequest, validate_create_form,
};
use crate::state::AppState;

/// Headroom for the non-file form fields and multipart framing.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Body cap for the create endpoint, sized from the configured image cap.
pub fn upload_body_limit(max_image_size: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_image_size as usize + MULTIPART_OVERHEAD)
}

#[utoipa::path(
    get,
    path = "/api/v1/banners/lookup",
    tag = "Banners",
    operation_id = "lookupBanner",
    summary = "Resolve the banner for a page",
    description = "Returns the single banner currently eligible for the exact URL, or JSON \
        `null` when there is none, the banner is inactive, or the current time falls outside \
        its display window. Consumed by the embed script from any origin.",
    params(LookupQuery),
    responses(
        (status = 200, description = "Eligible banner, or null", body = Option<BannerResponse>),
        (status = 400, description = "Missing url parameter (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn lookup_banner(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<Option<BannerResponse>>, AppError> {
    let url = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Validation("url parameter is required".into()))?;

    let Some(model) = resolve_active_banner(&state.db, url).await? else {
        return Ok(Json(None));
    };

    // Outside the display window collapses to "no banner", never an error.
    // Server-local clock; the embed script re-checks against the viewer's.
    if !schedule::within_window(model.start_time, model.end_time, Local::now().time()) {
        return Ok(Json(None));
    }

    Ok(Json(Some(BannerResponse::from(model))))
}

/// Pick the single banner eligible for a URL.
///
/// More than one active row can exist only transiently (the activator's
/// deactivate+insert can lose a race before the partial unique index settles
/// it); the newest `created_at` wins, ties broken by id, so every caller
/// observes the same winner.
pub async fn resolve_active_banner<C: ConnectionTrait>(
    db: &C,
    url: &str,
) -> Result<Option<banner::Model>, AppError> {
    let rows = banner::Entity::find()
        .filter(banner::Column::Url.eq(url))
        .filter(banner::Column::Active.eq(true))
        .order_by_desc(banner::Column::CreatedAt)
        .order_by_desc(banner::Column::Id)
        .all(db)
        .await?;

    if rows.len() > 1 {
        tracing::warn!(
            url,
            count = rows.len(),
            "multiple active banners for one url; picking the newest"
        );
    }

    Ok(rows.into_iter().next())
}

#[utoipa::path(
    post,
    path = "/api/v1/banners",
    tag = "Banners",
    operation_id = "createBanner",
    summary = "Create a banner for a URL",
    description = "Creates a banner and makes it the active one for its URL, deactivating any \
        previous holder. Multipart fields: `url`, `image_type` (`upload`|`url`), `image` (file \
        or URL string), optional `start_time`/`end_time` (`HH:MM`).",
    request_body(content_type = "multipart/form-data", description = "Banner form"),
    responses(
        (status = 201, description = "Banner created", body = BannerResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (SESSION_MISSING, SESSION_INVALID)", body = ErrorBody),
        (status = 409, description = "Lost an activation race for this URL (CONFLICT)", body = ErrorBody),
    ),
)]
#[instrument(skip(admin, state, multipart), fields(admin = %admin.username))]
pub async fn create_banner(
    admin: AdminUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = collect_create_form(&state, &mut multipart).await?;
    let req = validate_create_form(form)?;

    let (image_url, image_type, uploaded) = match req.image {
        ImageSource::Upload { bytes, extension } => {
            let stored = state.images.put(&bytes).await?;
            let image_url = format!(
                "{}/api/v1/images/{}.{}",
                state.config.storage.public_base_url.trim_end_matches('/'),
                stored.hash.to_hex(),
                extension,
            );
            // A deduped blob belongs to an existing banner; only a blob this
            // request wrote is ours to remove if the insert fails.
            let owned = stored.newly_written.then_some(stored.hash);
            (image_url, ImageType::Upload, owned)
        }
        ImageSource::External { url } => (url, ImageType::Url, None),
    };

    let now = chrono::Utc::now();
    let model = banner::ActiveModel {
        id: Set(Uuid::now_v7()),
        url: Set(req.url.clone()),
        image_url: Set(image_url),
        image_type: Set(image_type),
        active: Set(true),
        start_time: Set(req.window.map(|(s, _)| s)),
        end_time: Set(req.window.map(|(_, e)| e)),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match insert_as_active(&state.db, &req.url, model).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(BannerResponse::from(created)))),
        Err(err) => {
            // Compensating action: a failed insert must not leave an orphaned
            // blob behind.
            if let Some(hash) = uploaded
                && let Err(del_err) = state.images.delete(&hash).await
            {
                tracing::warn!(
                    hash = %hash,
                    error = %del_err,
                    "failed to clean up uploaded image after insert failure"
                );
            }
            Err(err)
        }
    }
}

/// Deactivate current holders and insert the new active banner in one
/// transaction. A concurrent create for the same url loses on the partial
/// unique index and surfaces as a conflict.
async fn insert_as_active(
    db: &DatabaseConnection,
    url: &str,
    model: banner::ActiveModel,
) -> Result<banner::Model, AppError> {
    let txn = db.begin().await?;

    deactivate_others(&txn, url, None).await?;

    let created = model.insert(&txn).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Another banner was just activated for this URL".into())
        }
        _ => AppError::from(e),
    })?;

    txn.commit().await?;
    Ok(created)
}

/// Mark every active banner for `url` inactive, except `keep`.
async fn deactivate_others<C: ConnectionTrait>(
    db: &C,
    url: &str,
    keep: Option<Uuid>,
) -> Result<u64, AppError> {
    let mut update = banner::Entity::update_many()
        .col_expr(banner::Column::Active, Expr::value(false))
        .col_expr(banner::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(banner::Column::Url.eq(url))
        .filter(banner::Column::Active.eq(true));

    if let Some(id) = keep {
        update = update.filter(banner::Column::Id.ne(id));
    }

    let res = update.exec(db).await?;
    Ok(res.rows_affected)
}

#[utoipa::path(
    patch,
    path = "/api/v1/banners/toggle",
    tag = "Banners",
    operation_id = "toggleBanner",
    summary = "Activate or deactivate a banner",
    description = "Flips a banner's active flag. Activating also deactivates every other \
        banner sharing the same URL, preserving the one-active-banner-per-URL invariant.",
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Updated banner", body = BannerResponse),
        (status = 401, description = "Unauthorized (SESSION_MISSING, SESSION_INVALID)", body = ErrorBody),
        (status = 404, description = "Banner not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(admin, state, payload), fields(admin = %admin.username, banner_id = %payload.id, active = payload.active))]
pub async fn toggle_banner(
    admin: AdminUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ToggleRequest>,
) -> Result<Json<BannerResponse>, AppError> {
    let txn = state.db.begin().await?;

    let model = banner::Entity::find_by_id(payload.id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Banner not found".into()))?;

    if payload.active {
        deactivate_others(&txn, &model.url, Some(model.id)).await?;
    }

    let mut active_model: banner::ActiveModel = model.into();
    active_model.active = Set(payload.active);
    active_model.updated_at = Set(chrono::Utc::now());

    let updated = active_model.update(&txn).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Another banner was just activated for this URL".into())
        }
        _ => AppError::from(e),
    })?;

    txn.commit().await?;
    Ok(Json(BannerResponse::from(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/banners/{id}",
    tag = "Banners",
    operation_id = "deleteBanner",
    summary = "Delete a banner",
    description = "Removes the banner row, then (for upload-backed banners) its image blob. \
        Blob cleanup is best-effort: the row deletion is never rolled back.",
    params(("id" = Uuid, Path, description = "Banner ID")),
    responses(
        (status = 200, description = "Banner deleted", body = DeleteResponse),
        (status = 401, description = "Unauthorized (SESSION_MISSING, SESSION_INVALID)", body = ErrorBody),
        (status = 404, description = "Banner not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(admin, state), fields(admin = %admin.username, banner_id = %id))]
pub async fn delete_banner(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    let model = banner::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Banner not found".into()))?;

    // Row first: a crash after this point leaves at most an orphaned blob,
    // never a surviving row pointing at a missing image.
    banner::Entity::delete_by_id(id).exec(&state.db).await?;

    if model.image_type == ImageType::Upload {
        release_image(&state, &model).await;
    }

    Ok(Json(DeleteResponse {
        message: "Banner deleted".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/banners/all",
    tag = "Banners",
    operation_id = "listBanners",
    summary = "List all banners",
    description = "All banners, newest first, for the admin view.",
    responses(
        (status = 200, description = "Banner list", body = BannerListResponse),
        (status = 401, description = "Unauthorized (SESSION_MISSING, SESSION_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(admin, state), fields(admin = %admin.username))]
pub async fn list_banners(
    admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<BannerListResponse>, AppError> {
    let rows = banner::Entity::find()
        .order_by_desc(banner::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let total = rows.len() as u64;
    let data = rows.into_iter().map(BannerResponse::from).collect();

    Ok(Json(BannerListResponse { data, total }))
}

/// Best-effort blob cleanup for an upload-backed banner. Skipped when another
/// banner still references the same image (content-addressed storage dedups
/// identical uploads across banners).
async fn release_image(state: &AppState, model: &banner::Model) {
    let Some(hash) = image_hash_from_url(&model.image_url) else {
        tracing::warn!(image_url = %model.image_url, "upload banner with unparseable image url");
        return;
    };

    let still_referenced = banner::Entity::find()
        .filter(banner::Column::ImageUrl.eq(&model.image_url))
        .count(&state.db)
        .await;

    match still_referenced {
        Ok(0) => {
            if let Err(e) = state.images.delete(&hash).await {
                tracing::warn!(hash = %hash, error = %e, "failed to delete banner image");
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "skipping image cleanup; reference check failed");
        }
    }
}

/// Extract the content hash from an uploaded banner's
/// `.../api/v1/images/{hash}.{ext}` image URL.
fn image_hash_from_url(image_url: &str) -> Option<ContentHash> {
    let file = image_url.rsplit('/').next()?;
    let stem = file.split('.').next()?;
    ContentHash::from_hex(stem).ok()
}

/// Drain the multipart form into a [`CreateBannerForm`].
async fn collect_create_form(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<CreateBannerForm, AppError> {
    let mut form = CreateBannerForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("url") => form.url = Some(read_text(field).await?),
            Some("image_type") => form.image_type = Some(read_text(field).await?),
            Some("start_time") => {
                let text = read_text(field).await?;
                if !text.trim().is_empty() {
                    form.start_time = Some(text);
                }
            }
            Some("end_time") => {
                let text = read_text(field).await?;
                if !text.trim().is_empty() {
                    form.end_time = Some(text);
                }
            }
            Some("image") => {
                // A file part carries a filename; a bare string is the
                // external image URL.
                if field.file_name().is_some() {
                    form.image_content_type = field.content_type().map(|s| s.to_string());
                    form.image_bytes =
                        Some(read_capped(field, state.config.storage.max_image_size).await?);
                } else {
                    form.image_address = Some(read_text(field).await?);
                }
            }
            _ => {} // Ignore unknown fields.
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read form field: {e}")))
}

async fn read_capped(
    mut field: axum::extract::multipart::Field<'_>,
    max_size: u64,
) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
    {
        if (buf.len() + chunk.len()) as u64 > max_size {
            return Err(AppError::Validation(format!(
                "Image exceeds maximum size of {max_size} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
