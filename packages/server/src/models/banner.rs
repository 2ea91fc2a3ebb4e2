use chrono::{DateTime, NaiveTime, Utc};
use common::schedule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::banner::{self, ImageType};
use crate::error::AppError;

/// Raster image content types accepted for uploads, with the file extension
/// used in the stored `image_url`.
pub const ALLOWED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

#[derive(Deserialize, utoipa::IntoParams)]
pub struct LookupQuery {
    /// Exact destination page URL.
    pub url: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ToggleRequest {
    pub id: Uuid,
    pub active: bool,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct BannerResponse {
    pub id: Uuid,
    pub url: String,
    pub image_url: String,
    pub image_type: ImageType,
    pub active: bool,
    /// `HH:MM`, when a display window is set.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<banner::Model> for BannerResponse {
    fn from(m: banner::Model) -> Self {
        Self {
            id: m.id,
            url: m.url,
            image_url: m.image_url,
            image_type: m.image_type,
            active: m.active,
            start_time: m.start_time.map(schedule::format_hhmm),
            end_time: m.end_time.map(schedule::format_hhmm),
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct BannerListResponse {
    pub data: Vec<BannerResponse>,
    pub total: u64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DeleteResponse {
    pub message: String,
}

/// Raw fields collected from the multipart create form.
#[derive(Default)]
pub struct CreateBannerForm {
    pub url: Option<String>,
    pub image_type: Option<String>,
    /// Text `image` field (image_type = url).
    pub image_address: Option<String>,
    /// File `image` field (image_type = upload).
    pub image_bytes: Option<Vec<u8>>,
    pub image_content_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Validated create request, ready for the activator.
pub struct CreateBanner {
    pub url: String,
    pub image: ImageSource,
    pub window: Option<(NaiveTime, NaiveTime)>,
}

pub enum ImageSource {
    Upload { bytes: Vec<u8>, extension: &'static str },
    External { url: String },
}

pub fn validate_create_form(form: CreateBannerForm) -> Result<CreateBanner, AppError> {
    let url = form
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Validation("url is required".into()))?;
    validate_destination_url(url)?;

    let image = match form.image_type.as_deref() {
        Some("upload") => {
            let bytes = form
                .image_bytes
                .filter(|b| !b.is_empty())
                .ok_or_else(|| AppError::Validation("Image file is required".into()))?;
            let content_type = form.image_content_type.as_deref().unwrap_or("");
            let extension = ALLOWED_IMAGE_TYPES
                .iter()
                .find(|(mime, _)| mime.eq_ignore_ascii_case(content_type))
                .map(|(_, ext)| *ext)
                .ok_or_else(|| {
                    AppError::Validation(
                        "Invalid image type. Accepted: jpg, png, gif, webp".into(),
                    )
                })?;
            ImageSource::Upload { bytes, extension }
        }
        Some("url") => {
            let address = form
                .image_address
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| AppError::Validation("Image URL is required".into()))?;
            ImageSource::External {
                url: address.to_string(),
            }
        }
        _ => {
            return Err(AppError::Validation(
                "image_type must be 'upload' or 'url'".into(),
            ));
        }
    };

    let window = parse_window(form.start_time.as_deref(), form.end_time.as_deref())?;

    Ok(CreateBanner {
        url: url.to_string(),
        image,
        window,
    })
}

/// A display window takes both bounds or neither.
fn parse_window(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(NaiveTime, NaiveTime)>, AppError> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => {
            let start = schedule::parse_hhmm(start)
                .map_err(|e| AppError::Validation(e.to_string()))?;
            let end =
                schedule::parse_hhmm(end).map_err(|e| AppError::Validation(e.to_string()))?;
            Ok(Some((start, end)))
        }
        _ => Err(AppError::Validation(
            "start_time and end_time must be provided together".into(),
        )),
    }
}

fn validate_destination_url(url: &str) -> Result<(), AppError> {
    let is_http = url.starts_with("http://") || url.starts_with("https://");
    if !is_http || url.len() > 2048 || url.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(
            "url must be an absolute http(s) URL".into(),
        ));
    }
    Ok(())
}
