use sea_orm::entity::prelude::*;
use sea_orm::prelude::StringLen;
use serde::{Deserialize, Serialize};

/// Where a banner's image came from. Upload-backed banners own a blob in the
/// image store; url-backed banners only reference an external address.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[sea_orm(string_value = "upload")]
    Upload,
    #[sea_orm(string_value = "url")]
    Url,
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "banner")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Exact destination page URL. Not unique: superseded banners stay around
    /// as history; at most one row per url is active (partial unique index,
    /// see seed.rs).
    pub url: String,

    pub image_url: String,
    pub image_type: ImageType,

    pub active: bool,

    /// Optional recurring daily display window, minute granularity.
    pub start_time: Option<Time>,
    pub end_time: Option<Time>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
