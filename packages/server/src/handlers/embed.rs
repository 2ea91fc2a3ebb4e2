use axum::http::header;
use axum::response::IntoResponse;
use tracing::instrument;

const EMBED_SCRIPT: &str = include_str!("../../assets/embed.js");

#[utoipa::path(
    get,
    path = "/embed.js",
    tag = "Embed",
    operation_id = "embedScript",
    summary = "Banner embed script",
    description = "Drop-in script for third-party pages. It derives the API base from its own \
        `src`, looks up the banner for the current page, and injects it when one is eligible.",
    responses((status = 200, description = "JavaScript source", content_type = "application/javascript")),
)]
#[instrument]
pub async fn embed_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        EMBED_SCRIPT,
    )
}
