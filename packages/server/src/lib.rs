pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod seed;
pub mod state;
pub mod utils;

use axum::routing::get;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable as ScalarServable};
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Magic Banner API",
        version = "1.0.0",
        description = "Promotional banner service: one active banner per destination URL, \
            optionally time-boxed, served to third-party pages via an embed script"
    ),
    paths(
        handlers::banner::lookup_banner,
        handlers::banner::create_banner,
        handlers::banner::toggle_banner,
        handlers::banner::delete_banner,
        handlers::banner::list_banners,
        handlers::image::serve_image,
        handlers::embed::embed_script,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::me,
    ),
    tags(
        (name = "Banners", description = "Banner registration and lookup"),
        (name = "Images", description = "Uploaded banner image delivery"),
        (name = "Embed", description = "Third-party embed script"),
        (name = "Auth", description = "Admin session management"),
    ),
)]
struct ApiDoc;

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let api = ApiDoc::openapi();

    axum::Router::new()
        .nest("/api", routes::api_routes(&state.config))
        .route("/embed.js", get(handlers::embed::embed_script))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api.clone()))
        .merge(Scalar::with_url("/scalar", api))
}
