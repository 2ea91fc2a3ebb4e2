use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> Router<AppState> {
    public_routes().merge(admin_routes(config))
}

/// Routes the embed script hits from arbitrary third-party origins.
fn public_routes() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/banners/lookup", get(handlers::banner::lookup_banner))
        .route("/images/{file}", get(handlers::image::serve_image))
        .layer(cors)
}

/// Session-cookie routes for the admin UI, restricted to configured origins.
fn admin_routes(config: &AppConfig) -> Router<AppState> {
    let banners = Router::new()
        .route(
            "/banners",
            post(handlers::banner::create_banner)
                .layer(handlers::banner::upload_body_limit(config.storage.max_image_size)),
        )
        .route("/banners/all", get(handlers::banner::list_banners))
        .route("/banners/toggle", patch(handlers::banner::toggle_banner))
        .route("/banners/{id}", delete(handlers::banner::delete_banner));

    let auth = Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::auth::me));

    banners
        .nest("/auth", auth)
        .layer(admin_cors(config))
}

fn admin_cors(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors
        .allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(config.server.cors.max_age))
}
