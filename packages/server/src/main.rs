use std::net::SocketAddr;
use std::sync::Arc;

use common::storage::FilesystemImageStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::config::AppConfig;
use server::database::init_db;
use server::state::AppState;
use server::{build_router, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    let db = init_db(&config.database.url).await?;
    seed::ensure_indexes(&db).await?;
    seed::ensure_admin_user(&db, &config.auth).await?;

    let images = Arc::new(
        FilesystemImageStore::new(
            config.storage.image_dir.clone(),
            config.storage.max_image_size,
        )
        .await?,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState { db, images, config };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
