use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    /// Origins allowed to call the admin endpoints with credentials.
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Secret used to sign the session cookie.
    pub session_secret: String,
    pub session_ttl_hours: i64,
    /// Admin account bootstrapped on startup when missing.
    pub admin_username: String,
    pub admin_password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub image_dir: PathBuf,
    pub max_image_size: u64,
    /// Origin baked into uploaded banners' `image_url` (the address third-party
    /// pages fetch images from).
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("auth.session_ttl_hours", 24 * 7)?
            .set_default("storage.image_dir", "./data/images")?
            .set_default("storage.max_image_size", 8 * 1024 * 1024)?
            .set_default("storage.public_base_url", "http://127.0.0.1:3000")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., MAGIC_BANNER__AUTH__SESSION_SECRET)
            .add_source(Environment::with_prefix("MAGIC_BANNER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
