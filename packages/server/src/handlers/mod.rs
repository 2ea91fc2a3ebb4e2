pub mod auth;
pub mod banner;
pub mod embed;
pub mod image;
