pub mod hash;
pub mod session;
