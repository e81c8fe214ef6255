pub mod auth;
pub mod base;
pub mod oauth2;
pub mod refresh;
pub mod transport;
