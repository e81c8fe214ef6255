pub mod api;
pub mod client;

pub use api::auth::TokenSlot;
pub use api::base::{GateError, Result};
pub use api::oauth2::{OAuth2Config, OAuth2ConfigBuilder, OAuth2Token};
pub use api::refresh::{RefreshTokenGrant, TokenRefresher};
pub use api::transport::{OutgoingRequest, ReqwestTransport, Transport, TransportResponse};
pub use client::{ApiClient, ApiClientBuilder, RequestOptions};
pub use reqwest::Method;
