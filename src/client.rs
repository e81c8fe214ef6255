use std::sync::Arc;

use chrono::Duration;
use reqwest::header::{self, HeaderMap};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::api::auth::{bearer_header, TokenSlot};
use crate::api::base::{GateError, Result};
use crate::api::oauth2::OAuth2Token;
use crate::api::refresh::TokenRefresher;
use crate::api::transport::{OutgoingRequest, ReqwestTransport, Transport, TransportResponse};

/// Largest early-refresh margin accepted by [`ApiClientBuilder::expiry_skew`] (one day)
pub const MAX_EXPIRY_SKEW_SECS: i64 = 24 * 60 * 60;

/// Per-request options for [`ApiClient::request`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Attach a bearer credential, refreshing the token first if it is unusable
    pub api: bool,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestOptions {
    /// Options for an authenticated API call
    pub fn api() -> Self {
        Self {
            api: true,
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<P: Serialize>(self, payload: &P) -> Result<Self> {
        Ok(self.body(serde_json::to_string(payload)?))
    }
}

/// HTTP client that gates authenticated requests on a usable bearer token.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    refresher: Arc<dyn TokenRefresher>,
    token: RwLock<TokenSlot>,
    refresh_lock: Mutex<()>,
    expiry_skew: Duration,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            transport,
            refresher,
            token: RwLock::new(TokenSlot::Empty),
            refresh_lock: Mutex::new(()),
            expiry_skew: Duration::zero(),
        }
    }

    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Snapshot of the token holder
    pub async fn token(&self) -> TokenSlot {
        self.token.read().await.clone()
    }

    /// Replace the token holder. Accepts an [`OAuth2Token`], an `Option` of one,
    /// or an arbitrary `serde_json::Value` (which is never treated as usable).
    pub async fn set_token(&self, token: impl Into<TokenSlot>) {
        *self.token.write().await = token.into();
    }

    pub async fn clear_token(&self) {
        *self.token.write().await = TokenSlot::Empty;
    }

    /// Return a usable token, refreshing if the holder is empty, foreign or expired.
    async fn ensure_valid_token(&self) -> Result<OAuth2Token> {
        // Fast path without lock
        if let Some(token) = self.token.read().await.usable(self.expiry_skew) {
            return Ok(token.clone());
        }

        // Serialize refresh under lock
        let _lock = self.refresh_lock.lock().await;
        // Recheck after acquiring the lock, another request may have refreshed already
        let kind = {
            let guard = self.token.read().await;
            if let Some(token) = guard.usable(self.expiry_skew) {
                return Ok(token.clone());
            }
            guard.kind()
        };

        tracing::info!(holder = kind, "Refreshing OAuth2 access token");
        let new_token = match self.refresher.refresh().await {
            Ok(token) => token,
            Err(err) => {
                tracing::error!(error = %err, "OAuth2 token refresh failed");
                return Err(GateError::authentication_unavailable(err));
            }
        };
        *self.token.write().await = TokenSlot::Issued(new_token.clone());
        tracing::info!(expires_at = new_token.expires_at(), "OAuth2 access token refreshed");

        Ok(new_token)
    }

    /// Dispatch a request through the transport.
    ///
    /// With `api: true` a bearer `Authorization` header is attached, refreshing
    /// the token first when it is unusable. Otherwise the header is absent,
    /// whatever the holder contains. The transport response is returned unchanged.
    pub async fn request(
        &self,
        method: Method,
        resource: impl AsRef<str>,
        options: impl Into<Option<RequestOptions>>,
    ) -> Result<TransportResponse> {
        let options = options.into().unwrap_or_default();
        let resource = resource.as_ref();

        let mut outgoing = OutgoingRequest::new(method, resource);
        outgoing.headers = options.headers;
        outgoing.query = options.query;
        outgoing.body = options.body;

        if options.api {
            let token = self.ensure_valid_token().await?;
            outgoing
                .headers
                .insert(header::AUTHORIZATION, bearer_header(&token)?);
        } else if outgoing.headers.remove(header::AUTHORIZATION).is_some() {
            tracing::debug!(resource, "dropping caller Authorization header on non-api request");
        }

        tracing::debug!(
            method = %outgoing.method,
            resource,
            authenticated = options.api,
            "dispatching request"
        );
        let response = self.transport.send(outgoing).await?;
        tracing::debug!(resource, status = response.status.as_u16(), "request completed");

        Ok(response)
    }

    pub async fn get_with_query<T, U>(&self, url: U, query: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned,
        U: AsRef<str>,
    {
        let mut options = RequestOptions::api();
        for (k, v) in query {
            options = options.query(*k, *v);
        }
        let response = self.request(Method::GET, url.as_ref(), options).await?;
        Self::decode(url.as_ref(), response)
    }

    pub async fn get<T: DeserializeOwned, U: AsRef<str>>(&self, url: U) -> Result<T> {
        self.get_with_query(url, &[]).await
    }

    pub async fn post<R, P, U>(&self, url: U, payload: P) -> Result<R>
    where
        R: DeserializeOwned,
        P: Serialize,
        U: AsRef<str>,
    {
        let options = RequestOptions::api().json(&payload)?;
        let response = self.request(Method::POST, url.as_ref(), options).await?;
        Self::decode(url.as_ref(), response)
    }

    pub async fn delete<R, U>(&self, url: U) -> Result<R>
    where
        R: DeserializeOwned,
        U: AsRef<str>,
    {
        let response = self
            .request(Method::DELETE, url.as_ref(), RequestOptions::api())
            .await?;
        Self::decode(url.as_ref(), response)
    }

    fn decode<T: DeserializeOwned>(url: &str, response: TransportResponse) -> Result<T> {
        let status = response.status;
        if !status.is_success() {
            tracing::warn!(
                status = %status,
                url = %url,
                body = %response.body,
                "received non-success HTTP status"
            );
            return Err(GateError::UnexpectedResponse {
                status: status.as_u16(),
                body: response.body,
            });
        }

        match serde_json::from_str(&response.body) {
            Ok(parsed) => Ok(parsed),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "failed to parse response for {} (status {}): {}",
                    url,
                    status,
                    response.body
                );
                Err(err.into())
            }
        }
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    token: TokenSlot,
    expiry_skew: Option<Duration>,
}

impl ApiClientBuilder {
    /// Base URL for the default reqwest transport; ignored when a transport is set
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Initial token holder value
    pub fn token(mut self, token: impl Into<TokenSlot>) -> Self {
        self.token = token.into();
        self
    }

    /// Refresh tokens this long before they actually expire
    pub fn expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = Some(skew);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let refresher = self
            .refresher
            .ok_or_else(|| GateError::Config("refresher is required".into()))?;
        let transport: Arc<dyn Transport> = match (self.transport, self.base_url) {
            (Some(transport), _) => transport,
            (None, Some(base_url)) => Arc::new(ReqwestTransport::new(Url::parse(&base_url)?)?),
            (None, None) => {
                return Err(GateError::Config(
                    "either transport or base_url is required".into(),
                ))
            }
        };
        let expiry_skew = self.expiry_skew.unwrap_or_else(Duration::zero);
        if expiry_skew < Duration::zero() {
            return Err(GateError::Config("expiry_skew must not be negative".into()));
        }
        if expiry_skew > Duration::seconds(MAX_EXPIRY_SKEW_SECS) {
            return Err(GateError::Config(format!(
                "expiry_skew must not exceed {MAX_EXPIRY_SKEW_SECS} seconds"
            )));
        }

        Ok(ApiClient {
            transport,
            refresher,
            token: RwLock::new(self.token),
            refresh_lock: Mutex::new(()),
            expiry_skew,
        })
    }
}
