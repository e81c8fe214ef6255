use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::base::{GateError, Result};

/// OAuth2 client configuration for the refresh grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
}

/// Token endpoint response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// A bearer credential issued by this crate.
///
/// Fields are private and there is no `Deserialize` impl, so the only way to
/// obtain one is [`OAuth2Token::new`] or [`OAuth2Token::from_response`]. A
/// structured value that merely carries `access_token`/`expires_at` fields is
/// not an `OAuth2Token` and is never accepted as a usable credential.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuth2Token {
    access_token: String,
    expires_at: i64,
    refresh_token: Option<String>,
    token_type: String,
}

impl OAuth2Token {
    /// Create a token expiring at `expires_at` (Unix seconds)
    pub fn new(access_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            refresh_token: None,
            token_type: default_token_type(),
        }
    }

    /// Create a token from a token endpoint response, anchored at now.
    /// Refresh responses may omit the refresh token, in which case `fallback_refresh` is kept.
    ///
    /// Fails with [`GateError::InvalidTokenResponse`] when `expires_in` does not
    /// fit in a representable expiry.
    pub fn from_response(
        response: OAuth2TokenResponse,
        fallback_refresh: Option<&str>,
    ) -> Result<Self> {
        let expires_at = Utc::now()
            .timestamp()
            .checked_add(response.expires_in)
            .filter(|ts| Utc.timestamp_opt(*ts, 0).single().is_some())
            .ok_or_else(|| {
                GateError::InvalidTokenResponse(format!(
                    "expires_in out of range: {}",
                    response.expires_in
                ))
            })?;

        Ok(Self {
            access_token: response.access_token,
            expires_at,
            refresh_token: response
                .refresh_token
                .or_else(|| fallback_refresh.map(str::to_string)),
            token_type: response.token_type,
        })
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Expiry as Unix seconds
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at, 0).single()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// True once `expires_at` is at or before the current time. Evaluated on every call.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// True when the token expires within `skew` of now (or already has).
    pub fn expires_within(&self, skew: Duration) -> bool {
        self.expires_at <= Utc::now().timestamp().saturating_add(skew.num_seconds())
    }
}

impl fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// OAuth2 refresh request payload (form encoded)
#[derive(Debug, Serialize)]
pub struct OAuth2RefreshRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

impl<'a> OAuth2RefreshRequest<'a> {
    pub fn new(config: &'a OAuth2Config, refresh_token: &'a str) -> Self {
        Self {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &config.client_id,
            client_secret: &config.client_secret,
        }
    }
}

/// Builder for [`OAuth2Config`]
#[derive(Default)]
pub struct OAuth2ConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    token_url: Option<String>,
}

impl OAuth2ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<OAuth2Config> {
        let client_id = self
            .client_id
            .ok_or_else(|| GateError::Config("client_id is required".into()))?;
        let client_secret = self
            .client_secret
            .ok_or_else(|| GateError::Config("client_secret is required".into()))?;
        let token_url = self
            .token_url
            .ok_or_else(|| GateError::Config("token_url is required".into()))?;

        Ok(OAuth2Config {
            client_id,
            client_secret,
            token_url: Url::parse(&token_url)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_math() {
        let now = Utc::now().timestamp();

        assert!(!OAuth2Token::new("ok", now + 3600).is_expired());
        assert!(OAuth2Token::new("old", 0).is_expired());
        assert!(OAuth2Token::new("old", now - 1).is_expired());
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        // expires_at == now counts as expired
        let now = Utc::now().timestamp();
        assert!(OAuth2Token::new("edge", now).is_expired());
    }

    #[test]
    fn test_expires_within_skew() {
        let now = Utc::now().timestamp();
        let t = OAuth2Token::new("t", now + 30);

        assert!(!t.is_expired());
        assert!(t.expires_within(Duration::seconds(60)));
        assert!(!t.expires_within(Duration::seconds(5)));
    }

    #[test]
    fn test_from_response_keeps_fallback_refresh_token() {
        let resp = OAuth2TokenResponse {
            access_token: "a".into(),
            refresh_token: None,
            token_type: "Bearer".into(),
            expires_in: 1200,
        };
        let t = OAuth2Token::from_response(resp, Some("r-old")).unwrap();

        assert_eq!(t.access_token(), "a");
        assert_eq!(t.refresh_token(), Some("r-old"));
        assert!(!t.is_expired());
        let remaining = t.expires_at() - Utc::now().timestamp();
        assert!((1190..=1200).contains(&remaining));
    }

    #[test]
    fn test_from_response_prefers_rotated_refresh_token() {
        let resp = OAuth2TokenResponse {
            access_token: "a".into(),
            refresh_token: Some("r-new".into()),
            token_type: "Bearer".into(),
            expires_in: 60,
        };
        let t = OAuth2Token::from_response(resp, Some("r-old")).unwrap();
        assert_eq!(t.refresh_token(), Some("r-new"));
    }

    #[test]
    fn test_from_response_rejects_out_of_range_expiry() {
        for expires_in in [i64::MAX, i64::MAX / 2, i64::MIN] {
            let resp = OAuth2TokenResponse {
                access_token: "a".into(),
                refresh_token: None,
                token_type: "Bearer".into(),
                expires_in,
            };
            let err = OAuth2Token::from_response(resp, None).unwrap_err();
            assert!(matches!(err, GateError::InvalidTokenResponse(_)));
        }
    }

    #[test]
    fn test_expires_within_huge_skew_does_not_overflow() {
        let t = OAuth2Token::new("t", Utc::now().timestamp() + 3600);
        assert!(t.expires_within(Duration::max_value()));
        assert!(!t.expires_within(Duration::min_value()));
    }

    #[test]
    fn test_token_response_defaults() {
        let resp: OAuth2TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":10}"#).unwrap();
        assert_eq!(resp.token_type, "Bearer");
        assert!(resp.refresh_token.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let t = OAuth2Token::new("super-secret", 0).with_refresh_token("also-secret");
        let out = format!("{:?}", t);
        assert!(!out.contains("super-secret"));
        assert!(!out.contains("also-secret"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn test_refresh_request_serialization() {
        let cfg = OAuth2ConfigBuilder::new()
            .client_id("id")
            .client_secret("sec")
            .token_url("https://auth.example.com/oauth/token")
            .build()
            .unwrap();
        let body = serde_json::to_value(OAuth2RefreshRequest::new(&cfg, "r")).unwrap();

        assert_eq!(body["grant_type"], "refresh_token");
        assert_eq!(body["refresh_token"], "r");
        assert_eq!(body["client_id"], "id");
        assert_eq!(body["client_secret"], "sec");
    }

    #[test]
    fn test_builder_validation() {
        let err = OAuth2ConfigBuilder::new().build().unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("client_id is required"));

        let err = OAuth2ConfigBuilder::new()
            .client_id("id")
            .client_secret("sec")
            .token_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, GateError::Url(_)));
    }
}
