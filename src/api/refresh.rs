use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::api::base::{GateError, Result};
use crate::api::oauth2::{OAuth2Config, OAuth2RefreshRequest, OAuth2Token, OAuth2TokenResponse};

/// Obtains a fresh access token when the current one is unusable.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<OAuth2Token>;
}

/// OAuth2 `refresh_token` grant against a token endpoint.
///
/// The stored refresh token is rotated whenever the endpoint issues a new one.
pub struct RefreshTokenGrant {
    client: reqwest::Client,
    config: OAuth2Config,
    refresh_token: Mutex<String>,
}

impl RefreshTokenGrant {
    pub fn new(config: OAuth2Config, refresh_token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), config, refresh_token)
    }

    pub fn with_client(
        client: reqwest::Client,
        config: OAuth2Config,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            refresh_token: Mutex::new(refresh_token.into()),
        }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// The refresh token the next grant will use
    pub async fn current_refresh_token(&self) -> String {
        self.refresh_token.lock().await.clone()
    }
}

#[async_trait]
impl TokenRefresher for RefreshTokenGrant {
    async fn refresh(&self) -> Result<OAuth2Token> {
        let mut refresh_token = self.refresh_token.lock().await;
        let body = OAuth2RefreshRequest::new(&self.config, refresh_token.as_str());

        let resp = self
            .client
            .post(self.config.token_url.clone())
            .form(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                token_url = %self.config.token_url,
                "token endpoint rejected refresh"
            );
            return Err(GateError::TokenEndpoint {
                status: status.as_u16(),
                body: text,
            });
        }

        let token_resp: OAuth2TokenResponse = serde_json::from_str(&text)?;
        // Refresh responses may omit the refresh token; keep the one we sent
        let token = OAuth2Token::from_response(token_resp, Some(refresh_token.as_str()))?;
        if let Some(rotated) = token.refresh_token() {
            if rotated != refresh_token.as_str() {
                tracing::debug!("refresh token rotated by token endpoint");
                *refresh_token = rotated.to_string();
            }
        }
        Ok(token)
    }
}
