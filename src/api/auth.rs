use chrono::Duration;
use reqwest::header::HeaderValue;

use crate::api::base::{GateError, Result};
use crate::api::oauth2::OAuth2Token;

/// Current value of the client's token holder
#[derive(Debug, Clone, Default)]
pub enum TokenSlot {
    /// No token has been set or obtained yet
    #[default]
    Empty,
    /// A token produced by [`OAuth2Token::new`] or a refresh
    Issued(OAuth2Token),
    /// A structured value assigned from outside, never trusted as a credential
    Foreign(serde_json::Value),
}

impl TokenSlot {
    /// The issued token, if it is usable right now.
    ///
    /// Only `Issued` tokens that are not expired (allowing `skew` of early
    /// refresh) qualify. `Empty` and `Foreign` never do, whatever fields a
    /// foreign value carries.
    pub fn usable(&self, skew: Duration) -> Option<&OAuth2Token> {
        match self {
            TokenSlot::Issued(token) if !token.expires_within(skew) => Some(token),
            _ => None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.usable(Duration::zero()).is_some()
    }

    pub fn issued(&self) -> Option<&OAuth2Token> {
        match self {
            TokenSlot::Issued(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TokenSlot::Empty)
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            TokenSlot::Empty => "empty",
            TokenSlot::Issued(token) if token.is_expired() => "expired",
            TokenSlot::Issued(_) => "issued",
            TokenSlot::Foreign(_) => "foreign",
        }
    }
}

impl From<OAuth2Token> for TokenSlot {
    fn from(token: OAuth2Token) -> Self {
        TokenSlot::Issued(token)
    }
}

impl From<Option<OAuth2Token>> for TokenSlot {
    fn from(token: Option<OAuth2Token>) -> Self {
        token.map_or(TokenSlot::Empty, TokenSlot::Issued)
    }
}

impl From<serde_json::Value> for TokenSlot {
    fn from(value: serde_json::Value) -> Self {
        TokenSlot::Foreign(value)
    }
}

/// Build the `Authorization` header value (Bearer token)
pub fn bearer_header(token: &OAuth2Token) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.access_token()))
        .map_err(|e| GateError::InvalidHeader(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}
