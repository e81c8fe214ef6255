#[derive(thiserror::Error, Debug)]
pub enum GateError {
    #[error("HTTP Error")]
    Http(#[from] reqwest::Error),
    #[error("JSON Error")]
    Json(#[from] serde_json::Error),
    #[error("URL Error")]
    Url(#[from] url::ParseError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
    #[error("Authentication unavailable: {0}")]
    AuthenticationUnavailable(#[source] Box<GateError>),
    #[error("Token endpoint rejected refresh (status {status}): {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("Invalid token endpoint response: {0}")]
    InvalidTokenResponse(String),
    #[error("Unexpected response (status {status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

impl GateError {
    /// Wrap a refresher failure, leaving an already wrapped error as is.
    pub(crate) fn authentication_unavailable(cause: GateError) -> Self {
        match cause {
            err @ GateError::AuthenticationUnavailable(_) => err,
            other => GateError::AuthenticationUnavailable(Box::new(other)),
        }
    }

    pub fn is_authentication_unavailable(&self) -> bool {
        matches!(self, GateError::AuthenticationUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
