use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{ClientBuilder, Method, StatusCode};
use url::{ParseError, Url};

use crate::api::base::Result;

/// A request as handed to the transport, credential header already merged.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub resource: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutgoingRequest {
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Performs the actual transmission of a request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse>;
}

/// [`Transport`] backed by a `reqwest::Client` rooted at a base URL
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url) -> Result<Self> {
        Ok(Self {
            client: Self::create_client()?,
            base_url,
        })
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn create_client() -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("bearer-gate"));

        Ok(ClientBuilder::new().default_headers(headers).build()?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute resources are used as given, anything else is appended to the base URL.
    pub(crate) fn resolve(&self, resource: &str) -> Result<Url> {
        match Url::parse(resource) {
            Ok(url) => return Ok(url),
            Err(ParseError::RelativeUrlWithoutBase) => {}
            Err(err) => return Err(err.into()),
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = resource.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse> {
        let url = self.resolve(&request.resource)?;

        let mut req = self
            .client
            .request(request.method, url)
            .headers(request.headers)
            .query(&request.query);
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let response = req.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> ReqwestTransport {
        ReqwestTransport::new(Url::parse(base).unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_relative() {
        let t = transport("https://api.example.com");
        assert_eq!(t.resolve("/me").unwrap().as_str(), "https://api.example.com/me");
        assert_eq!(t.resolve("me").unwrap().as_str(), "https://api.example.com/me");
    }

    #[test]
    fn test_resolve_keeps_base_path() {
        let t = transport("https://api.example.com/v2/");
        assert_eq!(
            t.resolve("/accounts/1").unwrap().as_str(),
            "https://api.example.com/v2/accounts/1"
        );
    }

    #[test]
    fn test_resolve_absolute() {
        let t = transport("https://api.example.com");
        assert_eq!(
            t.resolve("https://other.example.com/x").unwrap().as_str(),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_resolve_absolute_scheme_is_case_insensitive() {
        let t = transport("https://api.example.com");
        assert_eq!(
            t.resolve("HTTPS://Other.Example.com/x").unwrap().as_str(),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_resolve_rejects_malformed_absolute() {
        let t = transport("https://api.example.com");
        assert!(t.resolve("https://").is_err());
    }
}
