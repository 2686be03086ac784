//! JSON client for the platform APIs
//!
//! Wraps `reqwest::Client` with a base URL, an optional bearer token and an
//! `X-Request-Id` header on every call so control plane logs can be joined
//! with orchestrator logs.
//!
//! Status codes map onto [`PlatformError`]; rate limiting, server errors and
//! transport failures are transient and surface as retryable
//! [`ApplicationError::ExternalService`].

use std::time::Duration;

use application::ApplicationError;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::PlatformConfig;

/// Header name for request correlation ID
pub const X_REQUEST_ID: &str = "x-request-id";

/// Errors from a platform API call
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other 4xx; the request itself is wrong and retrying will not help
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    ParseError(String),
}

impl PlatformError {
    /// Classify a non-success response
    fn from_status(status: StatusCode, context: &str, body: &str) -> Self {
        let detail = if body.is_empty() {
            format!("{context}: HTTP {status}")
        } else {
            format!("{context}: HTTP {status}: {body}")
        };

        match status {
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited(context.to_string()),
            StatusCode::NOT_FOUND => Self::NotFound(detail),
            StatusCode::CONFLICT => Self::Conflict(detail),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Self::Timeout(detail),
            s if s.is_server_error() => Self::ServiceUnavailable(detail),
            _ => Self::Rejected(detail),
        }
    }

    fn from_transport(err: &reqwest::Error, context: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{context}: {err}"))
        } else {
            Self::ConnectionFailed(format!("{context}: {err}"))
        }
    }
}

impl From<PlatformError> for ApplicationError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::ConnectionFailed(_)
            | PlatformError::Timeout(_)
            | PlatformError::RateLimited(_)
            | PlatformError::ServiceUnavailable(_) => Self::ExternalService(err.to_string()),
            PlatformError::NotFound(msg) => Self::NotFound(msg),
            PlatformError::Conflict(msg) => Self::Conflict(msg),
            PlatformError::Rejected(msg) => Self::InvalidOperation(msg),
            PlatformError::ParseError(msg) => Self::Internal(format!("Invalid platform response: {msg}")),
        }
    }
}

/// HTTP client bound to one platform API
#[derive(Clone)]
pub struct PlatformHttpClient {
    inner: Client,
    base_url: String,
    api_token: Option<String>,
}

impl std::fmt::Debug for PlatformHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformHttpClient")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl PlatformHttpClient {
    /// Create a client for `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let inner = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .user_agent(format!("chaos-orchestrator/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    /// Client for the control plane described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client cannot be built.
    pub fn control_plane(config: &PlatformConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            &config.control_plane_url,
            config.api_token.clone(),
            config.request_timeout(),
        )
    }

    /// Client for the host agent gateway described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client cannot be built.
    pub fn agent(config: &PlatformConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.agent_url, config.api_token.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self
            .inner
            .request(method, url)
            .header(X_REQUEST_ID, Uuid::new_v4().to_string());
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response, PlatformError> {
        let response = builder
            .send()
            .await
            .map_err(|e| PlatformError::from_transport(&e, context))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(%status, context, "Platform call failed");
        Err(PlatformError::from_status(status, context, body.trim()))
    }

    async fn parse<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, PlatformError> {
        response
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(format!("{context}: {e}")))
    }

    /// POST a JSON body and decode the JSON answer
    #[instrument(skip(self, body), fields(base_url = %self.base_url))]
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, PlatformError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(self.request(Method::POST, path).json(body), path).await?;
        Self::parse(response, path).await
    }

    /// POST a JSON body and ignore the answer
    #[instrument(skip(self, body), fields(base_url = %self.base_url))]
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<(), PlatformError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(self.request(Method::POST, path).json(body), path).await?;
        Ok(())
    }

    /// PUT a JSON body and ignore the answer
    #[instrument(skip(self, body), fields(base_url = %self.base_url))]
    pub async fn put<B>(&self, path: &str, body: &B) -> Result<(), PlatformError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(self.request(Method::PUT, path).json(body), path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn delete(&self, path: &str) -> Result<(), PlatformError> {
        self.send(self.request(Method::DELETE, path), path).await?;
        Ok(())
    }
}
