//! Error types for calls against the spreadsheet, document and delivery APIs.

use std::fmt;
use thiserror::Error;

/// The external service a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Sheets,
    Drive,
    Slides,
    Gmail,
    /// The OAuth token endpoint.
    OAuth,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sheets => "sheets",
            Self::Drive => "drive",
            Self::Slides => "slides",
            Self::Gmail => "gmail",
            Self::OAuth => "oauth",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure category. Decides whether a row is retried, aborts the run, or
/// surfaces as an adapter failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// The access token was rejected and could not be refreshed.
    AuthenticationFailed,
    /// The account may not touch the spreadsheet, file or folder.
    AuthorizationFailed,
    /// Connect failure or timeout.
    NetworkError,
    /// Per-user or per-project quota exhausted.
    RateLimited,
    /// 5xx from the service.
    ServerError,
    /// The body did not match the expected JSON.
    InvalidResponse,
    NotFound,
    /// 4xx other than auth, quota and 404.
    BadRequest,
    /// Client id, secret, redirect or scopes are unusable.
    ConfigurationError,
}

impl ProviderErrorCode {
    /// Transient failures worth another attempt under the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call to Sheets, Drive, Slides, Gmail or the token endpoint.
#[derive(Debug, Error)]
#[error("{}{code}: {message}", .service.map(|s| format!("[{}] ", s)).unwrap_or_default())]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    service: Option<Service>,
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            service: None,
            status: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    #[must_use]
    pub fn with_service(mut self, service: Service) -> Self {
        self.service = Some(service);
        self
    }

    /// Records the HTTP status the service answered with.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn service(&self) -> Option<Service> {
        self.service
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// The service turned the request away without acting on it: rate
    /// limiting, quota exhaustion or 503. Resending cannot repeat its
    /// effect, unlike after a timeout or any other server error.
    pub fn is_refusal(&self) -> bool {
        self.code == ProviderErrorCode::RateLimited || self.status == Some(503)
    }

    /// The caller has to log in again; batches abort on this regardless of
    /// the failure policy.
    pub fn is_auth_expired(&self) -> bool {
        self.code == ProviderErrorCode::AuthenticationFailed
    }
}
