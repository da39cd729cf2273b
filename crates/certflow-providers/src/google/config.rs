//! Google Workspace client configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};

/// OAuth 2.0 client credentials from the Google Cloud Console.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Accepts the Console download (`web` or `installed` section) or a flat
/// object with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    web: Option<NestedCredentials>,
    installed: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Google Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ProviderError::configuration(format!("failed to read credentials file: {}", e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if let Some(creds) = file.web.or(file.installed) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }
        Err(ProviderError::configuration(
            "credentials file must contain a 'web'/'installed' section or root 'client_id'/'client_secret'",
        ))
    }

    /// Checks that both values are present and the id looks like a Google client id.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration shared by the OAuth client and the API client.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,

    /// Where Google sends the browser after consent. Must match the
    /// redirect URI registered for the client.
    pub redirect_uri: String,

    pub scopes: Vec<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    pub user_agent: String,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub const DEFAULT_REDIRECT_URI: &'static str = "http://localhost:3000/api/auth/callback";

    /// Drive, Sheets, Slides and Gmail send access.
    pub const DEFAULT_SCOPES: [&'static str; 4] = [
        "https://www.googleapis.com/auth/drive",
        "https://www.googleapis.com/auth/spreadsheets",
        "https://www.googleapis.com/auth/presentations",
        "https://www.googleapis.com/auth/gmail.send",
    ];

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            redirect_uri: Self::DEFAULT_REDIRECT_URI.to_string(),
            scopes: Self::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("certflow/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates credentials and the redirect URI.
    pub fn validate(&self) -> ProviderResult<()> {
        self.credentials
            .validate()
            .map_err(ProviderError::configuration)?;
        url::Url::parse(&self.redirect_uri).map_err(|e| {
            ProviderError::configuration(format!("invalid redirect_uri: {}", e))
        })?;
        if self.scopes.is_empty() {
            return Err(ProviderError::configuration("at least one scope is required"));
        }
        Ok(())
    }

    /// Builds the HTTP client used for every Google call.
    pub(crate) fn http_client(&self) -> ProviderResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })
    }
}
