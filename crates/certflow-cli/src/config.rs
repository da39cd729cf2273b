//! CLI configuration.
//!
//! All settings live in `~/.config/certflow/config.toml` by default:
//!
//! ```toml
//! [google]
//! client_id = "env::GOOGLE_CLIENT_ID"
//! client_secret = "pass::google/certflow"
//!
//! [server]
//! bind_addr = "127.0.0.1:3000"
//!
//! [certificate]
//! lead_name = "Jane Doe"
//!
//! [mail]
//! sender_address = "team@example.com"
//!
//! [batch]
//! failure_policy = "continue"
//! ```
//!
//! `client_id` and `client_secret` accept secret references (see
//! [`crate::secret`]).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use certflow_core::{CertificateConstants, MessageTemplate, RetryPolicy};
use certflow_providers::google::{GoogleConfig, OAuthCredentials};
use certflow_server::{BatchConfig, CommitMode, FailurePolicy, MailConfig, ServerConfig};
use serde::{Deserialize, Serialize};

use crate::cli::GoogleArgs;
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertflowConfig {
    pub google: GoogleSettings,
    pub server: ServerSettings,
    pub certificate: CertificateConstants,
    pub mail: MailSettings,
    pub batch: BatchSettings,
}

/// OAuth client settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Client JSON downloaded from the Cloud Console, used when the inline
    /// fields are absent.
    pub credentials_file: Option<PathBuf>,

    pub redirect_uri: Option<String>,

    /// Replaces the default scope list when non-empty.
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,

    pub secure_cookies: bool,

    /// Per-request timeout for Google calls.
    pub timeout_secs: u64,

    /// Overall budget for one batch run; 0 disables it.
    pub deadline_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: ServerConfig::default().bind_addr,
            secure_cookies: false,
            timeout_secs: GoogleConfig::DEFAULT_TIMEOUT_SECS,
            deadline_secs: BatchConfig::DEFAULT_DEADLINE_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub sender_address: Option<String>,
    pub sender_name: String,
    /// Message template with `{event}`, `{name}`, `{date}` and `{sender}`.
    pub template: MessageTemplate,
}

impl Default for MailSettings {
    fn default() -> Self {
        let mail = MailConfig::default();
        Self {
            sender_address: mail.sender_address,
            sender_name: mail.sender_name,
            template: mail.template,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub failure_policy: FailurePolicy,
    pub commit_mode: CommitMode,
    /// Attempts per row, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            failure_policy: FailurePolicy::default(),
            commit_mode: CommitMode::default(),
            max_attempts: retry.max_attempts,
            initial_backoff_ms: retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: retry.max_backoff.as_millis() as u64,
        }
    }
}

impl BatchSettings {
    fn retry_policy(&self) -> RetryPolicy {
        let retry = RetryPolicy::default().with_max_attempts(self.max_attempts);
        let multiplier = retry.multiplier;
        retry.with_backoff(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            multiplier,
        )
    }
}

impl CertflowConfig {
    /// Loads the default file, or defaults if it does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("certflow")
    }

    pub fn to_server_config(&self) -> ServerConfig {
        let deadline = match self.server.deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let batch = BatchConfig::default()
            .with_failure_policy(self.batch.failure_policy)
            .with_commit_mode(self.batch.commit_mode)
            .with_retry(self.batch.retry_policy())
            .with_deadline(deadline);

        ServerConfig::new(self.server.bind_addr)
            .with_secure_cookies(self.server.secure_cookies)
            .with_batch(batch)
            .with_certificate(self.certificate.clone())
            .with_mail(MailConfig {
                sender_address: self.mail.sender_address.clone(),
                sender_name: self.mail.sender_name.clone(),
                template: self.mail.template.clone(),
            })
    }

    /// Builds the Google client configuration, letting `overrides` win.
    pub fn google_config(&self, overrides: &GoogleArgs) -> ClientResult<GoogleConfig> {
        let credentials = self.google.resolve_credentials(overrides)?;
        let mut config = GoogleConfig::new(credentials)
            .with_timeout(Duration::from_secs(self.server.timeout_secs.max(1)));

        let redirect = overrides
            .redirect_uri
            .as_ref()
            .or(self.google.redirect_uri.as_ref());
        if let Some(uri) = redirect {
            config = config.with_redirect_uri(uri);
        }
        if !self.google.scopes.is_empty() {
            config = config.with_scopes(self.google.scopes.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

impl GoogleSettings {
    /// Resolves the OAuth client from flags, inline settings or the client file.
    pub fn resolve_credentials(&self, overrides: &GoogleArgs) -> ClientResult<OAuthCredentials> {
        let raw_id = overrides.client_id.as_ref().or(self.client_id.as_ref());
        let raw_secret = overrides
            .client_secret
            .as_ref()
            .or(self.client_secret.as_ref());

        match (raw_id, raw_secret) {
            (Some(id), Some(secret)) => {
                let id = crate::secret::resolve(id)
                    .map_err(|e| ClientError::config(format!("failed to resolve client_id: {}", e)))?;
                let secret = crate::secret::resolve(secret).map_err(|e| {
                    ClientError::config(format!("failed to resolve client_secret: {}", e))
                })?;
                Ok(OAuthCredentials::new(id, secret))
            }
            (Some(_), None) => Err(ClientError::config(
                "client_secret is missing (set [google] client_secret or GOOGLE_CLIENT_SECRET)",
            )),
            (None, _) => match self.credentials_file {
                Some(ref path) => Ok(OAuthCredentials::from_file(path)?),
                None => Err(ClientError::config(format!(
                    "Google client not configured. Add to {}:\n  \
                     [google]\n  \
                     client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                     client_secret = \"YOUR_SECRET\"\n\n  \
                     or set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET",
                    CertflowConfig::default_path().display()
                ))),
            },
        }
    }
}
