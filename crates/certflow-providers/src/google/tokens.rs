//! Token sets and the per-request session that refreshes them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

use super::oauth::OAuthClient;

/// Tokens returned by the token endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Expiry, one minute early.
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(expiry_from_now),
            scopes,
        }
    }
}

fn expiry_from_now(secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(secs) - Duration::seconds(60)
}

/// Caller-supplied credentials for the duration of one request.
///
/// When the service rejects the access token, [`refresh`](Self::refresh)
/// trades the refresh token for a new one. Concurrent callers that saw the
/// same stale token share a single refresh.
pub struct GoogleSession {
    access_token: RwLock<String>,
    refresh_token: Option<String>,
    oauth: Option<Arc<OAuthClient>>,
}

impl std::fmt::Debug for GoogleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSession")
            .field("can_refresh", &self.can_refresh())
            .finish_non_exhaustive()
    }
}

impl GoogleSession {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: RwLock::new(access_token.into()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            oauth: None,
        }
    }

    /// Enables refresh through the given OAuth client.
    pub fn with_oauth(mut self, oauth: Arc<OAuthClient>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub async fn access_token(&self) -> String {
        self.access_token.read().await.clone()
    }

    /// True if a rejected token can be refreshed.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.oauth.is_some()
    }

    /// Refreshes the access token after `stale` was rejected.
    ///
    /// Returns the token to retry with, or an authentication error when no
    /// refresh is possible.
    pub async fn refresh(&self, stale: &str) -> ProviderResult<String> {
        let (Some(refresh_token), Some(oauth)) = (&self.refresh_token, &self.oauth) else {
            return Err(ProviderError::authentication(
                "access token rejected and no refresh token available",
            ));
        };

        let mut current = self.access_token.write().await;
        if current.as_str() != stale {
            debug!("access token already refreshed by another call");
            return Ok(current.clone());
        }

        match oauth.refresh_token(refresh_token).await {
            Ok((token, _expires_in)) => {
                *current = token.clone();
                Ok(token)
            }
            Err(e) => {
                warn!("access token refresh failed: {}", e);
                Err(ProviderError::authentication(format!(
                    "access token expired and refresh failed: {}",
                    e.message()
                )))
            }
        }
    }
}
