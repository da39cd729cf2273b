//! OAuth 2.0 authorization code flow with PKCE for the dashboard.
//!
//! The server stays stateless between `/api/auth/start` and
//! `/api/auth/callback`: the PKCE verifier and the CSRF nonce travel in a
//! short-lived cookie, and the dashboard's query parameters travel through
//! Google inside the `state` parameter.
//!
//! 1. [`PkceFlow::new`] generates verifier, challenge and nonce
//! 2. [`RelayState`] packs the nonce with the relayed query parameters
//! 3. [`OAuthClient::authorization_url`] builds the consent URL
//! 4. On callback the nonce is checked and [`OAuthClient::exchange_code`]
//!    trades the code and verifier for tokens

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult, Service};

use super::config::GoogleConfig;
use super::tokens::TokenSet;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// PKCE verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

const NONCE_LENGTH: usize = 16;

/// Separates the nonce from the relayed query in the `state` parameter.
const STATE_SEPARATOR: char = '.';

/// PKCE verifier/challenge pair plus a CSRF nonce (RFC 7636).
#[derive(Debug, Clone)]
pub struct PkceFlow {
    pub verifier: String,
    /// SHA-256 of the verifier, base64url encoded.
    pub challenge: String,
    pub nonce: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            nonce: random_token(NONCE_LENGTH),
        }
    }

    /// Rebuilds a flow from the verifier and nonce kept in the cookie.
    pub fn restore(verifier: impl Into<String>, nonce: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            nonce: nonce.into(),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Serializes verifier and nonce for the flow cookie.
    pub fn to_cookie_value(&self) -> String {
        format!("{}{}{}", self.nonce, STATE_SEPARATOR, self.verifier)
    }

    pub fn from_cookie_value(value: &str) -> Option<Self> {
        let (nonce, verifier) = value.split_once(STATE_SEPARATOR)?;
        if nonce.is_empty() || verifier.is_empty() {
            return None;
        }
        Some(Self::restore(verifier, nonce))
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// The OAuth `state` value: a CSRF nonce plus the dashboard query
/// parameters to restore after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayState {
    pub nonce: String,
    pub params: Vec<(String, String)>,
}

impl RelayState {
    /// Keeps the non-empty parameters whose key is in `keys`, in `keys` order.
    pub fn capture<'a, I>(nonce: impl Into<String>, query: I, keys: &[&str]) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
    {
        let params = keys
            .iter()
            .filter_map(|key| {
                query
                    .clone()
                    .into_iter()
                    .find(|(k, v)| k == key && !v.is_empty())
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();
        Self {
            nonce: nonce.into(),
            params,
        }
    }

    /// The relayed parameters as a form-encoded query string.
    pub fn query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.nonce, STATE_SEPARATOR, self.query())
    }

    pub fn decode(state: &str) -> ProviderResult<Self> {
        let (nonce, query) = state
            .split_once(STATE_SEPARATOR)
            .ok_or_else(|| ProviderError::authentication("malformed OAuth state"))?;
        let params = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Self {
            nonce: nonce.to_string(),
            params,
        })
    }
}

/// Talks to Google's authorization and token endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: GoogleConfig,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = config.http_client()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Builds the consent URL. Requests offline access and forces the
    /// consent prompt so a refresh token is always issued.
    pub fn authorization_url(&self, pkce: &PkceFlow, state: &RelayState) -> String {
        let scope = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.config.credentials.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&pkce.challenge),
            urlencoding::encode(&state.encode()),
        )
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> ProviderResult<TokenSet> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let token_response = self.post_token(&params, "token exchange").await?;
        info!("obtained tokens from authorization code");
        Ok(TokenSet::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
            self.config.scopes.clone(),
        ))
    }

    /// Returns a new access token and its lifetime in seconds.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token_response = self.post_token(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok((token_response.access_token, token_response.expires_in))
    }

    async fn post_token(&self, params: &[(&str, &str)], what: &str) -> ProviderResult<TokenResponse> {
        debug!("{} request", what);
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("{} request failed: {}", what, e)).with_service(Service::OAuth)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_service(Service::OAuth)
        })?;

        if status.is_server_error() {
            return Err(
                ProviderError::server(format!("{} failed ({}): {}", what, status, body))
                    .with_service(Service::OAuth),
            );
        }
        if !status.is_success() {
            return Err(
                ProviderError::authentication(format!("{} failed ({}): {}", what, status, body))
                    .with_service(Service::OAuth),
            );
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
                .with_service(Service::OAuth)
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}
