//! Session cookies for the dashboard.
//!
//! The server keeps no session state. The OAuth flow parameters travel in a
//! short-lived flow cookie and the tokens in `access_token`/`refresh_token`.

use axum::http::header::{COOKIE, HeaderValue, InvalidHeaderValue};
use axum::http::HeaderMap;
use certflow_protocol::Credentials;

pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";
/// Holds the PKCE verifier and nonce between `/auth/start` and the callback.
pub const OAUTH_FLOW: &str = "oauth_flow";

/// Lifetime of the flow cookie in seconds.
pub const FLOW_MAX_AGE: u64 = 600;

/// Returns the decoded value of a request cookie.
pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
        .filter(|value| !value.is_empty())
}

/// Reads the session tokens, if an access token is present.
pub fn credentials(headers: &HeaderMap) -> Option<Credentials> {
    let access = get(headers, ACCESS_TOKEN)?;
    Some(Credentials::new(access, get(headers, REFRESH_TOKEN)))
}

/// Builds `Set-Cookie` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieJar {
    secure: bool,
}

impl CookieJar {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// A cookie scoped to the whole site. `max_age` of `None` is a session cookie.
    pub fn set(
        &self,
        name: &str,
        value: &str,
        max_age: Option<u64>,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            name,
            urlencoding::encode(value)
        );
        if let Some(seconds) = max_age {
            cookie.push_str(&format!("; Max-Age={}", seconds));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// Expires a cookie.
    pub fn clear(&self, name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        self.set(name, "", Some(0))
    }
}
