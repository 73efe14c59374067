// Authentication types

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Persisted key holding the access token
pub const AUTH_TOKEN_KEY: &str = "AUTH_TOKEN";

/// Persisted key holding the refresh token
pub const AUTH_REFRESH_TOKEN_KEY: &str = "AUTH_REFRESH_TOKEN";

/// Static login secrets, loaded once at startup
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            username: username.into().trim().to_string(),
            password: password.into(),
        }
    }

    /// Fail with a configuration error naming every missing field
    pub fn ensure_complete(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("API_BASE_URL", self.base_url.trim()),
            ("API_USERNAME", self.username.trim()),
            ("API_PASSWORD", self.password.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Configuration(format!(
                "Missing API environment variables: {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Strip whitespace and trailing slashes so endpoint paths join cleanly
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Token pair returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Token material as last written to the credential store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl PersistedState {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.is_empty()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
        }
    }
}

/// Outcome of probing the profile endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Invalid,
}

/// Which stage of a lifecycle pass produced the token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Persisted token passed validation
    Persisted,
    /// New access token obtained with the refresh token
    Refreshed,
    /// Fresh pair obtained by a full login
    LoggedIn,
}

/// Access token handed out by a lifecycle pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObtainedToken {
    pub access_token: String,
    pub source: TokenSource,
}

/// `Authorization: Bearer <token>` header, built fresh for every caller
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    token: String,
}

impl AuthorizationHeader {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        "Authorization"
    }

    pub fn value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Header mapping in the `{"Authorization": "Bearer ..."}` shape
    pub fn as_map(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([(self.name(), self.value())])
    }

    /// Header map ready to attach to a reqwest request
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut value = HeaderValue::from_str(&self.value()).map_err(|e| {
            AuthError::Configuration(format!("Access token is not a valid header value: {}", e))
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

impl fmt::Debug for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationHeader")
            .field("token", &token_preview(&self.token))
            .finish()
    }
}

impl Serialize for AuthorizationHeader {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_map().serialize(serializer)
    }
}

/// Short prefix of a token, safe for logs
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

/// Response envelope used by every auth endpoint
#[derive(Deserialize)]
pub struct ApiEnvelope<T> {
    pub result: Option<T>,
}

/// Login request body
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub op_id: &'a str,
    pub op_password: &'a str,
}

/// Login response `result`
#[derive(Deserialize)]
pub struct LoginResult {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Refresh response `result`
#[derive(Deserialize)]
pub struct RefreshResult {
    pub access_token: Option<String>,
}
