// Full re-authentication with username and password

use reqwest::Client;

use super::audit::AuditLogger;
use super::types::{ApiEnvelope, Credentials, LoginRequest, LoginResult, TokenPair};
use crate::error::{AuthError, Result};

/// Get login URL for an API base
fn get_login_url(base_url: &str) -> String {
    format!("{}/auth/login", base_url)
}

/// Performs credential-based login, returning a fresh token pair
#[derive(Clone)]
pub struct LoginClient {
    client: Client,
    audit: AuditLogger,
}

impl LoginClient {
    pub fn new(client: Client, audit: AuditLogger) -> Self {
        Self { client, audit }
    }

    /// Log in with the static credentials
    ///
    /// Incomplete credentials fail with [`AuthError::Configuration`] before any
    /// request is sent. A response without both tokens is a failure, never a
    /// partial result.
    pub async fn login(&self, creds: &Credentials) -> Result<TokenPair> {
        if let Err(e) = creds.ensure_complete() {
            self.audit.login_failed(&creds.username, &e.to_string());
            return Err(e);
        }

        match self.request_tokens(creds).await {
            Ok(pair) => {
                self.audit.login_succeeded(&creds.username);
                Ok(pair)
            }
            Err(e) => {
                self.audit.login_failed(&creds.username, &e.to_string());
                Err(e)
            }
        }
    }

    async fn request_tokens(&self, creds: &Credentials) -> Result<TokenPair> {
        let url = get_login_url(&creds.base_url);
        tracing::debug!(url = %url, "Sending login request");

        let request = LoginRequest {
            op_id: &creds.username,
            op_password: &creds.password,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::AuthFailure(format!(
                "{} - {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        let envelope: ApiEnvelope<LoginResult> = serde_json::from_str(&body)
            .map_err(|e| AuthError::AuthFailure(format!("Malformed login response: {}", e)))?;

        let result = envelope.result.ok_or_else(|| {
            AuthError::AuthFailure("Login response does not contain result".to_string())
        })?;

        match (non_empty(result.access_token), non_empty(result.refresh_token)) {
            (Some(access_token), Some(refresh_token)) => Ok(TokenPair {
                access_token,
                refresh_token: Some(refresh_token),
            }),
            _ => Err(AuthError::AuthFailure(
                "Login response does not contain access_token and refresh_token".to_string(),
            )),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
