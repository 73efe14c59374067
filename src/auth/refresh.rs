// Token refresh logic

use reqwest::Client;

use super::audit::AuditLogger;
use super::types::{normalize_base_url, ApiEnvelope, RefreshResult};
use crate::error::{AuthError, Result};

/// Get refresh URL for an API base
fn get_refresh_url(base_url: &str) -> String {
    format!("{}/auth/refresh", base_url)
}

/// Exchanges a refresh token for a new access token
///
/// The refresh token travels in the `refresh` header and is never rotated:
/// only an access token comes back.
#[derive(Clone)]
pub struct RefreshClient {
    client: Client,
    base_url: String,
    audit: AuditLogger,
}

impl RefreshClient {
    pub fn new(client: Client, base_url: &str, audit: AuditLogger) -> Self {
        Self {
            client,
            base_url: normalize_base_url(base_url),
            audit,
        }
    }

    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<String> {
        let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) else {
            let err = AuthError::RefreshFailure("No refresh token available".to_string());
            self.audit.refresh_failed(&err.to_string());
            return Err(err);
        };

        match self.exchange(refresh_token).await {
            Ok(access_token) => {
                self.audit.refresh_succeeded();
                Ok(access_token)
            }
            Err(e) => {
                self.audit.refresh_failed(&e.to_string());
                Err(e)
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<String> {
        if self.base_url.is_empty() {
            return Err(AuthError::Configuration(
                "API_BASE_URL is not set".to_string(),
            ));
        }

        let url = get_refresh_url(&self.base_url);
        tracing::debug!(url = %url, "Sending token refresh request");

        let response = self
            .client
            .post(&url)
            .header("accept", "*/*")
            .header("refresh", refresh_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailure(format!(
                "{} - {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        let envelope: ApiEnvelope<RefreshResult> = serde_json::from_str(&body).map_err(|e| {
            AuthError::RefreshFailure(format!("Malformed refresh response: {}", e))
        })?;

        envelope
            .result
            .and_then(|r| r.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AuthError::RefreshFailure(
                    "Refresh response does not contain access_token".to_string(),
                )
            })
    }
}
