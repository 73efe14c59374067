// Token liveness probe

use reqwest::{Client, StatusCode};

use super::audit::AuditLogger;
use super::types::{normalize_base_url, token_preview, TokenStatus};

/// Get profile URL for an API base
fn get_profile_url(base_url: &str) -> String {
    format!("{}/auth/profile", base_url)
}

/// Probes the profile endpoint to decide whether an access token is usable
///
/// Only HTTP 200 counts as valid. Transport failures are reported as
/// [`TokenStatus::Invalid`] too, so an unreachable API looks the same as a
/// rejected token.
#[derive(Clone)]
pub struct TokenValidator {
    client: Client,
    base_url: String,
    audit: AuditLogger,
}

impl TokenValidator {
    pub fn new(client: Client, base_url: &str, audit: AuditLogger) -> Self {
        Self {
            client,
            base_url: normalize_base_url(base_url),
            audit,
        }
    }

    pub async fn validate(&self, access_token: Option<&str>) -> TokenStatus {
        let Some(access_token) = access_token.filter(|t| !t.is_empty()) else {
            self.audit.token_rejected("No access token stored");
            return TokenStatus::Invalid;
        };

        if self.base_url.is_empty() {
            self.audit.token_rejected("API_BASE_URL is not set");
            return TokenStatus::Invalid;
        }

        let url = get_profile_url(&self.base_url);
        let result = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                self.audit.token_validated(&token_preview(access_token));
                TokenStatus::Valid
            }
            Ok(response) => {
                self.audit
                    .token_rejected(&format!("Profile endpoint returned {}", response.status()));
                TokenStatus::Invalid
            }
            Err(e) => {
                tracing::error!(error = %e, "Error testing auth token");
                self.audit.token_rejected(&format!("Transport error: {}", e));
                TokenStatus::Invalid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(base_url: &str) -> TokenValidator {
        TokenValidator::new(Client::new(), base_url, AuditLogger::new())
    }

    #[tokio::test]
    async fn test_validate_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/profile")
            .match_header("authorization", "Bearer goodA")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let status = validator(&server.url()).validate(Some("goodA")).await;
        assert_eq!(status, TokenStatus::Valid);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_validate_only_200_is_valid() {
        let mut server = mockito::Server::new_async().await;
        let _profile = server
            .mock("GET", "/auth/profile")
            .with_status(204)
            .create_async()
            .await;

        let status = validator(&server.url()).validate(Some("goodA")).await;
        assert_eq!(status, TokenStatus::Invalid);
    }

    #[tokio::test]
    async fn test_validate_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _profile = server
            .mock("GET", "/auth/profile")
            .with_status(401)
            .create_async()
            .await;

        let status = validator(&server.url()).validate(Some("expiredA")).await;
        assert_eq!(status, TokenStatus::Invalid);
    }

    #[tokio::test]
    async fn test_validate_transport_error_is_invalid() {
        let status = validator("http://127.0.0.1:9").validate(Some("goodA")).await;
        assert_eq!(status, TokenStatus::Invalid);
    }

    #[tokio::test]
    async fn test_validate_missing_token_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/profile")
            .expect(0)
            .create_async()
            .await;

        let status = validator(&server.url()).validate(None).await;
        assert_eq!(status, TokenStatus::Invalid);
        mock.assert_async().await;
    }
}
