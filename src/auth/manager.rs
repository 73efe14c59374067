use anyhow::Context;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::Instrument;

use super::audit::AuditLogger;
use super::login::LoginClient;
use super::refresh::RefreshClient;
use super::store::CredentialStore;
use super::types::{
    token_preview, AuthorizationHeader, Credentials, ObtainedToken, PersistedState, TokenSource,
    TokenStatus,
};
use super::validator::TokenValidator;
use crate::error::{AuthError, Result};

/// Token lifecycle manager
///
/// Each pass loads the persisted tokens and walks validate → refresh → login,
/// stopping at the first stage that yields a usable access token. Passes are
/// serialised, so concurrent callers never race each other through the
/// read-check-act sequence.
pub struct AuthManager {
    /// Static login secrets
    credentials: Credentials,

    /// Persisted token material
    store: Arc<dyn CredentialStore>,

    validator: TokenValidator,
    refresher: RefreshClient,
    login: LoginClient,
    audit: AuditLogger,

    /// Held for the duration of one lifecycle pass
    pass_lock: Mutex<()>,
}

impl AuthManager {
    /// Create a new AuthManager with an HTTP client using the given timeouts
    pub fn new(
        credentials: Credentials,
        store: Arc<dyn CredentialStore>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(credentials, store, client, AuditLogger::new()))
    }

    /// Create an AuthManager sharing an existing HTTP client
    pub fn with_client(
        credentials: Credentials,
        store: Arc<dyn CredentialStore>,
        client: Client,
        audit: AuditLogger,
    ) -> Self {
        Self {
            validator: TokenValidator::new(client.clone(), &credentials.base_url, audit.clone()),
            refresher: RefreshClient::new(client.clone(), &credentials.base_url, audit.clone()),
            login: LoginClient::new(client, audit.clone()),
            credentials,
            store,
            audit,
            pass_lock: Mutex::new(()),
        }
    }

    /// Authorization header for the current pass, or `None` when every stage failed
    ///
    /// Callers must abort their own request on `None` rather than continue
    /// unauthenticated.
    pub async fn get_authorization_header(&self) -> Option<AuthorizationHeader> {
        match self.obtain_token().await {
            Ok(token) => Some(AuthorizationHeader::bearer(token.access_token)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to retrieve auth header");
                None
            }
        }
    }

    /// Run one lifecycle pass, keeping the stage errors for diagnostics
    pub async fn obtain_token(&self) -> Result<ObtainedToken> {
        let _pass = self.pass_lock.lock().await;
        let span = tracing::info_span!("lifecycle_pass", pass_id = %uuid::Uuid::new_v4());
        self.run_pass().instrument(span).await
    }

    /// Validate the persisted access token without refreshing or logging in
    pub async fn check_persisted(&self) -> TokenStatus {
        let state = self.load_state();
        self.validator.validate(state.access_token.as_deref()).await
    }

    /// Skip validation and refresh; log in and persist the new pair
    pub async fn force_login(&self) -> Result<ObtainedToken> {
        let _pass = self.pass_lock.lock().await;
        let pair = self.login.login(&self.credentials).await?;
        self.persist(&pair.access_token, pair.refresh_token.as_deref());
        Ok(ObtainedToken {
            access_token: pair.access_token,
            source: TokenSource::LoggedIn,
        })
    }

    async fn run_pass(&self) -> Result<ObtainedToken> {
        let state = self.load_state();

        // Stage 1: the persisted token is already stored, nothing to write back
        let status = self.validator.validate(state.access_token.as_deref()).await;
        if let (TokenStatus::Valid, Some(access_token)) = (status, state.access_token.as_ref()) {
            return Ok(ObtainedToken {
                access_token: access_token.clone(),
                source: TokenSource::Persisted,
            });
        }
        tracing::warn!("Auth token invalid, attempting refresh...");

        // Stage 2: refresh tokens are not rotated, so only the access token is written
        let refresh_err = match self.refresher.refresh(state.refresh_token.as_deref()).await {
            Ok(access_token) => {
                self.persist(&access_token, None);
                tracing::info!(token = %token_preview(&access_token), "Using refreshed token");
                return Ok(ObtainedToken {
                    access_token,
                    source: TokenSource::Refreshed,
                });
            }
            Err(e) => e,
        };

        tracing::warn!(error = %refresh_err, "Refresh token also failed, getting new auth token...");

        // Stage 3
        let login_err = match self.login.login(&self.credentials).await {
            Ok(pair) => {
                self.persist(&pair.access_token, pair.refresh_token.as_deref());
                tracing::info!(token = %token_preview(&pair.access_token), "Using token from new login");
                return Ok(ObtainedToken {
                    access_token: pair.access_token,
                    source: TokenSource::LoggedIn,
                });
            }
            Err(e) => e,
        };

        let err = AuthError::LifecycleExhausted {
            refresh: Box::new(refresh_err),
            login: Box::new(login_err),
        };
        self.audit.lifecycle_exhausted(&err.to_string());
        Err(err)
    }

    /// Unreadable state is treated as empty; the pass then falls through to login
    fn load_state(&self) -> PersistedState {
        match self.store.load() {
            Ok(state) => state,
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!(error = %reason, "Failed to load persisted tokens");
                PersistedState::default()
            }
        }
    }

    /// A failed write still hands the token to the caller; the next pass redoes the work
    fn persist(&self, access_token: &str, refresh_token: Option<&str>) {
        match self.store.save(access_token, refresh_token) {
            Ok(()) => self.audit.tokens_persisted(refresh_token.is_some()),
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!(error = %reason, "Failed to persist tokens");
            }
        }
    }
}
